//! Error types shared by every module of the crate.

use crate::timer::Ticks;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Top-level error type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A channel registration or reconfiguration was rejected.
    ///
    /// The channel registry is left unchanged.
    #[display("servo configuration error: {_0}")]
    #[from]
    Config(ConfigError),

    /// The registered channels cannot be turned into a valid frame.
    #[display("servo schedule error: {_0}")]
    #[from]
    Schedule(ScheduleError),

    /// The servo timer is already owned by another subsystem.
    ///
    /// Returned by `init_servos` before any interrupt is armed.
    #[display("servo timer is already owned by another subsystem")]
    TimerInUse,
}

/// Reasons a channel registration is rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The channel index is not below [`MAX_CHANNELS`](crate::servo::MAX_CHANNELS).
    #[display("channel index {index} is out of range (limit {limit})")]
    IndexOutOfRange {
        /// Requested index.
        index: u8,
        /// Number of supported channels.
        limit: u8,
    },

    /// The pulse width is zero or longer than the servo-safe maximum.
    #[display("pulse width of {ticks} ticks is outside 1..={max}")]
    InvalidPulseWidth {
        /// Requested width.
        ticks: Ticks,
        /// Longest accepted width.
        max: Ticks,
    },

    /// Another channel already drives this port bit.
    #[display("pin is already driven by channel {channel}")]
    PinInUse {
        /// Channel that owns the pin.
        channel: u8,
    },

    /// The bit number does not exist on an 8-bit port.
    #[display("bit {bit} is not a valid port bit")]
    InvalidPin {
        /// Requested bit.
        bit: u8,
    },

    /// The channel has never been registered.
    #[display("channel {index} is not registered")]
    UnknownChannel {
        /// Requested index.
        index: u8,
    },

    /// Servo angles are limited to 0..=180 degrees.
    #[display("angle of {degrees} degrees is above 180")]
    InvalidAngle {
        /// Requested angle.
        degrees: u16,
    },
}

/// Reasons a pulse schedule cannot be built.
#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleError {
    /// The pulses do not fit into one frame.
    #[display("total pulse width of {total} ticks does not fit a {frame}-tick frame")]
    FrameOverflow {
        /// Sum of all pulse widths.
        total: u32,
        /// Frame period.
        frame: Ticks,
    },

    /// The frame period does not fit half the counter range.
    #[display("frame of {frame} ticks is longer than half the timer range")]
    FrameTooLong {
        /// Frame period.
        frame: Ticks,
    },

    /// More events than a frame can hold.
    #[display("too many events for one frame")]
    TooManyEvents,
}

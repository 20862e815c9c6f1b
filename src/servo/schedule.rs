//! The pulse timing engine: turns the channel registry into one frame of events.
//!
//! Every pulse starts at tick 0 of the frame, so a channel's falling edge sits at
//! an offset equal to its pulse width. Sorting channels by width therefore yields
//! edges in time order, and a single compare register only ever needs the next
//! event's offset.
//!
//! ```text
//! tick 0        35            80                         FRAME
//!  |-- ch0 ----->|                                          |
//!  |-- ch1 ------------------->|                            |
//!  activate all  release ch0   release ch1                  wrap
//! ```

use heapless::Vec;

use crate::gpio::{Level, Pin};
use crate::servo::registry::{ChannelRegistry, MAX_CHANNELS};
use crate::timer::Ticks;
use crate::{Result, ScheduleError};

/// Release events plus the wrap marker.
pub const EVENT_CAPACITY: usize = MAX_CHANNELS + 1;

/// Longest frame the driver can tell apart from a missed deadline: half the
/// range of the 16-bit counter.
pub const MAX_FRAME_TICKS: Ticks = 0x7FFF;

/// A pin asserted at tick 0 of every frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Activation {
    /// Channel the pin belongs to.
    pub channel: u8,
    /// Pin to drive.
    pub pin: Pin,
    /// Active level of the channel.
    pub level: Level,
}

/// What happens when a [`ScheduledEvent`] fires.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventAction {
    /// End a channel's pulse by returning its pin to the rest level.
    Release {
        /// Channel whose pulse ends.
        channel: u8,
        /// Pin to drive.
        pin: Pin,
        /// Rest level of the channel.
        level: Level,
    },
    /// End of frame; the next frame starts here.
    Wrap,
}

/// One entry of a frame schedule.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduledEvent {
    /// Offset from the start of the frame.
    pub tick: Ticks,
    /// Action to apply.
    pub action: EventAction,
}

impl ScheduledEvent {
    /// Whether this is the end-of-frame marker.
    #[must_use]
    pub const fn is_wrap(&self) -> bool {
        matches!(self.action, EventAction::Wrap)
    }
}

/// The ordered events of one frame.
///
/// Events are sorted by tick; release events with equal ticks are ordered by
/// channel index and fire together. The last event is always the only
/// [`EventAction::Wrap`], strictly after every release.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PulseSchedule {
    frame_ticks: Ticks,
    activations: Vec<Activation, MAX_CHANNELS>,
    events: Vec<ScheduledEvent, EVENT_CAPACITY>,
}

impl PulseSchedule {
    /// Build the schedule for the registered channels.
    ///
    /// Rejects configurations whose pulses do not fit into `frame_ticks`.
    pub fn build(registry: &ChannelRegistry, frame_ticks: Ticks) -> Result<Self> {
        if frame_ticks > MAX_FRAME_TICKS {
            return Err(ScheduleError::FrameTooLong { frame: frame_ticks }.into());
        }

        let mut sorted = registry.slots();
        // Empty slots sort last; equal widths keep index order.
        sorted.sort_unstable_by_key(|slot| match slot {
            Some(channel) => (0_u8, channel.pulse_width, channel.index),
            None => (1, 0, 0),
        });

        let total: u32 = sorted
            .iter()
            .flatten()
            .map(|channel| u32::from(channel.pulse_width))
            .sum();
        let longest = sorted
            .iter()
            .flatten()
            .map(|channel| channel.pulse_width)
            .max()
            .unwrap_or(0);
        if total > u32::from(frame_ticks) || longest >= frame_ticks {
            return Err(ScheduleError::FrameOverflow {
                total,
                frame: frame_ticks,
            }
            .into());
        }

        let mut activations = Vec::new();
        let mut events = Vec::new();
        for channel in registry.iter() {
            activations
                .push(Activation {
                    channel: channel.index,
                    pin: channel.pin,
                    level: channel.active_level(),
                })
                .map_err(|_| ScheduleError::TooManyEvents)?;
        }
        for channel in sorted.iter().flatten() {
            events
                .push(ScheduledEvent {
                    tick: channel.pulse_width,
                    action: EventAction::Release {
                        channel: channel.index,
                        pin: channel.pin,
                        level: channel.rest_state,
                    },
                })
                .map_err(|_| ScheduleError::TooManyEvents)?;
        }
        events
            .push(ScheduledEvent {
                tick: frame_ticks,
                action: EventAction::Wrap,
            })
            .map_err(|_| ScheduleError::TooManyEvents)?;

        debug!(
            "pulse schedule: {=usize} channels, {=u32}/{=u16} ticks",
            activations.len(),
            total,
            frame_ticks
        );

        Ok(Self {
            frame_ticks,
            activations,
            events,
        })
    }

    /// Frame period in ticks; also the tick of the wrap event.
    #[must_use]
    pub const fn frame_ticks(&self) -> Ticks {
        self.frame_ticks
    }

    /// Pins asserted at the start of every frame, in channel index order.
    #[must_use]
    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    /// Events of one frame, ending with the wrap marker.
    #[must_use]
    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    /// Event at position `position` of the frame.
    #[must_use]
    pub fn event(&self, position: usize) -> Option<&ScheduledEvent> {
        self.events.get(position)
    }

    /// Number of release events (one per channel).
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.events.len().saturating_sub(1)
    }
}

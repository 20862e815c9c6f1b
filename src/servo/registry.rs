//! The channel registry: which pin each servo channel drives and for how long.

use crate::gpio::{Level, Pin};
use crate::timer::Ticks;
use crate::{ConfigError, Result};

const CHANNEL_LIMIT: u8 = 6;

/// Number of servo channels one scheduler drives.
pub const MAX_CHANNELS: usize = CHANNEL_LIMIT as usize;

/// One servo output.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel {
    /// Channel index, `0..MAX_CHANNELS`.
    pub index: u8,
    /// Output pin. No two channels share a pin.
    pub pin: Pin,
    /// Level held outside the pulse.
    pub rest_state: Level,
    /// Ticks the pin is held at the opposite of `rest_state` each frame.
    pub pulse_width: Ticks,
}

impl Channel {
    /// Level driven during the pulse.
    #[must_use]
    pub fn active_level(&self) -> Level {
        !self.rest_state
    }
}

/// Fixed-capacity table of channel slots.
///
/// Every mutation is validated first; a rejected call leaves the table as it was.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelRegistry {
    slots: [Option<Channel>; MAX_CHANNELS],
    max_pulse_width: Ticks,
}

impl ChannelRegistry {
    /// An empty registry accepting pulses of `1..=max_pulse_width` ticks.
    #[must_use]
    pub const fn new(max_pulse_width: Ticks) -> Self {
        Self {
            slots: [None; MAX_CHANNELS],
            max_pulse_width,
        }
    }

    /// Register or overwrite channel `index`.
    ///
    /// Overwriting may keep the channel's own pin or move it to a free one.
    pub fn register(
        &mut self,
        index: u8,
        pin: Pin,
        rest_state: Level,
        pulse_width: Ticks,
    ) -> Result<()> {
        let slot = self.slot_index(index)?;
        self.check_pulse_width(pulse_width)?;
        if let Some(owner) = self
            .iter()
            .find(|channel| channel.pin == pin && channel.index != index)
        {
            return Err(ConfigError::PinInUse {
                channel: owner.index,
            }
            .into());
        }

        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(Channel {
                index,
                pin,
                rest_state,
                pulse_width,
            });
        }
        Ok(())
    }

    /// Change the pulse width of a registered channel.
    pub fn set_pulse_width(&mut self, index: u8, pulse_width: Ticks) -> Result<()> {
        let slot = self.slot_index(index)?;
        self.check_pulse_width(pulse_width)?;
        match self.slots.get_mut(slot) {
            Some(Some(channel)) => {
                channel.pulse_width = pulse_width;
                Ok(())
            }
            _ => Err(ConfigError::UnknownChannel { index }.into()),
        }
    }

    /// The channel registered at `index`, if any.
    #[must_use]
    pub fn get(&self, index: u8) -> Option<&Channel> {
        self.slots.get(usize::from(index)).and_then(Option::as_ref)
    }

    /// Registered channels in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.slots.iter().flatten()
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no channel is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Longest accepted pulse width.
    #[must_use]
    pub const fn max_pulse_width(&self) -> Ticks {
        self.max_pulse_width
    }

    /// Copy of the slot table, used to sort channels without allocating.
    pub(crate) const fn slots(&self) -> [Option<Channel>; MAX_CHANNELS] {
        self.slots
    }

    fn slot_index(&self, index: u8) -> Result<usize> {
        let slot = usize::from(index);
        if slot < self.slots.len() {
            Ok(slot)
        } else {
            Err(ConfigError::IndexOutOfRange {
                index,
                limit: CHANNEL_LIMIT,
            }
            .into())
        }
    }

    fn check_pulse_width(&self, pulse_width: Ticks) -> Result<()> {
        if pulse_width == 0 || pulse_width > self.max_pulse_width {
            return Err(ConfigError::InvalidPulseWidth {
                ticks: pulse_width,
                max: self.max_pulse_width,
            }
            .into());
        }
        Ok(())
    }
}

//! Busy-wait delays.
//!
//! Used by application code between configuration calls; the servo scheduler
//! never blocks.

use core::hint::black_box;

use embedded_hal::delay::DelayNs;

/// CPU cycles spent per iteration of the spin loop (decrement, compare, branch).
const CYCLES_PER_SPIN: u32 = 4;

/// A calibrated spin-loop delay implementing [`DelayNs`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Delay {
    cpu_hz: u32,
}

impl Delay {
    /// Delay for a CPU running at `cpu_hz`.
    #[must_use]
    pub const fn new(cpu_hz: u32) -> Self {
        Self { cpu_hz }
    }

    /// Number of spin-loop iterations covering `ns` nanoseconds (rounded up).
    #[must_use]
    pub const fn spins_for_ns(&self, ns: u32) -> u32 {
        let cycles = (ns as u64)
            .saturating_mul(self.cpu_hz as u64)
            .div_ceil(1_000_000_000);
        let spins = cycles.div_ceil(CYCLES_PER_SPIN as u64);
        if spins > u32::MAX as u64 {
            u32::MAX
        } else {
            spins as u32
        }
    }
}

impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        let mut remaining = self.spins_for_ns(ns);
        while black_box(remaining) > 0 {
            remaining = remaining.wrapping_sub(1);
        }
    }
}

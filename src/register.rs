//! Volatile access to ATmega328P memory-mapped I/O registers.
//!
//! Addresses are data-space addresses (I/O address + 0x20).
#![expect(unsafe_code, reason = "memory-mapped register access")]

use core::ptr;

/// An 8-bit memory-mapped register.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Register(usize);

impl Register {
    pub(crate) const fn at(address: usize) -> Self {
        Self(address)
    }

    #[inline(always)]
    pub(crate) fn read(self) -> u8 {
        // SAFETY: register handles are only reachable through `unsafe` constructors
        // whose callers guarantee the program runs on an ATmega328P.
        unsafe { ptr::read_volatile(self.0 as *const u8) }
    }

    #[inline(always)]
    pub(crate) fn write(self, value: u8) {
        // SAFETY: see `read`.
        unsafe { ptr::write_volatile(self.0 as *mut u8, value) }
    }

    /// Read-modify-write inside a critical section so an interrupt touching
    /// other bits of the same register cannot be lost.
    #[inline(always)]
    pub(crate) fn modify(self, f: impl FnOnce(u8) -> u8) {
        critical_section::with(|_| self.write(f(self.read())));
    }
}

/// A 16-bit timer register pair sharing the AVR TEMP latch.
///
/// The high byte goes through TEMP: write high then low, read low then high,
/// with interrupts masked so an ISR cannot clobber TEMP in between.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Register16 {
    low: Register,
    high: Register,
}

impl Register16 {
    pub(crate) const fn at(low_address: usize) -> Self {
        Self {
            low: Register::at(low_address),
            high: Register::at(low_address.wrapping_add(1)),
        }
    }

    #[inline(always)]
    pub(crate) fn read(self) -> u16 {
        critical_section::with(|_| {
            let low = self.low.read();
            let high = self.high.read();
            u16::from_le_bytes([low, high])
        })
    }

    #[inline(always)]
    pub(crate) fn write(self, value: u16) {
        let [low, high] = value.to_le_bytes();
        critical_section::with(|_| {
            self.high.write(high);
            self.low.write(low);
        });
    }
}

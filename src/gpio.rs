//! Digital I/O on the ATmega328P ports.
//!
//! The servo scheduler only needs [`PortWriter`]: bit-level set, clear, and toggle
//! on a port's output register, plus making a bit an output. [`PortRegisters`] implements it over the real
//! memory-mapped registers and adds the Arduino-style helpers
//! ([`pin_mode`](PortRegisters::pin_mode), [`digital_write`](PortRegisters::digital_write),
//! [`digital_read`](PortRegisters::digital_read)).
//!
//! # Example
//!
//! ```rust,no_run
//! use uno_kit::gpio::{LED_BUILTIN, Level, PinMode, PortRegisters};
//!
//! // SAFETY: running on an ATmega328P.
//! let mut ports = unsafe { PortRegisters::new() };
//! ports.pin_mode(LED_BUILTIN, PinMode::Output);
//! ports.digital_write(LED_BUILTIN, Level::High);
//! ```

use core::convert::Infallible;
use core::ops::Not;

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::register::Register;
use crate::{ConfigError, Result};

// ============================================================================
// Level
// ============================================================================

/// Logic level of a pin.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Pin driven to ground.
    Low,
    /// Pin driven to VCC.
    High,
}

impl Not for Level {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::High
    }
}

// ============================================================================
// Port and Pin
// ============================================================================

/// One of the ATmega328P's 8-bit I/O ports.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    /// Port B (digital pins 8..=13).
    B,
    /// Port C (analog pins A0..=A5).
    C,
    /// Port D (digital pins 0..=7).
    D,
}

impl Port {
    // PINx, DDRx, PORTx are consecutive starting at PINx.
    const fn pin_address(self) -> usize {
        match self {
            Self::B => 0x23,
            Self::C => 0x26,
            Self::D => 0x29,
        }
    }

    /// Data-space address of the input register (`PINx`).
    #[must_use]
    pub const fn input_register(self) -> usize {
        self.pin_address()
    }

    /// Data-space address of the direction register (`DDRx`).
    #[must_use]
    pub const fn direction_register(self) -> usize {
        self.pin_address().wrapping_add(1)
    }

    /// Data-space address of the output register (`PORTx`).
    #[must_use]
    pub const fn output_register(self) -> usize {
        self.pin_address().wrapping_add(2)
    }
}

/// A single bit of a [`Port`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pin {
    port: Port,
    bit: u8,
}

/// The on-board LED of an Uno (digital pin 13, PB5).
pub const LED_BUILTIN: Pin = Pin {
    port: Port::B,
    bit: 5,
};

impl Pin {
    /// Create a pin from a port and a bit number (0..=7).
    pub const fn new(port: Port, bit: u8) -> Result<Self> {
        if bit > 7 {
            return Err(crate::Error::Config(ConfigError::InvalidPin { bit }));
        }
        Ok(Self { port, bit })
    }

    /// Pin for an Arduino digital pin number (0..=13).
    #[must_use]
    pub const fn from_digital(number: u8) -> Option<Self> {
        match number {
            0..=7 => Some(Self {
                port: Port::D,
                bit: number,
            }),
            8..=13 => Some(Self {
                port: Port::B,
                bit: number.wrapping_sub(8),
            }),
            _ => None,
        }
    }

    /// Pin for an Arduino analog pin number (A0..=A5 as 0..=5).
    #[must_use]
    pub const fn from_analog(number: u8) -> Option<Self> {
        match number {
            0..=5 => Some(Self {
                port: Port::C,
                bit: number,
            }),
            _ => None,
        }
    }

    /// Port that owns this pin.
    #[must_use]
    pub const fn port(self) -> Port {
        self.port
    }

    /// Bit number within the port.
    #[must_use]
    pub const fn bit(self) -> u8 {
        self.bit
    }

    /// Single-bit mask for this pin.
    #[must_use]
    pub const fn mask(self) -> u8 {
        1 << self.bit
    }
}

/// Direction and pull-up configuration of a pin.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// High-impedance input.
    Input,
    /// Push-pull output.
    Output,
    /// Input with the internal pull-up enabled.
    InputPullup,
}

// ============================================================================
// PortWriter
// ============================================================================

/// Bit-level access to a port's output register.
///
/// Implementations must only touch the addressed bit.
pub trait PortWriter {
    /// Drive `bit` of `port` high.
    fn set_bit(&mut self, port: Port, bit: u8);

    /// Drive `bit` of `port` low.
    fn clear_bit(&mut self, port: Port, bit: u8);

    /// Invert `bit` of `port`.
    fn toggle_bit(&mut self, port: Port, bit: u8);

    /// Make `bit` of `port` an output.
    fn set_output(&mut self, port: Port, bit: u8);

    /// Drive `pin` to `level`.
    fn write_pin(&mut self, pin: Pin, level: Level) {
        match level {
            Level::High => self.set_bit(pin.port(), pin.bit()),
            Level::Low => self.clear_bit(pin.port(), pin.bit()),
        }
    }
}

impl<W: PortWriter + ?Sized> PortWriter for &mut W {
    fn set_bit(&mut self, port: Port, bit: u8) {
        (**self).set_bit(port, bit);
    }

    fn clear_bit(&mut self, port: Port, bit: u8) {
        (**self).clear_bit(port, bit);
    }

    fn toggle_bit(&mut self, port: Port, bit: u8) {
        (**self).toggle_bit(port, bit);
    }

    fn set_output(&mut self, port: Port, bit: u8) {
        (**self).set_output(port, bit);
    }
}

// ============================================================================
// PortRegisters
// ============================================================================

/// The memory-mapped port registers of the ATmega328P.
#[derive(Debug)]
pub struct PortRegisters {
    _private: (),
}

impl PortRegisters {
    /// Access the port registers.
    ///
    /// # Safety
    ///
    /// The program must be running on an ATmega328P (or a pin-compatible part
    /// with the same register map).
    #[expect(unsafe_code, reason = "constructor of a memory-mapped register handle")]
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    /// Configure the direction and pull-up of `pin`.
    pub fn pin_mode(&mut self, pin: Pin, mode: PinMode) {
        let ddr = Register::at(pin.port().direction_register());
        let port = Register::at(pin.port().output_register());
        let mask = pin.mask();
        match mode {
            PinMode::Output => self.set_output(pin.port(), pin.bit()),
            PinMode::Input => {
                ddr.modify(|bits| bits & !mask);
                port.modify(|bits| bits & !mask);
            }
            PinMode::InputPullup => {
                ddr.modify(|bits| bits & !mask);
                port.modify(|bits| bits | mask);
            }
        }
    }

    /// Drive an output pin.
    pub fn digital_write(&mut self, pin: Pin, level: Level) {
        self.write_pin(pin, level);
    }

    /// Sample the input register of `pin`.
    #[must_use]
    pub fn digital_read(&self, pin: Pin) -> Level {
        let bits = Register::at(pin.port().input_register()).read();
        Level::from(bits & pin.mask() != 0)
    }

    /// Turn the on-board LED on.
    pub fn on_led(&mut self) {
        self.digital_write(LED_BUILTIN, Level::High);
    }

    /// Turn the on-board LED off.
    pub fn off_led(&mut self) {
        self.digital_write(LED_BUILTIN, Level::Low);
    }

    /// Invert the on-board LED.
    pub fn tog_led(&mut self) {
        self.toggle_bit(LED_BUILTIN.port(), LED_BUILTIN.bit());
    }

    /// Configure `pin` as an output and wrap it as an [`embedded_hal`] pin.
    pub fn into_output(mut self, pin: Pin) -> OutputPinDriver<Self> {
        self.pin_mode(pin, PinMode::Output);
        OutputPinDriver::new(self, pin)
    }
}

impl PortWriter for PortRegisters {
    fn set_bit(&mut self, port: Port, bit: u8) {
        let mask = 1_u8 << (bit & 7);
        Register::at(port.output_register()).modify(|bits| bits | mask);
    }

    fn clear_bit(&mut self, port: Port, bit: u8) {
        let mask = 1_u8 << (bit & 7);
        Register::at(port.output_register()).modify(|bits| bits & !mask);
    }

    fn toggle_bit(&mut self, port: Port, bit: u8) {
        // Writing a one to PINx toggles the matching PORTx bit in hardware.
        Register::at(port.input_register()).write(1_u8 << (bit & 7));
    }

    fn set_output(&mut self, port: Port, bit: u8) {
        let mask = 1_u8 << (bit & 7);
        Register::at(port.direction_register()).modify(|bits| bits | mask);
    }
}

// ============================================================================
// embedded-hal adapter
// ============================================================================

/// A single output pin driven through a [`PortWriter`].
///
/// Implements [`embedded_hal::digital::OutputPin`] so generic drivers can use it.
#[derive(Debug)]
pub struct OutputPinDriver<W> {
    writer: W,
    pin: Pin,
}

impl<W: PortWriter> OutputPinDriver<W> {
    /// Wrap `pin` of `writer`. The pin must already be configured as an output.
    pub const fn new(writer: W, pin: Pin) -> Self {
        Self { writer, pin }
    }

    /// The wrapped pin.
    #[must_use]
    pub const fn pin(&self) -> Pin {
        self.pin
    }

    /// Invert the pin.
    pub fn toggle(&mut self) {
        self.writer.toggle_bit(self.pin.port(), self.pin.bit());
    }

    /// Release the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> ErrorType for OutputPinDriver<W> {
    type Error = Infallible;
}

impl<W: PortWriter> OutputPin for OutputPinDriver<W> {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        self.writer.write_pin(self.pin, Level::Low);
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        self.writer.write_pin(self.pin, Level::High);
        Ok(())
    }
}

//! Board-level servo API for an Arduino Uno: one global scheduler on Timer1
//! driving pins of ports B, C, and D.
//!
//! ```rust,ignore
//! use uno_kit::gpio::{Level, Port};
//!
//! uno_kit::init_servo(0, 2, Port::D, Level::Low, 35)?;
//! uno_kit::init_servo(1, 3, Port::D, Level::Low, 80)?;
//! uno_kit::init_servos()?;
//!
//! #[avr_device::interrupt(atmega328p)]
//! fn TIMER1_COMPA() {
//!     uno_kit::on_timer1_compare_a();
//! }
//! ```
#![expect(unsafe_code, reason = "creates the global Timer1 and port register handles")]

use crate::Result;
use crate::gpio::{Level, Port, PortRegisters};
use crate::servo::{ServoController, Servos};
use crate::timer::{ServoTiming, Ticks, Timer1};

static SERVOS: Servos<Timer1, PortRegisters> = Servos::new();

fn uno_controller() -> ServoController<Timer1, PortRegisters> {
    // SAFETY: this module is only compiled for AVR targets.
    let (timer, ports) = unsafe { (Timer1::new(), PortRegisters::new()) };
    ServoController::new(timer, ports, ServoTiming::UNO)
}

/// Register or overwrite servo channel `index` on `bit` of `port`.
///
/// `pulse_width` is in 16 µs ticks. See [`ServoController::init_servo`].
pub fn init_servo(
    index: u8,
    bit: u8,
    port: Port,
    rest_state: Level,
    pulse_width: Ticks,
) -> Result<()> {
    SERVOS.with_or_install(uno_controller, |servos| {
        servos.init_servo(index, bit, port, rest_state, pulse_width)
    })
}

/// Arm Timer1 and start generating servo frames.
///
/// Global interrupts must be enabled by the application. See
/// [`ServoController::init_servos`].
pub fn init_servos() -> Result<()> {
    SERVOS.with_or_install(uno_controller, ServoController::init_servos)
}

/// Change the pulse width of a registered channel, in microseconds.
pub fn set_servo_us(index: u8, micros: u32) -> Result<()> {
    SERVOS.with_or_install(uno_controller, |servos| servos.set_pulse_us(index, micros))
}

/// Position a registered channel at `degrees` (0..=180).
pub fn set_servo_degrees(index: u8, degrees: u16) -> Result<()> {
    SERVOS.with_or_install(uno_controller, |servos| servos.set_degrees(index, degrees))
}

/// Stop all servo pulses at the end of the current frame.
pub fn stop_servos() {
    SERVOS.with(ServoController::stop_at_frame_end);
}

/// Stop all servo pulses immediately.
pub fn disarm_servos() {
    SERVOS.with(ServoController::disarm);
}

/// Number of late servo interrupts since arming.
#[must_use]
pub fn servo_overruns() -> u32 {
    SERVOS
        .with(|servos| servos.overrun_count())
        .unwrap_or(0)
}

/// Body of the `TIMER1_COMPA` interrupt handler.
pub fn on_timer1_compare_a() {
    SERVOS.on_interrupt();
}

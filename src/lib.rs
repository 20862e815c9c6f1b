//! Hardware abstractions for the ATmega328P (Arduino Uno): GPIO primitives,
//! busy-wait delays, and a software scheduler that drives up to six RC servos
//! from a single timer.
//!
//! # Glossary
//!
//! - **Tick:** one count of the servo timer. With the default
//!   [`ServoTiming::UNO`](timer::ServoTiming::UNO) a tick is 16 µs.
//! - **Frame:** one refresh period (20 ms) in which every registered servo channel
//!   receives exactly one pulse.
//! - **Pulse width:** how long a channel's pin is held at its active level within
//!   a frame; encodes the servo's target position.
//! - **Rest state:** the level a pin returns to after its pulse.
//! - **Compare register:** the timer register (`OCR1A`) that raises an interrupt
//!   when the free-running counter reaches the programmed value.
//!
//! # Modules
//!
//! - [`servo`]: the multi-channel servo pulse scheduler.
//! - [`gpio`]: ports, pins, and bit-level output.
//! - [`timer`]: tick arithmetic and Timer/Counter1.
//! - [`delay`]: spin-loop delays for application code.
#![cfg_attr(not(feature = "host"), no_std)]

#[macro_use]
mod fmt;

#[cfg(target_arch = "avr")]
mod board;
pub mod delay;
mod error;
pub mod gpio;
mod register;
pub mod servo;
pub mod timer;

#[cfg(target_arch = "avr")]
pub use crate::board::{
    disarm_servos, init_servo, init_servos, on_timer1_compare_a, servo_overruns,
    set_servo_degrees, set_servo_us, stop_servos,
};
// Re-export error types and result (used throughout)
pub use crate::error::{ConfigError, Error, Result, ScheduleError};

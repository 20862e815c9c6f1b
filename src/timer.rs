//! The servo timer: tick arithmetic, clock configuration, and Timer/Counter1.
//!
//! The scheduler runs on a free-running 16-bit counter. Every interrupt loads the
//! compare register with the absolute counter value of the next event, so event
//! times are limited only by tick resolution, not by an interrupt period.
//!
//! With the default [`ServoTiming::UNO`] (16 MHz CPU, prescaler /256) one tick is
//! 16 µs, a 20 ms frame is 1250 ticks, and the counter wraps every ~1.05 s.

use embassy_time::Duration;
use portable_atomic::{AtomicBool, Ordering};

use crate::register::{Register, Register16};
use crate::{Error, Result};

/// A counter value or a tick count of the servo timer.
pub type Ticks = u16;

/// Number of microseconds in a second.
const MICROS_PER_SECOND: u64 = 1_000_000;

// ============================================================================
// Prescaler
// ============================================================================

/// Clock select for Timer/Counter1.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    /// clk/1
    Div1,
    /// clk/8
    Div8,
    /// clk/64
    Div64,
    /// clk/256
    Div256,
    /// clk/1024
    Div1024,
}

impl Prescaler {
    /// The clock divisor.
    #[must_use]
    pub const fn divisor(self) -> u32 {
        match self {
            Self::Div1 => 1,
            Self::Div8 => 8,
            Self::Div64 => 64,
            Self::Div256 => 256,
            Self::Div1024 => 1024,
        }
    }

    /// `CS12:0` bits of `TCCR1B` selecting this prescaler.
    #[must_use]
    pub const fn clock_select_bits(self) -> u8 {
        match self {
            Self::Div1 => 0b001,
            Self::Div8 => 0b010,
            Self::Div64 => 0b011,
            Self::Div256 => 0b100,
            Self::Div1024 => 0b101,
        }
    }
}

// ============================================================================
// ServoTiming
// ============================================================================

/// Clock and frame configuration of the servo scheduler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoTiming {
    /// CPU clock in Hz.
    pub cpu_hz: u32,
    /// Timer clock divisor.
    pub prescaler: Prescaler,
    /// Refresh period. Every channel gets one pulse per frame.
    pub frame_period: Duration,
    /// Pulse width mapped to 0 degrees.
    pub min_pulse: Duration,
    /// Pulse width mapped to 180 degrees and the longest accepted pulse.
    pub max_pulse: Duration,
}

impl ServoTiming {
    /// Arduino Uno: 16 MHz, /256 (16 µs ticks), 50 Hz frames, 0.5–2.5 ms pulses.
    pub const UNO: Self = Self {
        cpu_hz: 16_000_000,
        prescaler: Prescaler::Div256,
        frame_period: Duration::from_millis(20),
        min_pulse: Duration::from_micros(500),
        max_pulse: Duration::from_micros(2_500),
    };

    /// Timer ticks per second.
    #[must_use]
    pub const fn tick_hz(&self) -> u32 {
        self.cpu_hz / self.prescaler.divisor()
    }

    /// Convert microseconds to the nearest tick count, or `None` if it does not
    /// fit the 16-bit counter.
    #[must_use]
    pub const fn ticks_from_micros(&self, micros: u64) -> Option<Ticks> {
        let scaled = micros.saturating_mul(self.tick_hz() as u64);
        let ticks = scaled.saturating_add(MICROS_PER_SECOND / 2) / MICROS_PER_SECOND;
        if ticks > Ticks::MAX as u64 {
            None
        } else {
            Some(ticks as Ticks)
        }
    }

    /// Convert a tick count to microseconds (rounded to nearest).
    #[must_use]
    pub const fn micros_from_ticks(&self, ticks: Ticks) -> u64 {
        let tick_hz = self.tick_hz() as u64;
        if tick_hz == 0 {
            return 0;
        }
        (ticks as u64 * MICROS_PER_SECOND).saturating_add(tick_hz / 2) / tick_hz
    }

    /// Convert a duration to the nearest tick count.
    #[must_use]
    pub fn ticks_from_duration(&self, duration: Duration) -> Option<Ticks> {
        self.ticks_from_micros(duration.as_micros())
    }

    /// Frame period in ticks (saturating at the counter range).
    #[must_use]
    pub fn frame_ticks(&self) -> Ticks {
        self.ticks_from_duration(self.frame_period)
            .unwrap_or(Ticks::MAX)
    }

    /// Shortest servo pulse (0 degrees) in ticks.
    #[must_use]
    pub fn min_pulse_ticks(&self) -> Ticks {
        self.ticks_from_duration(self.min_pulse).unwrap_or(Ticks::MAX)
    }

    /// Longest accepted pulse (180 degrees) in ticks.
    #[must_use]
    pub fn max_pulse_ticks(&self) -> Ticks {
        self.ticks_from_duration(self.max_pulse).unwrap_or(Ticks::MAX)
    }
}

impl Default for ServoTiming {
    fn default() -> Self {
        Self::UNO
    }
}

// ============================================================================
// CompareTimer
// ============================================================================

/// A free-running 16-bit timer with one compare-match interrupt.
///
/// The servo scheduler owns its timer exclusively between a successful
/// [`claim`](Self::claim) and [`release`](Self::release).
pub trait CompareTimer {
    /// Take ownership of the timer.
    ///
    /// Fails with [`Error::TimerInUse`] if another subsystem already owns it.
    fn claim(&mut self) -> Result<()>;

    /// Give up ownership of the timer.
    fn release(&mut self);

    /// Start counting in normal (free-running) mode.
    fn start(&mut self, prescaler: Prescaler);

    /// Stop the counter clock.
    fn stop(&mut self);

    /// Current counter value.
    fn counter(&self) -> Ticks;

    /// Program the compare register and discard any stale match.
    fn set_compare(&mut self, at: Ticks);

    /// Enable the compare-match interrupt.
    fn enable_compare_interrupt(&mut self);

    /// Disable the compare-match interrupt.
    fn disable_compare_interrupt(&mut self);
}

// ============================================================================
// Timer1
// ============================================================================

static TIMER1_CLAIMED: AtomicBool = AtomicBool::new(false);

const TCCR1A: Register = Register::at(0x80);
const TCCR1B: Register = Register::at(0x81);
const TCNT1: Register16 = Register16::at(0x84);
const OCR1A: Register16 = Register16::at(0x88);
const TIMSK1: Register = Register::at(0x6F);
const TIFR1: Register = Register::at(0x36);

const OCIE1A: u8 = 1 << 1;
const OCF1A: u8 = 1 << 1;
const CLOCK_SELECT_MASK: u8 = 0b111;

/// Timer/Counter1 of the ATmega328P, using compare channel A.
///
/// Ownership is process-wide: [`claim`](CompareTimer::claim) succeeds for only one
/// holder at a time, so other subsystems that need Timer1 should claim it too.
#[derive(Debug)]
pub struct Timer1 {
    claimed: bool,
}

impl Timer1 {
    /// Access Timer/Counter1.
    ///
    /// # Safety
    ///
    /// The program must be running on an ATmega328P.
    #[expect(unsafe_code, reason = "constructor of a memory-mapped register handle")]
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { claimed: false }
    }

    /// Whether any handle currently owns Timer1.
    #[must_use]
    pub fn is_claimed() -> bool {
        TIMER1_CLAIMED.load(Ordering::Acquire)
    }
}

impl CompareTimer for Timer1 {
    fn claim(&mut self) -> Result<()> {
        if self.claimed {
            return Ok(());
        }
        TIMER1_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::TimerInUse)?;
        self.claimed = true;
        Ok(())
    }

    fn release(&mut self) {
        if self.claimed {
            self.claimed = false;
            TIMER1_CLAIMED.store(false, Ordering::Release);
        }
    }

    fn start(&mut self, prescaler: Prescaler) {
        // Normal mode: WGM13:0 = 0, output compare pins disconnected.
        TCCR1A.write(0);
        TCCR1B.write(prescaler.clock_select_bits());
    }

    fn stop(&mut self) {
        TCCR1B.modify(|bits| bits & !CLOCK_SELECT_MASK);
    }

    fn counter(&self) -> Ticks {
        TCNT1.read()
    }

    fn set_compare(&mut self, at: Ticks) {
        OCR1A.write(at);
        // Flags are cleared by writing a one.
        TIFR1.write(OCF1A);
    }

    fn enable_compare_interrupt(&mut self) {
        TIMSK1.modify(|bits| bits | OCIE1A);
    }

    fn disable_compare_interrupt(&mut self) {
        TIMSK1.modify(|bits| bits & !OCIE1A);
    }
}

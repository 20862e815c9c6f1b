//! A device abstraction for up to six RC servos on one hardware timer.
//!
//! Each servo channel is an ordinary GPIO pin. All pulses start together at the
//! beginning of a 20 ms frame and end, in order of width, on successive
//! compare-match interrupts of a single free-running timer. No per-channel PWM
//! hardware is needed and the main program never waits.
//!
//! - [`registry`]: which pin each channel drives and for how long.
//! - [`schedule`]: the sorted events of one frame.
//! - [`driver`]: the interrupt-side state machine.
//! - [`ServoController`]: registering channels, arming, and reconfiguring.
//! - [`Servos`]: a `static`-friendly, interrupt-safe home for a controller.
//!
//! # Example
//!
//! ```rust,no_run
//! use uno_kit::gpio::{Level, Port, PortRegisters};
//! use uno_kit::servo::{ServoController, Servos};
//! use uno_kit::timer::{ServoTiming, Timer1};
//!
//! static SERVOS: Servos<Timer1, PortRegisters> = Servos::new();
//!
//! fn setup() -> uno_kit::Result<()> {
//!     // SAFETY: running on an ATmega328P.
//!     let (timer, ports) = unsafe { (Timer1::new(), PortRegisters::new()) };
//!     SERVOS.install(ServoController::new(timer, ports, ServoTiming::UNO));
//!
//!     SERVOS.with(|servos| {
//!         // index, bit, port, rest state, pulse width (16 µs ticks)
//!         servos.init_servo(0, 2, Port::D, Level::Low, 35)?;
//!         servos.init_servo(1, 3, Port::D, Level::Low, 80)?;
//!         servos.init_servos()
//!     })
//!     .unwrap_or(Ok(()))
//! }
//!
//! // Call from the TIMER1_COMPA interrupt handler.
//! fn on_timer1_compare_a() {
//!     SERVOS.on_interrupt();
//! }
//! ```

pub mod driver;
pub mod registry;
pub mod schedule;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::gpio::{Level, Pin, Port, PortWriter};
use crate::timer::{CompareTimer, ServoTiming, Ticks};
use crate::{ConfigError, Result};

use driver::is_due;
pub use driver::{DriverPhase, DriverStep, MIN_COMPARE_LEAD, PulseDriver};
pub use registry::{Channel, ChannelRegistry, MAX_CHANNELS};
pub use schedule::{Activation, EventAction, PulseSchedule, ScheduledEvent};

/// Largest angle accepted by [`ServoController::set_degrees`].
pub const MAX_DEGREES: u16 = 180;

// Extra driver passes per interrupt when the events outlast their own deadlines.
const MAX_REARM_PASSES: usize = MAX_CHANNELS;

// ============================================================================
// ServoController
// ============================================================================

/// Registration, arming, and interrupt entry point of the servo scheduler.
///
/// Owns the channel registry, the timer, and the port writer. While armed it also
/// owns the [`PulseDriver`] that the timer interrupt steps through.
///
/// A controller that is shared with an interrupt handler must only be touched
/// inside a critical section; [`Servos`] takes care of that.
#[derive(Debug)]
pub struct ServoController<T, P> {
    timing: ServoTiming,
    registry: ChannelRegistry,
    driver: Option<PulseDriver>,
    timer: T,
    ports: P,
}

impl<T: CompareTimer, P: PortWriter> ServoController<T, P> {
    /// A controller with no channels, not armed.
    #[must_use]
    pub fn new(timer: T, ports: P, timing: ServoTiming) -> Self {
        Self {
            registry: ChannelRegistry::new(timing.max_pulse_ticks()),
            timing,
            driver: None,
            timer,
            ports,
        }
    }

    /// Register or overwrite channel `index` on `bit` of `port`.
    ///
    /// `pulse_width` is in timer ticks. Nothing reaches the hardware until
    /// [`init_servos`](Self::init_servos); once armed, the new schedule takes
    /// effect at the next frame boundary. On error nothing changes.
    pub fn init_servo(
        &mut self,
        index: u8,
        bit: u8,
        port: Port,
        rest_state: Level,
        pulse_width: Ticks,
    ) -> Result<()> {
        let pin = Pin::new(port, bit)?;
        let previous = self.registry.get(index).map(|channel| channel.pin);
        let mut registry = self.registry.clone();
        registry.register(index, pin, rest_state, pulse_width)?;
        self.commit(registry)?;
        if self.is_armed() && previous != Some(pin) {
            self.prepare_pin(pin, rest_state);
        }
        info!(
            "servo {=u8}: {} bit {=u8}, {=u16} ticks",
            index,
            port,
            bit,
            pulse_width
        );
        Ok(())
    }

    /// Arm the timer and start generating frames.
    ///
    /// Builds the first schedule, claims the timer, parks every servo pin at its
    /// rest level as an output, starts the timer with the configured prescaler,
    /// and enables the compare-match interrupt. With no channels
    /// registered this does nothing. Calling it again while armed rebuilds the
    /// schedule for the next frame.
    pub fn init_servos(&mut self) -> Result<()> {
        if self.registry.is_empty() {
            info!("init_servos: no channels registered, timer left idle");
            return Ok(());
        }
        let schedule = PulseSchedule::build(&self.registry, self.timing.frame_ticks())?;

        if let Some(driver) = self.driver.as_mut() {
            driver.stage(schedule);
            driver.cancel_stop();
            return Ok(());
        }

        self.timer.claim()?;
        for channel in self.registry.slots().iter().flatten() {
            self.prepare_pin(channel.pin, channel.rest_state);
        }
        self.timer.start(self.timing.prescaler);
        let first_frame_at = self.timer.counter().wrapping_add(MIN_COMPARE_LEAD);
        self.timer.set_compare(first_frame_at);
        self.driver = Some(PulseDriver::new(schedule, first_frame_at));
        self.timer.enable_compare_interrupt();
        info!(
            "init_servos: {=usize} channels, frame {=u16} ticks",
            self.registry.len(),
            self.timing.frame_ticks()
        );
        Ok(())
    }

    /// Change the pulse width, in ticks, of a registered channel.
    pub fn set_pulse_width(&mut self, index: u8, pulse_width: Ticks) -> Result<()> {
        let mut registry = self.registry.clone();
        registry.set_pulse_width(index, pulse_width)?;
        self.commit(registry)
    }

    /// Change the pulse width, in microseconds, of a registered channel.
    pub fn set_pulse_us(&mut self, index: u8, micros: u32) -> Result<()> {
        let ticks = self
            .timing
            .ticks_from_micros(u64::from(micros))
            .unwrap_or(Ticks::MAX);
        self.set_pulse_width(index, ticks)
    }

    /// Position a channel at `degrees` (0..=180), mapped linearly onto the
    /// timing's pulse range.
    pub fn set_degrees(&mut self, index: u8, degrees: u16) -> Result<()> {
        if degrees > MAX_DEGREES {
            return Err(ConfigError::InvalidAngle { degrees }.into());
        }
        let min = u32::from(self.timing.min_pulse_ticks());
        let max = u32::from(self.timing.max_pulse_ticks());
        let span = max.saturating_sub(min);
        let offset = span
            .saturating_mul(u32::from(degrees))
            .saturating_add(u32::from(MAX_DEGREES / 2))
            / u32::from(MAX_DEGREES);
        let ticks = Ticks::try_from(min.saturating_add(offset)).unwrap_or(Ticks::MAX);
        debug!("servo {=u8}: {=u16} degrees -> {=u16} ticks", index, degrees, ticks);
        self.set_pulse_width(index, ticks)
    }

    /// Stop pulse generation immediately and release the timer.
    ///
    /// Pins keep whatever level they had; a pulse in progress stays asserted.
    /// Use [`stop_at_frame_end`](Self::stop_at_frame_end) for a clean stop.
    pub fn disarm(&mut self) {
        if self.driver.is_some() {
            self.shutdown();
            info!("servos disarmed");
        }
    }

    /// Stop at the end of the current frame, with every pin at its rest level.
    pub fn stop_at_frame_end(&mut self) {
        if let Some(driver) = self.driver.as_mut() {
            driver.request_stop();
        }
    }

    /// Timer compare-match interrupt entry point.
    ///
    /// Applies the due events and programs the compare register for the next one.
    /// If the counter reaches the programmed value while the events are being
    /// written, the match would not come until the counter wraps; the events are
    /// applied again instead, so no edge waits a full counter period.
    pub fn on_interrupt(&mut self) {
        let Some(driver) = self.driver.as_mut() else {
            self.timer.disable_compare_interrupt();
            return;
        };
        for _ in 0..=MAX_REARM_PASSES {
            let now = self.timer.counter();
            match driver.on_compare(now, &mut self.ports) {
                DriverStep::Rearm(at) => {
                    self.timer.set_compare(at);
                    if !is_due(at, self.timer.counter()) {
                        return;
                    }
                }
                DriverStep::Halt => {
                    self.shutdown();
                    info!("servos stopped at frame boundary");
                    return;
                }
            }
        }
        // Still behind after every pass: let the next interrupt catch up.
        let at = self.timer.counter().wrapping_add(MIN_COMPARE_LEAD);
        self.timer.set_compare(at);
        warn!("servo interrupt ran past its deadline, retrying at {=u16}", at);
    }

    /// Whether the timer interrupt is generating frames.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.driver.is_some()
    }

    /// Number of late interrupts since arming.
    #[must_use]
    pub fn overrun_count(&self) -> u32 {
        self.driver.as_ref().map_or(0, PulseDriver::overruns)
    }

    /// The schedule the driver is running, or the one it switches to at the next
    /// frame boundary. `None` when not armed.
    #[must_use]
    pub fn schedule(&self) -> Option<&PulseSchedule> {
        self.driver
            .as_ref()
            .map(|driver| driver.staged().unwrap_or(driver.schedule()))
    }

    /// Interrupt-side state, when armed.
    #[must_use]
    pub const fn driver(&self) -> Option<&PulseDriver> {
        self.driver.as_ref()
    }

    /// The registered channels.
    #[must_use]
    pub const fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Clock and frame configuration.
    #[must_use]
    pub const fn timing(&self) -> &ServoTiming {
        &self.timing
    }

    /// The timer.
    #[must_use]
    pub const fn timer(&self) -> &T {
        &self.timer
    }

    /// The port writer.
    #[must_use]
    pub const fn ports(&self) -> &P {
        &self.ports
    }

    /// Adopt `registry`, rebuilding and staging the schedule first when armed.
    fn commit(&mut self, registry: ChannelRegistry) -> Result<()> {
        if let Some(driver) = self.driver.as_mut() {
            let schedule = PulseSchedule::build(&registry, self.timing.frame_ticks())?;
            driver.stage(schedule);
        }
        self.registry = registry;
        Ok(())
    }

    /// Park `pin` at its rest level, then make it an output.
    fn prepare_pin(&mut self, pin: Pin, rest_state: Level) {
        self.ports.write_pin(pin, rest_state);
        self.ports.set_output(pin.port(), pin.bit());
    }

    fn shutdown(&mut self) {
        self.timer.disable_compare_interrupt();
        self.timer.stop();
        self.timer.release();
        self.driver = None;
    }
}

// ============================================================================
// Servos
// ============================================================================

/// An interrupt-safe slot for a [`ServoController`], usable as a `static`.
///
/// Every access runs inside a critical section, so the main program never
/// observes a half-updated schedule and the interrupt handler never runs while
/// one is being staged.
pub struct Servos<T, P> {
    controller: Mutex<CriticalSectionRawMutex, RefCell<Option<ServoController<T, P>>>>,
}

impl<T, P> Servos<T, P> {
    /// An empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            controller: Mutex::new(RefCell::new(None)),
        }
    }
}

impl<T, P> Default for Servos<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CompareTimer, P: PortWriter> Servos<T, P> {
    /// Put `controller` in the slot, returning the previous one.
    pub fn install(&self, controller: ServoController<T, P>) -> Option<ServoController<T, P>> {
        self.controller
            .lock(|cell| cell.borrow_mut().replace(controller))
    }

    /// Run `f` on the installed controller inside a critical section.
    ///
    /// Returns `None` if no controller is installed.
    pub fn with<R>(&self, f: impl FnOnce(&mut ServoController<T, P>) -> R) -> Option<R> {
        self.controller
            .lock(|cell| cell.borrow_mut().as_mut().map(f))
    }

    /// Run `f` on the installed controller, installing `init()` first if the
    /// slot is empty.
    pub fn with_or_install<R>(
        &self,
        init: impl FnOnce() -> ServoController<T, P>,
        f: impl FnOnce(&mut ServoController<T, P>) -> R,
    ) -> R {
        self.controller.lock(|cell| {
            let mut slot = cell.borrow_mut();
            f(slot.get_or_insert_with(init))
        })
    }

    /// Timer compare-match interrupt entry point.
    pub fn on_interrupt(&self) {
        self.with(ServoController::on_interrupt);
    }
}

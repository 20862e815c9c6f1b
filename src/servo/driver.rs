//! The timer interrupt driver: a two-state machine stepping through a
//! [`PulseSchedule`] one compare match at a time.
//!
//! Deadlines are absolute counter values: `frame_start + event.tick`, wrapping at
//! 2^16. The frame anchor advances by exactly one frame period at every wrap, so
//! a late interrupt shifts at most the edges it was late for and never the
//! frames after it.

use crate::gpio::PortWriter;
use crate::servo::schedule::{EVENT_CAPACITY, EventAction, PulseSchedule};
use crate::timer::Ticks;

/// Smallest distance between the current counter value and a newly programmed
/// compare value. Anything closer could pass before the compare register is
/// written, delaying the next interrupt by a full counter wrap.
pub const MIN_COMPARE_LEAD: Ticks = 2;

/// Lateness beyond which an interrupt is counted as an overrun.
pub const OVERRUN_SLACK: Ticks = 1;

// Deadlines less than half the counter range behind `now` are due.
const HALF_RANGE: Ticks = 0x8000;

/// Where the driver is within a frame.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverPhase {
    /// Waiting for the frame start, when every pin goes to its active level.
    Active,
    /// Emitting the release events and the wrap marker.
    ScheduledToggle,
}

/// What the interrupt handler must do with the compare register.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverStep {
    /// Load this absolute counter value into the compare register.
    Rearm(Ticks),
    /// A requested stop reached the frame boundary; disarm the timer.
    Halt,
}

/// Interrupt-side state of the scheduler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PulseDriver {
    schedule: PulseSchedule,
    staged: Option<PulseSchedule>,
    phase: DriverPhase,
    next_event: usize,
    frame_start: Ticks,
    overruns: u32,
    stop_requested: bool,
}

impl PulseDriver {
    /// A driver whose first frame starts at counter value `first_frame_at`.
    #[must_use]
    pub const fn new(schedule: PulseSchedule, first_frame_at: Ticks) -> Self {
        Self {
            schedule,
            staged: None,
            phase: DriverPhase::Active,
            next_event: 0,
            frame_start: first_frame_at,
            overruns: 0,
            stop_requested: false,
        }
    }

    /// Replace the schedule at the next frame boundary.
    ///
    /// A schedule staged earlier and not yet adopted is discarded.
    pub fn stage(&mut self, schedule: PulseSchedule) {
        self.staged = Some(schedule);
    }

    /// Stop at the end of the current frame, with every pin at rest.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Withdraw a pending [`request_stop`](Self::request_stop).
    pub fn cancel_stop(&mut self) {
        self.stop_requested = false;
    }

    /// Whether a stop is pending.
    #[must_use]
    pub const fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Schedule of the current frame.
    #[must_use]
    pub const fn schedule(&self) -> &PulseSchedule {
        &self.schedule
    }

    /// Schedule waiting for the next frame boundary.
    #[must_use]
    pub const fn staged(&self) -> Option<&PulseSchedule> {
        self.staged.as_ref()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Counter value at which the current (or upcoming) frame starts.
    #[must_use]
    pub const fn frame_start(&self) -> Ticks {
        self.frame_start
    }

    /// Number of interrupts serviced later than [`OVERRUN_SLACK`].
    #[must_use]
    pub const fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Absolute counter value of the next event.
    #[must_use]
    pub fn next_deadline(&self) -> Ticks {
        match self.phase {
            DriverPhase::Active => self.frame_start,
            DriverPhase::ScheduledToggle => {
                let offset = self
                    .schedule
                    .event(self.next_event)
                    .map_or(self.schedule.frame_ticks(), |event| event.tick);
                self.frame_start.wrapping_add(offset)
            }
        }
    }

    /// Handle a compare-match interrupt at counter value `now`.
    ///
    /// Applies every event due at or before `now`, including ones missed by a
    /// late interrupt, and returns where to program the compare register next.
    pub fn on_compare<W: PortWriter>(&mut self, now: Ticks, ports: &mut W) -> DriverStep {
        // Enough steps for one frame of a full registry: activation, releases, wrap.
        let mut budget = EVENT_CAPACITY.saturating_add(1);
        let mut overrun_counted = false;
        loop {
            let deadline = self.next_deadline();
            if !is_due(deadline, now) {
                return DriverStep::Rearm(compare_value(deadline, now));
            }
            if budget == 0 {
                return self.resync(now, ports);
            }
            budget = budget.saturating_sub(1);

            if !overrun_counted && now.wrapping_sub(deadline) > OVERRUN_SLACK {
                overrun_counted = true;
                self.overruns = self.overruns.wrapping_add(1);
                warn!(
                    "servo overrun: {=u16} ticks late",
                    now.wrapping_sub(deadline)
                );
            }

            if self.step(ports) == DriverStep::Halt {
                return DriverStep::Halt;
            }
        }
    }

    /// Apply the next event. Returns `Halt` only at a frame boundary with a
    /// pending stop.
    fn step<W: PortWriter>(&mut self, ports: &mut W) -> DriverStep {
        match self.phase {
            DriverPhase::Active => {
                for activation in self.schedule.activations() {
                    ports.write_pin(activation.pin, activation.level);
                }
                self.phase = DriverPhase::ScheduledToggle;
                self.next_event = 0;
            }
            DriverPhase::ScheduledToggle => {
                let action = self
                    .schedule
                    .event(self.next_event)
                    .map_or(EventAction::Wrap, |event| event.action);
                match action {
                    EventAction::Release { pin, level, .. } => {
                        ports.write_pin(pin, level);
                        self.next_event = self.next_event.saturating_add(1);
                    }
                    EventAction::Wrap => {
                        self.frame_start = self
                            .frame_start
                            .wrapping_add(self.schedule.frame_ticks());
                        if let Some(schedule) = self.staged.take() {
                            self.schedule = schedule;
                        }
                        self.phase = DriverPhase::Active;
                        self.next_event = 0;
                        if self.stop_requested {
                            return DriverStep::Halt;
                        }
                    }
                }
            }
        }
        DriverStep::Rearm(self.next_deadline())
    }

    /// Drop the backlog after falling a whole frame behind and start a fresh
    /// frame shortly after `now`.
    ///
    /// Pulses still in progress are ended first, so no pin carries an active
    /// level into the new frame. A pending schedule or stop takes effect here,
    /// as it would at the skipped wrap.
    fn resync<W: PortWriter>(&mut self, now: Ticks, ports: &mut W) -> DriverStep {
        warn!("servo driver fell a frame behind, resynchronising");
        if self.phase == DriverPhase::ScheduledToggle {
            let pending = self.schedule.events().get(self.next_event..).unwrap_or(&[]);
            for event in pending {
                if let EventAction::Release { pin, level, .. } = event.action {
                    ports.write_pin(pin, level);
                }
            }
        }
        if let Some(schedule) = self.staged.take() {
            self.schedule = schedule;
        }
        self.phase = DriverPhase::Active;
        self.next_event = 0;
        if self.stop_requested {
            return DriverStep::Halt;
        }
        self.frame_start = now.wrapping_add(MIN_COMPARE_LEAD);
        DriverStep::Rearm(self.frame_start)
    }
}

/// Whether `deadline` is at or before `now` on the wrapping counter.
pub(crate) fn is_due(deadline: Ticks, now: Ticks) -> bool {
    now.wrapping_sub(deadline) < HALF_RANGE
}

fn compare_value(deadline: Ticks, now: Ticks) -> Ticks {
    if deadline.wrapping_sub(now) < MIN_COMPARE_LEAD {
        now.wrapping_add(MIN_COMPARE_LEAD)
    } else {
        deadline
    }
}

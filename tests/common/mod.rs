//! Simulated Timer1 and port registers shared by the host tests.
#![allow(dead_code, reason = "each test file uses a subset of the helpers")]

use std::cell::Cell;
use std::rc::Rc;

use uno_kit::gpio::{Level, Pin, Port, PortWriter};
use uno_kit::servo::ServoController;
use uno_kit::timer::{CompareTimer, Prescaler, ServoTiming, Ticks};
use uno_kit::{Error, Result};

/// Absolute simulation time in ticks; the timer counter is its low 16 bits.
#[derive(Clone, Debug, Default)]
pub struct Clock(Rc<Cell<u32>>);

impl Clock {
    pub fn starting_at(ticks: u32) -> Self {
        Self(Rc::new(Cell::new(ticks)))
    }

    pub fn now(&self) -> u32 {
        self.0.get()
    }

    pub fn set(&self, ticks: u32) {
        self.0.set(ticks);
    }

    pub fn advance(&self, ticks: u32) {
        self.0.set(self.0.get() + ticks);
    }

    pub fn counter(&self) -> Ticks {
        (self.0.get() & 0xFFFF) as Ticks
    }
}

#[derive(Debug)]
pub struct SimTimer {
    clock: Clock,
    pub owned_elsewhere: bool,
    pub claimed: bool,
    pub prescaler: Option<Prescaler>,
    pub compare: Option<Ticks>,
    pub interrupt_enabled: bool,
}

impl SimTimer {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            owned_elsewhere: false,
            claimed: false,
            prescaler: None,
            compare: None,
            interrupt_enabled: false,
        }
    }
}

impl CompareTimer for SimTimer {
    fn claim(&mut self) -> Result<()> {
        if self.owned_elsewhere {
            return Err(Error::TimerInUse);
        }
        self.claimed = true;
        Ok(())
    }

    fn release(&mut self) {
        self.claimed = false;
    }

    fn start(&mut self, prescaler: Prescaler) {
        self.prescaler = Some(prescaler);
    }

    fn stop(&mut self) {
        self.prescaler = None;
    }

    fn counter(&self) -> Ticks {
        self.clock.counter()
    }

    fn set_compare(&mut self, at: Ticks) {
        self.compare = Some(at);
    }

    fn enable_compare_interrupt(&mut self) {
        self.interrupt_enabled = true;
    }

    fn disable_compare_interrupt(&mut self) {
        self.interrupt_enabled = false;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PinWrite {
    pub at: u32,
    pub pin: Pin,
    pub level: Level,
}

/// Output latches of ports B, C, and D plus a log of every bit write.
///
/// Each output write advances the clock by `write_cost` ticks, standing in for
/// the time an interrupt handler spends on it.
#[derive(Debug)]
pub struct SimPorts {
    clock: Clock,
    latches: [u8; 3],
    directions: [u8; 3],
    pub write_cost: u32,
    pub writes: Vec<PinWrite>,
}

impl SimPorts {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            latches: [0; 3],
            directions: [0; 3],
            write_cost: 0,
            writes: Vec::new(),
        }
    }

    pub fn latch(&self, port: Port) -> u8 {
        self.latches[slot(port)]
    }

    pub fn is_output(&self, pin: Pin) -> bool {
        self.directions[slot(pin.port())] & pin.mask() != 0
    }

    pub fn level(&self, pin: Pin) -> Level {
        Level::from(self.latch(pin.port()) & pin.mask() != 0)
    }

    /// `(start, width)` of every completed pulse on `pin` at `active` level.
    pub fn pulses(&self, pin: Pin, active: Level) -> Vec<(u32, u32)> {
        let mut pulses = Vec::new();
        let mut started: Option<u32> = None;
        let mut level = !active;
        for write in self.writes.iter().filter(|write| write.pin == pin) {
            if write.level == level {
                continue;
            }
            level = write.level;
            if level == active {
                started = Some(write.at);
            } else if let Some(start) = started.take() {
                pulses.push((start, write.at - start));
            }
        }
        pulses
    }

    fn record(&mut self, port: Port, bit: u8) {
        let pin = Pin::new(port, bit).unwrap();
        let level = self.level(pin);
        self.writes.push(PinWrite {
            at: self.clock.now(),
            pin,
            level,
        });
        self.clock.advance(self.write_cost);
    }
}

fn slot(port: Port) -> usize {
    match port {
        Port::B => 0,
        Port::C => 1,
        Port::D => 2,
    }
}

impl PortWriter for SimPorts {
    fn set_bit(&mut self, port: Port, bit: u8) {
        self.latches[slot(port)] |= 1 << bit;
        self.record(port, bit);
    }

    fn clear_bit(&mut self, port: Port, bit: u8) {
        self.latches[slot(port)] &= !(1 << bit);
        self.record(port, bit);
    }

    fn toggle_bit(&mut self, port: Port, bit: u8) {
        self.latches[slot(port)] ^= 1 << bit;
        self.record(port, bit);
    }

    fn set_output(&mut self, port: Port, bit: u8) {
        self.directions[slot(port)] |= 1 << bit;
    }
}

pub type SimController = ServoController<SimTimer, SimPorts>;

pub fn sim_controller() -> (SimController, Clock) {
    sim_controller_with(ServoTiming::UNO, Clock::starting_at(1_000))
}

pub fn sim_controller_with(timing: ServoTiming, clock: Clock) -> (SimController, Clock) {
    let controller = ServoController::new(
        SimTimer::new(clock.clone()),
        SimPorts::new(clock.clone()),
        timing,
    );
    (controller, clock)
}

/// A controller whose port writes each take `write_cost` ticks.
pub fn slow_port_controller(write_cost: u32) -> (SimController, Clock) {
    let clock = Clock::starting_at(1_000);
    let mut ports = SimPorts::new(clock.clone());
    ports.write_cost = write_cost;
    let controller = ServoController::new(SimTimer::new(clock.clone()), ports, ServoTiming::UNO);
    (controller, clock)
}

pub fn pin(port: Port, bit: u8) -> Pin {
    Pin::new(port, bit).unwrap()
}

/// Absolute time of the next compare match, if the interrupt is enabled.
pub fn next_match(controller: &SimController, clock: &Clock) -> Option<u32> {
    let timer = controller.timer();
    if !timer.interrupt_enabled {
        return None;
    }
    let compare = timer.compare?;
    let delta = compare.wrapping_sub(clock.counter());
    let delta = if delta == 0 { 0x1_0000 } else { u32::from(delta) };
    Some(clock.now() + delta)
}

/// Service every compare match up to and including `end`, then leave the clock at `end`.
pub fn run_until(controller: &mut SimController, clock: &Clock, end: u32) {
    while let Some(at) = next_match(controller, clock) {
        if at > end {
            break;
        }
        clock.set(at);
        controller.on_interrupt();
    }
    clock.set(end);
}

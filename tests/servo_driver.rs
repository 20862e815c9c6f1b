//! Host-level tests for the interrupt-side pulse driver.
#![allow(missing_docs)]

mod common;

use common::{Clock, SimPorts, pin};
use uno_kit::gpio::{Level, Pin, Port};
use uno_kit::servo::{ChannelRegistry, DriverPhase, DriverStep, PulseDriver, PulseSchedule};

const FRAME: u16 = 1250;

struct Bench {
    clock: Clock,
    ports: SimPorts,
}

impl Bench {
    fn new() -> Self {
        let clock = Clock::default();
        Self {
            ports: SimPorts::new(clock.clone()),
            clock,
        }
    }

    fn fire(&mut self, driver: &mut PulseDriver, at: u32) -> DriverStep {
        self.clock.set(at);
        driver.on_compare((at & 0xFFFF) as u16, &mut self.ports)
    }

    fn level(&self, pin: Pin) -> Level {
        self.ports.level(pin)
    }
}

fn d2() -> Pin {
    pin(Port::D, 2)
}

fn d3() -> Pin {
    pin(Port::D, 3)
}

fn schedule(widths: &[u16]) -> PulseSchedule {
    let mut registry = ChannelRegistry::new(156);
    for (index, &width) in (0_u8..).zip(widths) {
        registry
            .register(index, pin(Port::D, index + 2), Level::Low, width)
            .unwrap();
    }
    PulseSchedule::build(&registry, FRAME).unwrap()
}

#[test]
fn one_frame_of_compare_matches() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 100);
    assert_eq!(driver.phase(), DriverPhase::Active);
    assert_eq!(driver.next_deadline(), 100);

    assert_eq!(bench.fire(&mut driver, 100), DriverStep::Rearm(135));
    assert_eq!(driver.phase(), DriverPhase::ScheduledToggle);
    assert_eq!(bench.level(d2()), Level::High);
    assert_eq!(bench.level(d3()), Level::High);

    assert_eq!(bench.fire(&mut driver, 135), DriverStep::Rearm(180));
    assert_eq!(bench.level(d2()), Level::Low);
    assert_eq!(bench.level(d3()), Level::High);

    assert_eq!(bench.fire(&mut driver, 180), DriverStep::Rearm(1350));
    assert_eq!(bench.level(d3()), Level::Low);

    assert_eq!(bench.fire(&mut driver, 1350), DriverStep::Rearm(1385));
    assert_eq!(driver.frame_start(), 1350);
    assert_eq!(bench.level(d2()), Level::High);
    assert_eq!(bench.level(d3()), Level::High);

    assert_eq!(driver.overruns(), 0);
    assert_eq!(bench.ports.pulses(d2(), Level::High), [(100, 35)]);
    assert_eq!(bench.ports.pulses(d3(), Level::High), [(100, 80)]);
}

#[test]
fn early_interrupt_only_rearms() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35]), 100);

    assert_eq!(bench.fire(&mut driver, 90), DriverStep::Rearm(100));
    assert!(bench.ports.writes.is_empty());
    assert_eq!(driver.phase(), DriverPhase::Active);
}

#[test]
fn equal_widths_release_in_one_interrupt() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 35, 80]), 100);

    bench.fire(&mut driver, 100);
    assert_eq!(bench.fire(&mut driver, 135), DriverStep::Rearm(180));
    assert_eq!(bench.level(d2()), Level::Low);
    assert_eq!(bench.level(d3()), Level::Low);
    assert_eq!(bench.level(pin(Port::D, 4)), Level::High);
    assert_eq!(driver.overruns(), 0);
}

#[test]
fn late_interrupt_counts_an_overrun_without_shifting_later_edges() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 100);

    bench.fire(&mut driver, 100);
    assert_eq!(bench.fire(&mut driver, 140), DriverStep::Rearm(180));
    assert_eq!(driver.overruns(), 1);
    assert_eq!(bench.fire(&mut driver, 180), DriverStep::Rearm(1350));
    assert_eq!(driver.overruns(), 1);

    assert_eq!(bench.ports.pulses(d2(), Level::High), [(100, 40)]);
    assert_eq!(bench.ports.pulses(d3(), Level::High), [(100, 80)]);
}

#[test]
fn one_tick_late_is_not_an_overrun() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 100);

    bench.fire(&mut driver, 101);
    bench.fire(&mut driver, 136);
    assert_eq!(driver.overruns(), 0);
}

#[test]
fn very_late_interrupt_applies_every_missed_edge() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 100);

    bench.fire(&mut driver, 100);
    assert_eq!(bench.fire(&mut driver, 200), DriverStep::Rearm(1350));
    assert_eq!(bench.level(d2()), Level::Low);
    assert_eq!(bench.level(d3()), Level::Low);
    // Counted once per interrupt, not once per missed edge.
    assert_eq!(driver.overruns(), 1);
    assert_eq!(driver.frame_start(), 100);
}

#[test]
fn deadline_closer_than_the_lead_is_pushed_out() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 100);

    bench.fire(&mut driver, 100);
    assert_eq!(bench.fire(&mut driver, 179), DriverStep::Rearm(181));
    assert_eq!(bench.level(d3()), Level::High);
    assert_eq!(bench.fire(&mut driver, 181), DriverStep::Rearm(1350));
    assert_eq!(bench.level(d3()), Level::Low);
    assert_eq!(driver.overruns(), 1);
}

#[test]
fn staged_schedule_is_adopted_at_the_frame_boundary() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 100);

    bench.fire(&mut driver, 100);
    driver.stage(schedule(&[50, 80]));

    assert_eq!(bench.fire(&mut driver, 135), DriverStep::Rearm(180));
    assert_eq!(bench.level(d2()), Level::Low);
    assert_eq!(bench.fire(&mut driver, 180), DriverStep::Rearm(1350));
    assert!(driver.staged().is_some());

    assert_eq!(bench.fire(&mut driver, 1350), DriverStep::Rearm(1400));
    assert!(driver.staged().is_none());
    assert_eq!(driver.schedule(), &schedule(&[50, 80]));
    bench.fire(&mut driver, 1400);

    assert_eq!(
        bench.ports.pulses(d2(), Level::High),
        [(100, 35), (1350, 50)]
    );
}

#[test]
fn stop_request_halts_at_the_frame_end_with_pins_at_rest() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 100);

    bench.fire(&mut driver, 100);
    driver.request_stop();
    assert!(driver.stop_requested());
    bench.fire(&mut driver, 135);
    bench.fire(&mut driver, 180);
    let writes = bench.ports.writes.len();

    assert_eq!(bench.fire(&mut driver, 1350), DriverStep::Halt);
    assert_eq!(bench.ports.writes.len(), writes);
    assert_eq!(bench.level(d2()), Level::Low);
    assert_eq!(bench.level(d3()), Level::Low);
}

#[test]
fn cancelled_stop_keeps_running() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35]), 100);

    bench.fire(&mut driver, 100);
    driver.request_stop();
    driver.cancel_stop();
    bench.fire(&mut driver, 135);
    assert_eq!(bench.fire(&mut driver, 1350), DriverStep::Rearm(1385));
}

#[test]
fn frames_continue_across_counter_wraparound() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 65_500);

    assert_eq!(bench.fire(&mut driver, 65_500), DriverStep::Rearm(65_535));
    assert_eq!(bench.fire(&mut driver, 65_535), DriverStep::Rearm(44));
    assert_eq!(bench.fire(&mut driver, 65_580), DriverStep::Rearm(1214));
    assert_eq!(bench.fire(&mut driver, 66_750), DriverStep::Rearm(1249));

    assert_eq!(driver.overruns(), 0);
    assert_eq!(bench.ports.pulses(d3(), Level::High), [(65_500, 80)]);
}

#[test]
fn falling_a_frame_behind_resynchronises() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80]), 100);

    let now = 100 + 3 * u32::from(FRAME);
    assert_eq!(bench.fire(&mut driver, now), DriverStep::Rearm(3852));
    assert_eq!(driver.phase(), DriverPhase::Active);
    assert_eq!(driver.frame_start(), 3852);
    assert_eq!(driver.overruns(), 1);

    assert_eq!(bench.fire(&mut driver, 3852), DriverStep::Rearm(3887));
    assert_eq!(bench.level(d2()), Level::High);
    assert_eq!(driver.overruns(), 1);
}

#[test]
fn resynchronising_mid_frame_ends_the_pulses_in_progress() {
    let mut bench = Bench::new();
    let mut driver = PulseDriver::new(schedule(&[35, 80, 120]), 100);
    let d4 = pin(Port::D, 4);

    // The catch-up budget runs out after the second backlog frame's 80-tick release.
    let now = 100 + 3 * u32::from(FRAME);
    assert_eq!(bench.fire(&mut driver, now), DriverStep::Rearm(3852));
    assert_eq!(bench.level(d4), Level::Low);

    assert_eq!(bench.fire(&mut driver, 3852), DriverStep::Rearm(3887));
    bench.fire(&mut driver, 3887);
    bench.fire(&mut driver, 3932);
    assert_eq!(bench.fire(&mut driver, 3972), DriverStep::Rearm(3852 + FRAME));

    let pulses = bench.ports.pulses(d4, Level::High);
    assert_eq!(pulses.last(), Some(&(3852, 120)));
    assert!(pulses.iter().all(|&(_, width)| width <= 120));
}


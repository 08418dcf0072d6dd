//! Reset sequencer scenarios against the chip simulator.
// Integration test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
//!
//! Run with: cargo test -p vs1053 --test reset_sequencer

use core::cell::RefCell;

use embassy_time::Duration;
use vs1053::config::{CONSERVATIVE_BUS_HZ, FAST_BUS_HZ};
use vs1053::mock::{mock_driver, ChipSim, SimEvent};
use vs1053::registers::{CLOCKF_MULT_4_5X, SM_SDINEW, SM_TESTS};
use vs1053::{
    BusTiming, ChipState, DriverConfig, Error, Register, ResetBudget, ResetOutcome, VolumePercent,
};

#[tokio::test]
async fn ready_on_second_attempt_succeeds_after_two() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().fail_next_boots(1);
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    let outcome = vs.reset(ResetBudget::Attempts(3)).await;

    assert_eq!(outcome, ResetOutcome::Success { attempts: 2 });
    assert_eq!(vs.state(), ChipState::Operational);
    assert!(vs.is_online());
    assert_eq!(vs.bus_timing(), BusTiming::Fast);

    let sim = sim.borrow();
    assert!(sim.indicator_on());
    assert_eq!(sim.reset_pulses(), 2);
    assert_eq!(sim.register(Register::ClockF), CLOCKF_MULT_4_5X);
    assert_eq!(sim.spi_frequency(), Some(FAST_BUS_HZ));
}

#[tokio::test]
async fn never_ready_exhausts_budget_of_three() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().set_dreq_stuck_low(true);
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    let outcome = vs.reset(ResetBudget::Attempts(3)).await;

    assert_eq!(outcome, ResetOutcome::Exhausted { attempts: 3 });
    assert_eq!(vs.state(), ChipState::Unresponsive);
    assert_eq!(vs.bus_timing(), BusTiming::Conservative);

    let sim = sim.borrow();
    assert!(!sim.indicator_on());
    assert_eq!(sim.reset_pulses(), 3);
    assert_eq!(sim.vol_writes(), 0);
}

#[tokio::test]
async fn dead_chip_uses_exactly_the_granted_attempts() {
    for budget in 0..5u32 {
        let sim = RefCell::new(ChipSim::new());
        sim.borrow_mut().kill();
        let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

        let outcome = vs.reset(ResetBudget::Attempts(budget)).await;

        assert_eq!(outcome, ResetOutcome::Exhausted { attempts: budget });
        assert_eq!(sim.borrow().reset_pulses(), budget);
    }
}

#[tokio::test]
async fn unbounded_budget_stops_at_first_success() {
    for k in 1..6u32 {
        let sim = RefCell::new(ChipSim::new());
        sim.borrow_mut().fail_next_boots(k - 1);
        let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

        let outcome = vs.reset(ResetBudget::Unbounded).await;

        assert_eq!(outcome, ResetOutcome::Success { attempts: k });
        assert_eq!(sim.borrow().reset_pulses(), k);
    }
}

#[tokio::test]
async fn fast_clock_only_follows_confirmed_clockf() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().fail_next_boots(2);
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();
    sim.borrow_mut().clear_log();

    vs.reset(ResetBudget::Attempts(4)).await;

    let sim = sim.borrow();
    let log = sim.log();
    let fast_at: Vec<usize> = log
        .iter()
        .enumerate()
        .filter(|(_, e)| **e == SimEvent::Clock(FAST_BUS_HZ))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(fast_at.len(), 1);

    let i = fast_at[0];
    assert!(i >= 2);
    assert_eq!(
        log[i - 2],
        SimEvent::Write {
            register: Register::ClockF,
            value: CLOCKF_MULT_4_5X
        }
    );
    assert_eq!(
        log[i - 1],
        SimEvent::Read {
            register: Register::ClockF,
            value: CLOCKF_MULT_4_5X
        }
    );
}

#[tokio::test]
async fn rejected_clockf_never_selects_fast_clock() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().freeze(Register::ClockF);
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    let outcome = vs.reset(ResetBudget::Attempts(2)).await;

    assert_eq!(outcome, ResetOutcome::Exhausted { attempts: 2 });
    let sim = sim.borrow();
    assert!(!sim.log().contains(&SimEvent::Clock(FAST_BUS_HZ)));
    assert_eq!(sim.spi_frequency(), Some(CONSERVATIVE_BUS_HZ));
    assert_eq!(sim.vol_writes(), 0);
}

#[tokio::test]
async fn every_attempt_restarts_at_conservative_clock() {
    let sim = RefCell::new(ChipSim::new());
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();
    vs.reset(ResetBudget::Attempts(1)).await;
    assert_eq!(vs.bus_timing(), BusTiming::Fast);
    sim.borrow_mut().clear_log();

    vs.reset(ResetBudget::Attempts(1)).await;

    assert_eq!(sim.borrow().log()[0], SimEvent::Clock(CONSERVATIVE_BUS_HZ));
}

#[tokio::test]
async fn reset_pulse_and_settle_use_configured_times() {
    let sim = RefCell::new(ChipSim::new());
    let config = DriverConfig {
        reset_pulse: Duration::from_millis(20),
        boot_settle: Duration::from_millis(30),
        self_check_iterations: 0,
        ..DriverConfig::new()
    };
    let mut vs = mock_driver(&sim, config).unwrap();

    vs.reset(ResetBudget::Attempts(1)).await;

    let sim = sim.borrow();
    assert!(sim.log().contains(&SimEvent::ResetPulse { held_us: 20_000 }));
    assert_eq!(sim.elapsed(), Duration::from_millis(50));
}

#[tokio::test]
async fn self_check_ramp_writes_every_step() {
    let sim = RefCell::new(ChipSim::new());
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    vs.reset(ResetBudget::Attempts(1)).await;

    let sim = sim.borrow();
    assert_eq!(sim.vol_writes(), 100);
    // Last ramp step is vol(99): (100 - 99) * 254 / 100 = 2 per channel.
    assert_eq!(sim.register(Register::Vol), 0x0202);
}

#[tokio::test]
async fn ignored_volume_writes_do_not_fail_the_attempt() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().freeze(Register::Vol);
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    let outcome = vs.reset(ResetBudget::Attempts(1)).await;

    assert_eq!(outcome, ResetOutcome::Success { attempts: 1 });
    assert!(vs.is_online());
    let sim = sim.borrow();
    assert!(sim.indicator_on());
    assert_eq!(sim.vol_writes(), 100);
    assert_eq!(sim.register(Register::Vol), 0);
}

#[tokio::test]
async fn test_mode_write_follows_exhausted_reset() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().freeze(Register::ClockF);
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();
    sim.borrow_mut().clear_log();

    let outcome = vs.reset(ResetBudget::Attempts(1)).await;

    assert_eq!(outcome, ResetOutcome::Exhausted { attempts: 1 });
    assert_eq!(vs.state(), ChipState::Unresponsive);
    let sim = sim.borrow();
    assert!(sim.log().ends_with(&[
        SimEvent::Read {
            register: Register::Mode,
            value: SM_SDINEW
        },
        SimEvent::Write {
            register: Register::Mode,
            value: SM_SDINEW | SM_TESTS
        },
        SimEvent::Read {
            register: Register::Mode,
            value: SM_SDINEW | SM_TESTS
        },
    ]));
    assert_eq!(sim.register(Register::Mode), SM_SDINEW | SM_TESTS);
}

#[tokio::test]
async fn test_mode_write_on_dead_chip_is_skipped_quietly() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().kill();
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();
    sim.borrow_mut().clear_log();

    let outcome = vs.reset(ResetBudget::Attempts(1)).await;

    assert_eq!(outcome, ResetOutcome::Exhausted { attempts: 1 });
    assert!(!sim
        .borrow()
        .log()
        .iter()
        .any(|e| matches!(e, SimEvent::Write { .. } | SimEvent::Read { .. })));
}

#[tokio::test]
async fn test_mode_bit_set_after_success() {
    let sim = RefCell::new(ChipSim::new());
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    vs.reset(ResetBudget::Attempts(1)).await;

    assert_eq!(sim.borrow().register(Register::Mode), SM_SDINEW | SM_TESTS);
}

#[tokio::test]
async fn zero_budget_runs_no_attempt() {
    let sim = RefCell::new(ChipSim::new());
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    let outcome = vs.reset(ResetBudget::Attempts(0)).await;

    assert_eq!(outcome, ResetOutcome::Exhausted { attempts: 0 });
    assert_eq!(vs.state(), ChipState::Unresponsive);
    assert_eq!(sim.borrow().reset_pulses(), 0);
}

#[tokio::test]
async fn start_up_applies_volume_after_reset() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().fail_next_boots(3);
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    let outcome = vs.start_up(VolumePercent::new(75)).await.unwrap();

    assert_eq!(outcome, ResetOutcome::Success { attempts: 4 });
    assert_eq!(vs.read_register(Register::Vol).await, Ok(0x3F3F));
}

#[tokio::test]
async fn start_up_volume_failure_keeps_chip_operational() {
    let sim = RefCell::new(ChipSim::new());
    sim.borrow_mut().freeze(Register::Vol);
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();

    let err = vs.start_up(VolumePercent::new(75)).await.unwrap_err();

    assert_eq!(
        err,
        Error::VerifyMismatch {
            register: Register::Vol,
            wrote: 0x3F3F,
            read: 0
        }
    );
    assert_eq!(vs.state(), ChipState::Operational);
    assert!(sim.borrow().indicator_on());
    assert_eq!(sim.borrow().reset_pulses(), 1);
}

#[tokio::test]
async fn revived_chip_recovers_on_next_reset() {
    let sim = RefCell::new(ChipSim::new());
    let mut vs = mock_driver(&sim, DriverConfig::new()).unwrap();
    sim.borrow_mut().kill();

    assert!(!vs.reset(ResetBudget::Attempts(2)).await.is_success());
    sim.borrow_mut().revive();

    assert_eq!(
        vs.reset(ResetBudget::Attempts(2)).await,
        ResetOutcome::Success { attempts: 1 }
    );
    assert_eq!(vs.read_register(Register::Status).await, Ok(0x0040));
}

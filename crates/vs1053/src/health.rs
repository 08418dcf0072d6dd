//! Health monitor.
//!
//! Polls SCI_STATUS at a fixed interval. A zero status (or a failed read)
//! means the bus or chip is dead: any broken SPI wire except XDCS reads as
//! zero. What happens next depends on the state before the failure:
//!
//! | state before      | action                                   | event          |
//! |-------------------|------------------------------------------|----------------|
//! | `Operational`     | reset with `stamina` attempts            | `WentOffline`  |
//! | anything else     | reset with one attempt                   | `Retried`      |
//!
//! Contention on the command channel says nothing about the chip, so it is
//! reported as `Busy` and skipped.
//!
//! The monitor locks the shared driver for one poll (and any reset it
//! triggers) and sleeps with the lock released, so foreground register
//! access interleaves between polls. To stop the monitor, drop its future.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;
use platform::SpiPeripheral;

use crate::config::{pause, MonitorConfig};
use crate::driver::{ChipState, Vs1053};
use crate::registers::Register;
use crate::reset::{ResetBudget, ResetOutcome};

/// Result of one SCI_STATUS probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusProbe {
    /// Non-zero status.
    Alive(u16),
    /// Zero status or a failed read.
    Dead,
    /// The data channel held the bus.
    Busy,
}

/// What a chip must offer to be monitored.
pub trait MonitoredChip {
    /// Read SCI_STATUS once.
    async fn probe_status(&mut self) -> StatusProbe;

    /// Last known chip state.
    fn state(&self) -> ChipState;

    /// Record that a status probe found the chip dead.
    fn mark_unresponsive(&mut self);

    /// Run the reset sequencer.
    async fn recover(&mut self, budget: ResetBudget) -> ResetOutcome;
}

impl<SPI, XCS, XDCS, DREQ, RST, LED, D> MonitoredChip for Vs1053<SPI, XCS, XDCS, DREQ, RST, LED, D>
where
    SPI: SpiPeripheral,
    XCS: StatefulOutputPin,
    XDCS: StatefulOutputPin,
    DREQ: InputPin,
    RST: OutputPin,
    LED: OutputPin,
    D: DelayNs,
{
    async fn probe_status(&mut self) -> StatusProbe {
        match self.read_register(Register::Status).await {
            Ok(0) => StatusProbe::Dead,
            Ok(status) => StatusProbe::Alive(status),
            Err(err) if err.is_contention() => StatusProbe::Busy,
            Err(err) => {
                trace!("status read failed: {}", err.label());
                StatusProbe::Dead
            }
        }
    }

    fn state(&self) -> ChipState {
        self.state
    }

    fn mark_unresponsive(&mut self) {
        if self.state == ChipState::Operational {
            self.set_indicator(false);
        }
        self.state = ChipState::Unresponsive;
    }

    async fn recover(&mut self, budget: ResetBudget) -> ResetOutcome {
        self.reset(budget).await
    }
}

/// One monitor step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MonitorEvent {
    /// Status was non-zero.
    Alive {
        /// SCI_STATUS value.
        status: u16,
    },
    /// A previously operational chip went silent; a stamina reset ran.
    WentOffline(ResetOutcome),
    /// A chip that was not operational is still silent; one attempt ran.
    Retried(ResetOutcome),
    /// The bus was held by the data channel; nothing was concluded.
    Busy,
}

/// Background liveness checker.
pub struct HealthMonitor<D> {
    config: MonitorConfig,
    delay: D,
    escalations: u32,
}

impl<D: DelayNs> HealthMonitor<D> {
    /// Create a monitor that sleeps on `delay` between polls.
    pub fn new(config: MonitorConfig, delay: D) -> Self {
        Self {
            config,
            delay,
            escalations: 0,
        }
    }

    /// "Went offline" escalations so far.
    #[must_use]
    pub fn escalations(&self) -> u32 {
        self.escalations
    }

    /// Probe once and recover if needed.
    pub async fn poll_once<M, C>(&mut self, chip: &Mutex<M, C>) -> MonitorEvent
    where
        M: RawMutex,
        C: MonitoredChip,
    {
        let mut chip = chip.lock().await;
        let before = chip.state();
        match chip.probe_status().await {
            StatusProbe::Alive(status) => MonitorEvent::Alive { status },
            StatusProbe::Busy => MonitorEvent::Busy,
            StatusProbe::Dead if before == ChipState::Operational => {
                chip.mark_unresponsive();
                self.escalations = self.escalations.saturating_add(1);
                warn!(
                    "VS1053 went offline, resetting with {} attempts",
                    self.config.stamina
                );
                let outcome = chip.recover(ResetBudget::Attempts(self.config.stamina)).await;
                MonitorEvent::WentOffline(outcome)
            }
            StatusProbe::Dead => {
                chip.mark_unresponsive();
                let outcome = chip.recover(ResetBudget::Attempts(1)).await;
                MonitorEvent::Retried(outcome)
            }
        }
    }

    /// Poll forever.
    pub async fn run<M, C>(&mut self, chip: &Mutex<M, C>)
    where
        M: RawMutex,
        C: MonitoredChip,
    {
        loop {
            self.poll_once(chip).await;
            pause(&mut self.delay, self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;

    /// Replays a fixed status sequence; recovery always fails.
    struct ScriptedChip<'a> {
        statuses: &'a [u16],
        next: usize,
        state: ChipState,
        budgets: heapless::Vec<ResetBudget, 8>,
    }

    impl<'a> ScriptedChip<'a> {
        fn new(statuses: &'a [u16], state: ChipState) -> Self {
            Self {
                statuses,
                next: 0,
                state,
                budgets: heapless::Vec::new(),
            }
        }
    }

    impl MonitoredChip for ScriptedChip<'_> {
        async fn probe_status(&mut self) -> StatusProbe {
            let status = self.statuses[self.next];
            self.next += 1;
            if status == 0 {
                StatusProbe::Dead
            } else {
                StatusProbe::Alive(status)
            }
        }

        fn state(&self) -> ChipState {
            self.state
        }

        fn mark_unresponsive(&mut self) {
            self.state = ChipState::Unresponsive;
        }

        async fn recover(&mut self, budget: ResetBudget) -> ResetOutcome {
            self.budgets.push(budget).unwrap();
            let attempts = match budget {
                ResetBudget::Attempts(n) => n,
                ResetBudget::Unbounded => 1,
            };
            self.state = ChipState::Unresponsive;
            ResetOutcome::Exhausted { attempts }
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    #[tokio::test]
    async fn one_escalation_per_outage() {
        let chip: Mutex<NoopRawMutex, _> = Mutex::new(ScriptedChip::new(
            &[0x40, 0x40, 0, 0, 0x48],
            ChipState::Operational,
        ));
        let mut monitor = HealthMonitor::new(MonitorConfig::new(), NoDelay);

        let mut events = heapless::Vec::<MonitorEvent, 5>::new();
        for _ in 0..5 {
            events.push(monitor.poll_once(&chip).await).unwrap();
        }

        assert_eq!(events[0], MonitorEvent::Alive { status: 0x40 });
        assert_eq!(events[1], MonitorEvent::Alive { status: 0x40 });
        assert_eq!(
            events[2],
            MonitorEvent::WentOffline(ResetOutcome::Exhausted { attempts: 5 })
        );
        assert_eq!(
            events[3],
            MonitorEvent::Retried(ResetOutcome::Exhausted { attempts: 1 })
        );
        assert_eq!(events[4], MonitorEvent::Alive { status: 0x48 });
        assert_eq!(monitor.escalations(), 1);

        let chip = chip.lock().await;
        assert_eq!(
            chip.budgets.as_slice(),
            &[ResetBudget::Attempts(5), ResetBudget::Attempts(1)]
        );
    }

    #[tokio::test]
    async fn never_operational_chip_retries_one_attempt() {
        let chip: Mutex<NoopRawMutex, _> =
            Mutex::new(ScriptedChip::new(&[0, 0, 0], ChipState::Unknown));
        let mut monitor = HealthMonitor::new(MonitorConfig::new(), NoDelay);

        for _ in 0..3 {
            let event = monitor.poll_once(&chip).await;
            assert_eq!(event, MonitorEvent::Retried(ResetOutcome::Exhausted { attempts: 1 }));
        }
        assert_eq!(monitor.escalations(), 0);
    }

    #[tokio::test]
    async fn stamina_comes_from_config() {
        let chip: Mutex<NoopRawMutex, _> =
            Mutex::new(ScriptedChip::new(&[0], ChipState::Operational));
        let config = MonitorConfig {
            stamina: 2,
            ..MonitorConfig::new()
        };
        let mut monitor = HealthMonitor::new(config, NoDelay);

        let event = monitor.poll_once(&chip).await;

        assert_eq!(event, MonitorEvent::WentOffline(ResetOutcome::Exhausted { attempts: 2 }));
    }
}

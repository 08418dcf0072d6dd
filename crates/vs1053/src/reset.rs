//! Reset sequencer.
//!
//! One attempt, in order:
//!
//! 1. indicator off, both select lines inactive
//! 2. bus to the conservative rate
//! 3. XRESET low for `reset_pulse`, high, wait `boot_settle`
//! 4. sample DREQ once; low fails the attempt
//! 5. write SCI_CLOCKF with verify; a mismatch fails the attempt
//! 6. bus to the fast rate (only reachable after step 5 succeeded)
//! 7. self-check ramp on SCI_VOL; individual write failures are skipped
//! 8. indicator on, success
//!
//! Attempts repeat until one succeeds or the [`ResetBudget`] runs out. Either
//! way a single best-effort SM_TESTS write follows. Exhaustion is reported as
//! [`ResetOutcome::Exhausted`], never as an error.
//!
//! Callers serialise resets by sharing the driver behind one
//! `embassy_sync::mutex::Mutex`; a reset holds the lock for its whole run.

use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;
use platform::{SpiPeripheral, VolumePercent, VolumeRegister};

use crate::config::{pause, BusTiming};
use crate::driver::{ChipState, Vs1053};
use crate::error::Error;
use crate::registers::{Register, SM_TESTS};

/// How many reset attempts a caller grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetBudget {
    /// At most this many attempts. Zero runs no attempt.
    Attempts(u32),
    /// Retry until the chip comes up.
    Unbounded,
}

impl ResetBudget {
    /// Whether another attempt may start after `used` attempts.
    #[must_use]
    pub const fn allows(self, used: u32) -> bool {
        match self {
            Self::Attempts(limit) => used < limit,
            Self::Unbounded => true,
        }
    }
}

/// Terminal result of a reset cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetOutcome {
    /// The chip passed the clock check; `attempts` includes the passing one.
    Success {
        /// Attempts used.
        attempts: u32,
    },
    /// Every granted attempt failed.
    Exhausted {
        /// Attempts used.
        attempts: u32,
    },
}

impl ResetOutcome {
    /// Whether the chip came up.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Attempts consumed.
    #[must_use]
    pub const fn attempts(self) -> u32 {
        match self {
            Self::Success { attempts } | Self::Exhausted { attempts } => attempts,
        }
    }
}

impl<SPI, XCS, XDCS, DREQ, RST, LED, D> Vs1053<SPI, XCS, XDCS, DREQ, RST, LED, D>
where
    SPI: SpiPeripheral,
    XCS: StatefulOutputPin,
    XDCS: StatefulOutputPin,
    DREQ: InputPin,
    RST: OutputPin,
    LED: OutputPin,
    D: DelayNs,
{
    /// Reset the chip and verify it, retrying within `budget`.
    pub async fn reset(&mut self, budget: ResetBudget) -> ResetOutcome {
        self.set_indicator(false);
        let mut attempts: u32 = 0;
        let outcome = loop {
            if !budget.allows(attempts) {
                break ResetOutcome::Exhausted { attempts };
            }
            attempts = attempts.saturating_add(1);
            self.state = ChipState::Resetting;
            debug!("reset attempt {}", attempts);

            match self.reset_attempt().await {
                Ok(skipped) => {
                    if skipped > 0 {
                        debug!("self-check skipped {} writes", skipped);
                    }
                    break ResetOutcome::Success { attempts };
                }
                Err(err) => {
                    warn!("reset attempt {} failed: {}", attempts, err.label());
                }
            }
        };

        self.state = if outcome.is_success() {
            ChipState::Operational
        } else {
            ChipState::Unresponsive
        };

        if let Err(err) = self.set_mode_bits(SM_TESTS).await {
            warn!("SM_TESTS not set: {}", err.label());
        }

        match outcome {
            ResetOutcome::Success { attempts } => info!("VS1053 online after {} attempts", attempts),
            ResetOutcome::Exhausted { attempts } => {
                error!("VS1053 unresponsive after {} attempts", attempts);
            }
        }
        outcome
    }

    /// Reset until the chip answers, then apply `volume`.
    ///
    /// A failed volume write does not undo the reset: the chip stays
    /// [`ChipState::Operational`] and the error is returned.
    pub async fn start_up(&mut self, volume: VolumePercent) -> Result<ResetOutcome, Error<SPI::Error>> {
        let outcome = self.reset(ResetBudget::Unbounded).await;
        if let Err(err) = self.set_volume(volume).await {
            warn!(
                "volume not applied after {} reset attempts: {}",
                outcome.attempts(),
                err.label()
            );
            return Err(err);
        }
        Ok(outcome)
    }

    /// One pass of the sequence. Returns the number of self-check writes
    /// that failed.
    async fn reset_attempt(&mut self) -> Result<u8, Error<SPI::Error>> {
        self.set_indicator(false);
        self.arbiter.release_all()?;
        self.set_timing(BusTiming::Conservative)?;

        self.reset.set_low().map_err(Error::pin)?;
        pause(&mut self.delay, self.config.reset_pulse).await;
        self.reset.set_high().map_err(Error::pin)?;
        pause(&mut self.delay, self.config.boot_settle).await;

        if !self.arbiter.is_ready()? {
            return Err(Error::NotReady);
        }

        self.write_register(Register::ClockF, self.config.clock_multiplier)
            .await?;
        self.set_timing(BusTiming::Fast)?;

        let mut skipped: u8 = 0;
        for step in 0..self.config.self_check_iterations {
            let value = VolumeRegister::from(VolumePercent::new(step)).get();
            if let Err(err) = self.write_register(Register::Vol, value).await {
                trace!("self-check {} failed: {}", step, err.label());
                skipped = skipped.saturating_add(1);
            }
        }

        self.set_indicator(true);
        Ok(skipped)
    }
}

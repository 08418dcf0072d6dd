//! Driver and monitor configuration.
//!
//! All waits the driver performs are fixed, bounded sleeps taken from these
//! structs; nothing blocks on an unbounded condition.
//!
//! # Bus rates
//!
//! | Profile        | Formula        | Rate          | Valid when                 |
//! |----------------|----------------|---------------|----------------------------|
//! | `Conservative` | XTALI / 7      | ≈ 1.714 MHz   | always (CLKI = XTALI)      |
//! | `Fast`         | XTALI × 4.5 / 7| ≈ 7.714 MHz   | after SC_MULT = 4.5× lands |

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use platform::SpiConfig;

use crate::registers::{CLOCKF_MULT_4_5X, XTALI_HZ};

/// Conservative SCI rate: XTALI / 7.
pub const CONSERVATIVE_BUS_HZ: u32 = XTALI_HZ / 7;

/// Fast SCI rate: XTALI × 4.5 / 7.
pub const FAST_BUS_HZ: u32 = XTALI_HZ / 2 * 9 / 7;

/// Bus clock profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusTiming {
    /// Safe at any chip clock; used during reset.
    Conservative,
    /// Only valid once the clock multiplier is confirmed.
    Fast,
}

impl core::fmt::Display for BusTiming {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Conservative => "conservative",
            Self::Fast => "fast",
        })
    }
}

/// Configuration errors reported by [`DriverConfig::validate`] and
/// [`MonitorConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A bus rate of 0 Hz.
    #[error("bus rate must be non-zero")]
    ZeroBusRate,
    /// The fast rate is slower than the conservative one.
    #[error("fast bus rate below conservative rate")]
    FastBelowConservative,
    /// Ready polling enabled with a zero interval (the bound would be 0 ms).
    #[error("ready poll interval must be non-zero")]
    ZeroPollInterval,
    /// More self-check writes than distinct volume steps (0–100).
    #[error("self-check iterations exceed 101 distinct volume steps")]
    SelfCheckTooLong,
    /// Monitor stamina of zero would never reset an offline chip.
    #[error("monitor stamina must be at least one attempt")]
    ZeroStamina,
}

/// Driver timing and reset parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// SCI clock during reset and before SCI_CLOCKF is confirmed.
    pub conservative_hz: u32,
    /// SCI clock after SCI_CLOCKF is confirmed.
    pub fast_hz: u32,
    /// DREQ re-checks before a transaction gives up (`polls + 1` samples).
    pub ready_polls: u8,
    /// Sleep between DREQ samples.
    pub ready_poll_interval: Duration,
    /// Time XRESET is held low.
    pub reset_pulse: Duration,
    /// Time allowed for the chip to boot after XRESET is released.
    pub boot_settle: Duration,
    /// Value programmed into SCI_CLOCKF.
    pub clock_multiplier: u16,
    /// SCI_VOL writes in the post-reset self-check ramp.
    pub self_check_iterations: u8,
}

impl DriverConfig {
    /// Reference configuration for a VS1053 on the default crystal.
    ///
    /// The chip's worst-case DREQ latency is ~0.17 ms (100 CLKI cycles); the
    /// 5 × 1 ms ready bound leaves a wide margin.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conservative_hz: CONSERVATIVE_BUS_HZ,
            fast_hz: FAST_BUS_HZ,
            ready_polls: 5,
            ready_poll_interval: Duration::from_millis(1),
            reset_pulse: Duration::from_millis(500),
            boot_settle: Duration::from_millis(750),
            clock_multiplier: CLOCKF_MULT_4_5X,
            self_check_iterations: 100,
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conservative_hz == 0 || self.fast_hz == 0 {
            return Err(ConfigError::ZeroBusRate);
        }
        if self.fast_hz < self.conservative_hz {
            return Err(ConfigError::FastBelowConservative);
        }
        if self.ready_polls > 0 && self.ready_poll_interval == Duration::from_ticks(0) {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.self_check_iterations > 101 {
            return Err(ConfigError::SelfCheckTooLong);
        }
        Ok(())
    }

    /// SPI settings for a bus timing profile.
    #[must_use]
    pub const fn spi_config(&self, timing: BusTiming) -> SpiConfig {
        match timing {
            BusTiming::Conservative => SpiConfig::mode0_msb_first(self.conservative_hz),
            BusTiming::Fast => SpiConfig::mode0_msb_first(self.fast_hz),
        }
    }

    /// Longest a single ready-gated acquire can wait.
    #[must_use]
    pub fn ready_bound(&self) -> Duration {
        Duration::from_ticks(
            self.ready_poll_interval
                .as_ticks()
                .saturating_mul(u64::from(self.ready_polls)),
        )
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Health monitor parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Sleep between SCI_STATUS polls.
    pub poll_interval: Duration,
    /// Reset attempts granted when a previously operational chip goes silent.
    pub stamina: u32,
}

impl MonitorConfig {
    /// 1 ms polling, 5 attempts after an operational chip drops out.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            stamina: 5,
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stamina == 0 {
            return Err(ConfigError::ZeroStamina);
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep for `duration` on `delay`, saturating at `u32::MAX` microseconds.
pub(crate) async fn pause<D: DelayNs>(delay: &mut D, duration: Duration) {
    let us = u32::try_from(duration.as_micros()).unwrap_or(u32::MAX);
    delay.delay_us(us).await;
}

//! VS1053 driver handle and chip state.
//!
//! [`Vs1053`] owns the SPI transport, the arbiter (XCS, XDCS, DREQ), the
//! XRESET line, the health indicator and a delay source. Chip state lives in
//! the handle itself; other tasks see it through [`Vs1053::state`] on a
//! shared `embassy_sync::mutex::Mutex<_, Vs1053<..>>`.
//!
//! Operations are split across modules by concern:
//! - `transport.rs`: SCI register access, SDI streaming, volume
//! - `reset.rs`: reset sequencer
//! - `plugin.rs`: compressed plugin loader
//! - `health.rs`: status probing for the monitor

use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;
use platform::SpiPeripheral;

use crate::arbiter::BusArbiter;
use crate::config::{BusTiming, ConfigError, DriverConfig};
use crate::error::Error;

/// Health of the chip as last observed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipState {
    /// No reset has completed since the handle was created.
    Unknown,
    /// A reset attempt is in progress.
    Resetting,
    /// The last reset passed the CLOCKF check and self-check ramp.
    Operational,
    /// The last reset cycle exhausted its budget.
    Unresponsive,
}

impl ChipState {
    /// Whether the indicator should be lit.
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Operational)
    }
}

impl core::fmt::Display for ChipState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Resetting => "resetting",
            Self::Operational => "operational",
            Self::Unresponsive => "unresponsive",
        })
    }
}

/// GPIO lines wired to the chip.
pub struct ControlPins<XCS, XDCS, DREQ, RST, LED> {
    /// SCI chip select (active low).
    pub xcs: XCS,
    /// SDI chip select (active low).
    pub xdcs: XDCS,
    /// Data request input (high = ready).
    pub dreq: DREQ,
    /// Hardware reset (active low).
    pub reset: RST,
    /// Health indicator (high = operational).
    pub indicator: LED,
}

/// VS1053 driver.
pub struct Vs1053<SPI, XCS, XDCS, DREQ, RST, LED, D> {
    pub(crate) spi: SPI,
    pub(crate) arbiter: BusArbiter<XCS, XDCS, DREQ>,
    pub(crate) reset: RST,
    pub(crate) indicator: LED,
    pub(crate) delay: D,
    pub(crate) config: DriverConfig,
    pub(crate) state: ChipState,
    pub(crate) timing: BusTiming,
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
    /// Create the driver.
    ///
    /// Drives both select lines inactive, XRESET high, the indicator off and
    /// the bus to the conservative rate. The chip is not reset; call
    /// [`reset`](Self::reset) or [`start_up`](Self::start_up).
    ///
    /// # Errors
    ///
    /// An inconsistent `config` is rejected before any line is driven.
    pub fn new(
        mut spi: SPI,
        pins: ControlPins<XCS, XDCS, DREQ, RST, LED>,
        delay: D,
        config: DriverConfig,
    ) -> Result<Self, ConfigError> {
        if let Err(err) = config.validate() {
            error!("rejected driver config: {}", err);
            return Err(err);
        }
        let ControlPins {
            xcs,
            xdcs,
            dreq,
            mut reset,
            mut indicator,
        } = pins;
        let mut arbiter = BusArbiter::new(
            xcs,
            xdcs,
            dreq,
            config.ready_polls,
            config.ready_poll_interval,
        );

        // Pin errors here resurface on the first reset attempt.
        let _ = arbiter.release_all();
        let _ = reset.set_high();
        let _ = indicator.set_low();
        if spi
            .configure(config.spi_config(BusTiming::Conservative))
            .is_err()
        {
            warn!("SPI rejected conservative bus configuration");
        }

        Ok(Self {
            spi,
            arbiter,
            reset,
            indicator,
            delay,
            config,
            state: ChipState::Unknown,
            timing: BusTiming::Conservative,
        })
    }

    /// Current chip state.
    #[must_use]
    pub fn state(&self) -> ChipState {
        self.state
    }

    /// Whether the last reset left the chip operational.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    /// Active bus clock profile.
    #[must_use]
    pub fn bus_timing(&self) -> BusTiming {
        self.timing
    }

    /// Driver configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Switch the SPI clock profile.
    pub(crate) fn set_timing(&mut self, timing: BusTiming) -> Result<(), Error<SPI::Error>> {
        self.spi
            .configure(self.config.spi_config(timing))
            .map_err(Error::Spi)?;
        if self.timing != timing {
            debug!("bus timing {} -> {}", self.timing, timing);
        }
        self.timing = timing;
        Ok(())
    }

    /// Drive the health indicator. A failing LED never fails an operation.
    pub(crate) fn set_indicator(&mut self, on: bool) {
        let result = if on {
            self.indicator.set_high()
        } else {
            self.indicator.set_low()
        };
        if result.is_err() {
            warn!("health indicator pin fault");
        }
    }

    /// Tear the driver down and return its parts.
    pub fn free(self) -> (SPI, ControlPins<XCS, XDCS, DREQ, RST, LED>, D) {
        let (xcs, xdcs, dreq) = self.arbiter.free();
        (
            self.spi,
            ControlPins {
                xcs,
                xdcs,
                dreq,
                reset: self.reset,
                indicator: self.indicator,
            },
            self.delay,
        )
    }
}

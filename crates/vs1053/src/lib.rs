//! VS1053 audio decoder control driver
//!
//! Bus-level control of a VLSI VS1053 over one SPI bus with two select lines
//! (XCS for SCI register access, XDCS for SDI decode data) and the DREQ
//! ready line.
//!
//! # Layers
//!
//! ```text
//! HealthMonitor ──► reset sequencer ──► register transport ──► BusArbiter ──► SpiPeripheral
//!  (health.rs)        (reset.rs)          (transport.rs)       (arbiter.rs)     (platform)
//! ```
//!
//! - [`BusArbiter`]: XCS/XDCS mutual exclusion and the bounded DREQ wait.
//!   The only code that touches the select lines.
//! - [`Vs1053::write_register`] / [`Vs1053::read_register`]: one SCI frame
//!   each, writes verified by read-back (except SCI_AIADDR).
//! - [`Vs1053::reset`]: XRESET pulse, CLOCKF programming, bus speed-up and
//!   a self-check ramp, retried within a [`ResetBudget`].
//! - [`HealthMonitor`]: polls SCI_STATUS and re-arms the reset sequencer.
//!
//! # Sharing the driver
//!
//! Foreground code and the monitor share one
//! `embassy_sync::mutex::Mutex<_, Vs1053<..>>`. Every reset runs under that
//! lock, so two resets can never interleave XRESET pulses.
//!
//! ```no_run
//! # async fn demo<M, C, D>(chip: &embassy_sync::mutex::Mutex<M, C>, delay: D)
//! # where
//! #     M: embassy_sync::blocking_mutex::raw::RawMutex,
//! #     C: vs1053::MonitoredChip,
//! #     D: embedded_hal_async::delay::DelayNs,
//! # {
//! use vs1053::{HealthMonitor, MonitorConfig};
//!
//! let mut monitor = HealthMonitor::new(MonitorConfig::default(), delay);
//! monitor.run(chip).await;
//! # }
//! ```
//!
//! # Features
//!
//! - `defmt`: log through `defmt` and derive `defmt::Format` on public types
//! - `tracing`: log through `tracing` (host builds)

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

// Must come first: the logging macros are textually scoped.
#[macro_use]
mod fmt;

pub mod arbiter;
pub mod config;
pub mod driver;
pub mod error;
pub mod health;
pub mod mock;
pub mod plugin;
pub mod registers;
pub mod reset;
mod transport;

pub use arbiter::{ArbiterError, BusArbiter, Channel, ChannelGuard};
pub use config::{BusTiming, ConfigError, DriverConfig, MonitorConfig};
pub use driver::{ChipState, ControlPins, Vs1053};
pub use error::Error;
pub use health::{HealthMonitor, MonitorEvent, MonitoredChip, StatusProbe};
pub use plugin::{PluginError, PluginReport, PluginWrites};
pub use registers::Register;
pub use reset::{ResetBudget, ResetOutcome};

pub use platform::{VolumePercent, VolumeRegister};

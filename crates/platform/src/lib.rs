//! Hardware Abstraction Layer (HAL) for the VS1053 control driver
//!
//! This crate provides the trait-based bus abstraction and domain newtypes
//! the driver is written against, enabling development and testing without
//! physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Application (setup + status loop)
//!         ↓
//! vs1053 driver (arbiter, transport, reset sequencer, health monitor)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (Embassy HAL + PAC)
//! ```
//!
//! GPIO and delays use the `embedded-hal` / `embedded-hal-async` traits
//! directly; only the SPI transport needs a richer trait, because the
//! decoder changes bus clock mid-session.
//!
//! # Features
//!
//! - `defmt`: Enable `defmt::Format` derives
//!
//! # Example
//!
//! ```no_run
//! use platform::{SpiConfig, SpiPeripheral};
//!
//! async fn slow_down<S: SpiPeripheral>(spi: &mut S) -> Result<(), S::Error> {
//!     spi.configure(SpiConfig::mode0_msb_first(1_714_285))
//! }
//! ```

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

pub mod audio_types;
pub mod peripheral;

pub use audio_types::{OutOfRangeError, VolumePercent, VolumeRegister};
pub use peripheral::{BitOrder, SpiConfig, SpiMode, SpiPeripheral};

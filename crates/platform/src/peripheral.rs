//! Peripheral abstraction layer
//!
//! Provides the SPI bus transport the decoder driver runs on. Chip-select
//! lines are NOT part of this trait: the VS1053 has two select lines that
//! must be arbitrated by the driver, so the transport only clocks bytes.
//!
//! The driver depends on three capabilities and nothing else:
//! - a selectable clock rate / mode ([`SpiPeripheral::configure`])
//! - 8-bit and 16-bit big-endian transfers
//!   ([`SpiPeripheral::transfer_byte`], [`SpiPeripheral::transfer_word`])
//! - a bulk byte-sequence write ([`SpiPeripheral::write`])

/// SPI bus transport abstraction
pub trait SpiPeripheral {
    /// Error type
    type Error: core::fmt::Debug;

    /// Transfer data (full duplex). `read` and `write` have equal length.
    fn transfer(
        &mut self,
        read: &mut [u8],
        write: &[u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Write data (half duplex, received bytes discarded)
    fn write(&mut self, data: &[u8])
        -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Configure SPI mode and frequency
    ///
    /// Takes effect for the next transfer. Never called while a select line
    /// is asserted.
    fn configure(&mut self, config: SpiConfig) -> Result<(), Self::Error>;

    /// Shift one byte out and return the byte shifted in.
    fn transfer_byte(
        &mut self,
        byte: u8,
    ) -> impl core::future::Future<Output = Result<u8, Self::Error>> {
        async move {
            let mut rx = [0u8];
            self.transfer(&mut rx, &[byte]).await?;
            let [value] = rx;
            Ok(value)
        }
    }

    /// Shift a 16-bit word out MSB first and return the word shifted in.
    fn transfer_word(
        &mut self,
        word: u16,
    ) -> impl core::future::Future<Output = Result<u16, Self::Error>> {
        async move {
            let mut rx = [0u8; 2];
            self.transfer(&mut rx, &word.to_be_bytes()).await?;
            Ok(u16::from_be_bytes(rx))
        }
    }
}

/// SPI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
    /// SPI mode (CPOL, CPHA)
    pub mode: SpiMode,
    /// Bit order
    pub bit_order: BitOrder,
}

impl SpiConfig {
    /// Mode 0, MSB first at `frequency` Hz, the only format the VS10xx
    /// serial interfaces accept.
    #[must_use]
    pub const fn mode0_msb_first(frequency: u32) -> Self {
        Self {
            frequency,
            mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
        }
    }
}

/// SPI modes (CPOL, CPHA)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiMode {
    /// Mode 0: CPOL=0, CPHA=0
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

/// Bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit first
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

//! VS1053 SCI register map
//!
//! Source: VLSI Solution VS1053b Datasheet v1.31, section 9.6 (SCI Registers).
//!
//! # Key SCI Constraints
//!
//! ## Fixed 4-byte transactions
//! Every SCI transaction is `opcode, address, data_hi, data_lo` with XCS held
//! low for the whole frame. Reads clock the data bytes out with dummy `0xFF`
//! writes.
//!
//! ## XCS / XDCS exclusivity
//! The chip must never see both select lines asserted at once; the SDI input
//! would receive the SCI frame as audio data.
//!
//! ## SCI_AIADDR read-back
//! Reading SCI_AIADDR while an application is running can drop the sample
//! rate (datasheet section 9.6.11). Writes to it are never verified.
//!
//! ## SCI_WRAM auto-increment
//! Every access to SCI_WRAM advances SCI_WRAMADDR. A verifying read-back
//! after a WRAM write would skip a word, so memory-port writes go out
//! unverified.
//!
//! ## SCI clock ceiling
//! SCI reads are limited to CLKI/7. The chip boots with CLKI = XTALI, so the
//! bus must stay slow until SC_MULT in SCI_CLOCKF has been raised.

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// SCI write instruction.
pub const OPCODE_WRITE: u8 = 0x02;

/// SCI read instruction.
pub const OPCODE_READ: u8 = 0x03;

/// Dummy word clocked out while reading a register.
pub const READ_FILLER: u16 = 0xFFFF;

// ---------------------------------------------------------------------------
// Register addresses
// ---------------------------------------------------------------------------

/// One of the sixteen SCI registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Mode control (SM_* bits).
    Mode = 0x0,
    /// Status; `0x40`/`0x48` once the analog driver is up. Zero means the bus
    /// or the chip is dead.
    Status = 0x1,
    /// Built-in bass/treble control.
    Bass = 0x2,
    /// Clock frequency + multiplier.
    ClockF = 0x3,
    /// Decode time in whole seconds.
    DecodeTime = 0x4,
    /// Misc. audio data (sample rate, stereo flag).
    AuData = 0x5,
    /// RAM write/read data port (auto-increments SCI_WRAMADDR).
    Wram = 0x6,
    /// Base address for RAM write/read.
    WramAddr = 0x7,
    /// Stream header data 0.
    Hdat0 = 0x8,
    /// Stream header data 1.
    Hdat1 = 0x9,
    /// Start address of an application.
    AiAddr = 0xA,
    /// Volume control (left in the high byte, right in the low byte).
    Vol = 0xB,
    /// Application control register 0.
    AiCtrl0 = 0xC,
    /// Application control register 1.
    AiCtrl1 = 0xD,
    /// Application control register 2.
    AiCtrl2 = 0xE,
    /// Application control register 3.
    AiCtrl3 = 0xF,
}

impl Register {
    /// Every register in address order.
    pub const ALL: [Self; 16] = [
        Self::Mode,
        Self::Status,
        Self::Bass,
        Self::ClockF,
        Self::DecodeTime,
        Self::AuData,
        Self::Wram,
        Self::WramAddr,
        Self::Hdat0,
        Self::Hdat1,
        Self::AiAddr,
        Self::Vol,
        Self::AiCtrl0,
        Self::AiCtrl1,
        Self::AiCtrl2,
        Self::AiCtrl3,
    ];

    /// Wire address sent after the opcode.
    #[must_use]
    pub const fn addr(self) -> u8 {
        self as u8
    }

    /// Look a register up by its wire address.
    #[must_use]
    #[allow(clippy::indexing_slicing)] // addr < 16 checked first
    pub const fn from_addr(addr: u8) -> Option<Self> {
        if addr < 16 {
            Some(Self::ALL[addr as usize])
        } else {
            None
        }
    }

    /// Datasheet name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mode => "SCI_MODE",
            Self::Status => "SCI_STATUS",
            Self::Bass => "SCI_BASS",
            Self::ClockF => "SCI_CLOCKF",
            Self::DecodeTime => "SCI_DECODE_TIME",
            Self::AuData => "SCI_AUDATA",
            Self::Wram => "SCI_WRAM",
            Self::WramAddr => "SCI_WRAMADDR",
            Self::Hdat0 => "SCI_HDAT0",
            Self::Hdat1 => "SCI_HDAT1",
            Self::AiAddr => "SCI_AIADDR",
            Self::Vol => "SCI_VOL",
            Self::AiCtrl0 => "SCI_AICTRL0",
            Self::AiCtrl1 => "SCI_AICTRL1",
            Self::AiCtrl2 => "SCI_AICTRL2",
            Self::AiCtrl3 => "SCI_AICTRL3",
        }
    }

    /// Whether a write is confirmed by reading the register back.
    #[must_use]
    pub const fn verifies_on_write(self) -> bool {
        !matches!(self, Self::AiAddr)
    }

    /// Whether accesses have side effects on chip memory pointers.
    #[must_use]
    pub const fn is_memory_port(self) -> bool {
        matches!(self, Self::Wram)
    }
}

impl TryFrom<u8> for Register {
    type Error = u8;

    fn try_from(addr: u8) -> Result<Self, Self::Error> {
        Self::from_addr(addr).ok_or(addr)
    }
}

impl core::fmt::Display for Register {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// SCI_MODE bits
// ---------------------------------------------------------------------------

/// Differential left-channel output.
pub const SM_DIFF: u16 = 1 << 0;
/// Software reset.
pub const SM_RESET: u16 = 1 << 2;
/// Cancel decoding the current file.
pub const SM_CANCEL: u16 = 1 << 3;
/// Allow SDI tests.
pub const SM_TESTS: u16 = 1 << 5;
/// Native SPI modes; set by default after boot.
pub const SM_SDINEW: u16 = 1 << 11;
/// MIC / LINE1 selector.
pub const SM_LINE1: u16 = 1 << 14;

// ---------------------------------------------------------------------------
// SCI_CLOCKF
// ---------------------------------------------------------------------------

/// SC_MULT = 4.5× XTALI, SC_ADD = 0, SC_FREQ = 0 (default crystal).
pub const CLOCKF_MULT_4_5X: u16 = 0xC000;

/// Mask of the SC_MULT field.
pub const CLOCKF_MULT_MASK: u16 = 0xE000;

/// Nominal crystal frequency used for bus-rate derivation.
pub const XTALI_HZ: u32 = 12_000_000;

// ---------------------------------------------------------------------------
// SCI_STATUS
// ---------------------------------------------------------------------------

/// Power-on SCI_STATUS: analog driver enabled.
pub const STATUS_BOOT_DEFAULT: u16 = 0x0040;

// ---------------------------------------------------------------------------
// SDI
// ---------------------------------------------------------------------------

/// Bytes the SDI FIFO is guaranteed to accept each time DREQ is high.
pub const SDI_CHUNK_BYTES: usize = 32;

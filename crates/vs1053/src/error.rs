//! Driver error type.

use embedded_hal::digital::{self, ErrorKind};

use crate::arbiter::{ArbiterError, Channel};
use crate::registers::Register;

/// Errors returned by register, data and plugin operations.
///
/// Generic over the SPI transport's error type `E`. Every variant is
/// recoverable by retrying the operation; the reset sequencer folds them into
/// a failed attempt rather than returning them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum Error<E> {
    /// The other select line is asserted.
    #[error("{requested} channel blocked by the other select line")]
    Contention {
        /// Channel that was requested.
        requested: Channel,
    },

    /// DREQ stayed low for the whole ready window.
    #[error("DREQ not asserted within the ready window")]
    NotReady,

    /// Read-back after a write did not match.
    #[error("{register} read back {read:#06x} after writing {wrote:#06x}")]
    VerifyMismatch {
        /// Register that was written.
        register: Register,
        /// Value written.
        wrote: u16,
        /// Value read back.
        read: u16,
    },

    /// SPI transport failure.
    #[error("SPI transfer failed: {0:?}")]
    Spi(E),

    /// A control or select pin could not be driven or sampled.
    #[error("control pin fault: {0:?}")]
    Pin(ErrorKind),

    /// Plugin image ended inside a record.
    #[error("plugin image truncated at word {offset}")]
    PluginTruncated {
        /// Word offset of the incomplete record.
        offset: usize,
    },

    /// Plugin record targets an address outside the SCI map.
    #[error("plugin image names register {address:#x} at word {offset}")]
    PluginAddress {
        /// Word offset of the record.
        offset: usize,
        /// Address found in the image.
        address: u16,
    },
}

impl<E> Error<E> {
    /// Short static label for log lines.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Contention { .. } => "contention",
            Self::NotReady => "not ready",
            Self::VerifyMismatch { .. } => "verify mismatch",
            Self::Spi(_) => "spi",
            Self::Pin(_) => "pin",
            Self::PluginTruncated { .. } => "plugin truncated",
            Self::PluginAddress { .. } => "plugin address",
        }
    }

    /// Whether the failure came from bus arbitration rather than the chip.
    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    pub(crate) fn pin(err: impl digital::Error) -> Self {
        Self::Pin(err.kind())
    }
}

impl<E> From<ArbiterError> for Error<E> {
    fn from(err: ArbiterError) -> Self {
        match err {
            ArbiterError::Contention(requested) => Self::Contention { requested },
            ArbiterError::NotReady => Self::NotReady,
            ArbiterError::Pin(kind) => Self::Pin(kind),
        }
    }
}

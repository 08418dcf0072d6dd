//! Compressed plugin loader.
//!
//! VLSI distributes patches and applications as a flat `u16` image of
//! records:
//!
//! ```text
//! addr  count  value...
//! ```
//!
//! If bit 15 of `count` is set, the single following value is written
//! `count & 0x7FFF` times to `addr` (a fill run). Otherwise the next `count`
//! values are written to `addr` in order (a copy run). `addr` is always an
//! SCI register; images stream into RAM through SCI_WRAMADDR / SCI_WRAM.

use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;
use platform::SpiPeripheral;

use crate::driver::Vs1053;
use crate::error::Error;
use crate::registers::Register;

const FILL_FLAG: u16 = 0x8000;
const COUNT_MASK: u16 = 0x7FFF;

/// Malformed plugin image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PluginError {
    /// The image ends inside the record starting at `offset`.
    Truncated {
        /// Word offset of the record.
        offset: usize,
    },
    /// The record at `offset` names an address outside the SCI map.
    BadAddress {
        /// Word offset of the record.
        offset: usize,
        /// Address found.
        address: u16,
    },
}

impl<E> From<PluginError> for Error<E> {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Truncated { offset } => Self::PluginTruncated { offset },
            PluginError::BadAddress { offset, address } => Self::PluginAddress { offset, address },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Run {
    Fill { register: Register, value: u16, left: u16 },
    Copy { register: Register, left: u16 },
}

/// Iterator over the register writes encoded in a plugin image.
///
/// Yields `Err` once on a malformed record and then stops.
pub struct PluginWrites<'a> {
    image: &'a [u16],
    pos: usize,
    run: Option<Run>,
    failed: bool,
}

impl<'a> PluginWrites<'a> {
    /// Decode `image`.
    #[must_use]
    pub fn new(image: &'a [u16]) -> Self {
        Self {
            image,
            pos: 0,
            run: None,
            failed: false,
        }
    }

    fn word(&mut self) -> Option<u16> {
        let word = self.image.get(self.pos).copied()?;
        self.pos = self.pos.saturating_add(1);
        Some(word)
    }

    fn fail(&mut self, err: PluginError) -> Option<Result<(Register, u16), PluginError>> {
        self.failed = true;
        Some(Err(err))
    }

    fn start_run(&mut self) -> Result<Option<Run>, PluginError> {
        let offset = self.pos;
        let Some(address) = self.word() else {
            return Ok(None);
        };
        let register = u8::try_from(address)
            .ok()
            .and_then(Register::from_addr)
            .ok_or(PluginError::BadAddress { offset, address })?;
        let count = self.word().ok_or(PluginError::Truncated { offset })?;

        if count & FILL_FLAG != 0 {
            let value = self.word().ok_or(PluginError::Truncated { offset })?;
            Ok(Some(Run::Fill {
                register,
                value,
                left: count & COUNT_MASK,
            }))
        } else {
            let available = self.image.len().saturating_sub(self.pos);
            if usize::from(count) > available {
                return Err(PluginError::Truncated { offset });
            }
            Ok(Some(Run::Copy {
                register,
                left: count,
            }))
        }
    }
}

impl Iterator for PluginWrites<'_> {
    type Item = Result<(Register, u16), PluginError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            match self.run {
                Some(Run::Fill {
                    register,
                    value,
                    left,
                }) if left > 0 => {
                    self.run = Some(Run::Fill {
                        register,
                        value,
                        left: left.saturating_sub(1),
                    });
                    return Some(Ok((register, value)));
                }
                Some(Run::Copy { register, left }) if left > 0 => {
                    // Copy runs are length-checked in `start_run`.
                    let value = self.word()?;
                    self.run = Some(Run::Copy {
                        register,
                        left: left.saturating_sub(1),
                    });
                    return Some(Ok((register, value)));
                }
                _ => match self.start_run() {
                    Ok(Some(run)) => self.run = Some(run),
                    Ok(None) => return None,
                    Err(err) => return self.fail(err),
                },
            }
        }
    }
}

/// Summary of a plugin load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PluginReport {
    /// Register writes issued.
    pub writes: u32,
    /// Verified writes whose read-back differed.
    pub mismatches: u32,
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
    /// Apply a compressed plugin image.
    ///
    /// SCI_WRAM and SCI_WRAMADDR writes go out unverified (a read-back would
    /// advance the RAM pointer). Other registers are verified; a mismatch is
    /// counted in the report and the load continues. Bus, arbitration and
    /// image errors abort.
    pub async fn load_plugin(&mut self, image: &[u16]) -> Result<PluginReport, Error<SPI::Error>> {
        let mut report = PluginReport::default();
        for write in PluginWrites::new(image) {
            let (register, value) = write?;
            let result = if register.is_memory_port() || register == Register::WramAddr {
                self.write_register_unverified(register, value).await
            } else {
                self.write_register(register, value).await
            };
            match result {
                Ok(()) => {}
                Err(Error::VerifyMismatch { .. }) => {
                    report.mismatches = report.mismatches.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
            report.writes = report.writes.saturating_add(1);
        }
        info!(
            "plugin loaded: {} writes, {} mismatches",
            report.writes, report.mismatches
        );
        Ok(report)
    }
}

//! SCI register transport and SDI streaming.
//!
//! Every register transaction is one XCS frame:
//!
//! ```text
//! write:  0x02  addr  value_hi  value_lo
//! read:   0x03  addr  0xFF      0xFF      (chip shifts value out on MISO)
//! ```
//!
//! Writes are confirmed by a second frame reading the register back, except
//! for SCI_AIADDR. No retries happen here; retry policy belongs to callers.

use embedded_hal::digital::{InputPin, OutputPin, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;
use platform::{SpiPeripheral, VolumePercent, VolumeRegister};

use crate::arbiter::{ArbiterError, Channel};
use crate::driver::Vs1053;
use crate::error::Error;
use crate::registers::{Register, OPCODE_READ, OPCODE_WRITE, READ_FILLER, SDI_CHUNK_BYTES};

async fn sci_write<S: SpiPeripheral>(
    spi: &mut S,
    register: Register,
    value: u16,
) -> Result<(), S::Error> {
    spi.transfer_byte(OPCODE_WRITE).await?;
    spi.transfer_byte(register.addr()).await?;
    spi.transfer_word(value).await?;
    Ok(())
}

async fn sci_read<S: SpiPeripheral>(spi: &mut S, register: Register) -> Result<u16, S::Error> {
    spi.transfer_byte(OPCODE_READ).await?;
    spi.transfer_byte(register.addr()).await?;
    spi.transfer_word(READ_FILLER).await
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
    /// Write a register and confirm it by reading it back.
    ///
    /// SCI_AIADDR is written without the confirming read.
    pub async fn write_register(
        &mut self,
        register: Register,
        value: u16,
    ) -> Result<(), Error<SPI::Error>> {
        self.write_register_unverified(register, value).await?;
        if !register.verifies_on_write() {
            return Ok(());
        }
        let read = self.read_register(register).await?;
        if read != value {
            trace!("{} wrote {:#x} read {:#x}", register, value, read);
            return Err(Error::VerifyMismatch {
                register,
                wrote: value,
                read,
            });
        }
        Ok(())
    }

    /// Write a register without reading it back.
    pub async fn write_register_unverified(
        &mut self,
        register: Register,
        value: u16,
    ) -> Result<(), Error<SPI::Error>> {
        let guard = self
            .arbiter
            .acquire(Channel::Command, true, &mut self.delay)
            .await?;
        let result = sci_write(&mut self.spi, register, value).await;
        guard.release()?;
        result.map_err(Error::Spi)
    }

    /// Read a register.
    ///
    /// A zero result is the register's value; arbitration and bus failures
    /// are reported as errors.
    pub async fn read_register(&mut self, register: Register) -> Result<u16, Error<SPI::Error>> {
        let guard = self
            .arbiter
            .acquire(Channel::Command, true, &mut self.delay)
            .await?;
        let result = sci_read(&mut self.spi, register).await;
        guard.release()?;
        result.map_err(Error::Spi)
    }

    /// Read-modify-write SCI_MODE, setting `bits`.
    pub async fn set_mode_bits(&mut self, bits: u16) -> Result<(), Error<SPI::Error>> {
        let mode = self.read_register(Register::Mode).await?;
        self.write_register(Register::Mode, mode | bits).await
    }

    /// Set both channels to `volume`.
    pub async fn set_volume(&mut self, volume: VolumePercent) -> Result<(), Error<SPI::Error>> {
        let encoded = VolumeRegister::from(volume);
        debug!("volume {}% -> {:#x}", volume.get(), encoded.get());
        self.write_register(Register::Vol, encoded.get()).await
    }

    /// Decode time of the current stream in seconds.
    pub async fn decode_time(&mut self) -> Result<u16, Error<SPI::Error>> {
        self.read_register(Register::DecodeTime).await
    }

    /// Stream header words `(HDAT0, HDAT1)`.
    pub async fn header_data(&mut self) -> Result<(u16, u16), Error<SPI::Error>> {
        let hdat0 = self.read_register(Register::Hdat0).await?;
        let hdat1 = self.read_register(Register::Hdat1).await?;
        Ok((hdat0, hdat1))
    }

    /// Stream decode data over SDI.
    ///
    /// Data goes out in 32-byte chunks; each chunk waits for DREQ, which
    /// guarantees FIFO space for at least that much.
    ///
    /// Returns the number of bytes the chip accepted. If DREQ stays low past
    /// the ready window after some chunks went out, the call stops short and
    /// reports that count; resume from `&data[sent..]`. A full FIFO before
    /// the first chunk is [`Error::NotReady`].
    pub async fn send_data(&mut self, data: &[u8]) -> Result<usize, Error<SPI::Error>> {
        let mut sent: usize = 0;
        for chunk in data.chunks(SDI_CHUNK_BYTES) {
            let guard = match self
                .arbiter
                .acquire(Channel::Data, true, &mut self.delay)
                .await
            {
                Ok(guard) => guard,
                Err(ArbiterError::NotReady) if sent > 0 => {
                    debug!("SDI stalled after {} of {} bytes", sent, data.len());
                    return Ok(sent);
                }
                Err(err) => return Err(err.into()),
            };
            let result = self.spi.write(chunk).await;
            guard.release()?;
            result.map_err(Error::Spi)?;
            sent = sent.saturating_add(chunk.len());
        }
        Ok(sent)
    }
}

//! Host-side VS1053 simulator.
//!
//! [`ChipSim`] models the parts of the chip the driver depends on: the SCI
//! frame decoder and register file, DREQ, XRESET boot behaviour and SDI byte
//! counting. [`MockSpi`], [`MockPin`] and [`MockDelay`] share one
//! `RefCell<ChipSim>` so a test can inject faults between driver calls and
//! inspect what the bus saw afterwards.
//!
//! Delays are virtual: they advance [`ChipSim::elapsed`] and yield once, so
//! a 500 ms reset pulse costs nothing in wall time but still interleaves
//! with other futures polled in the same `select`.
//!
//! Fault injection:
//! - [`ChipSim::kill`] / [`ChipSim::revive`]: power loss; DREQ low, MISO reads 0
//! - [`ChipSim::fail_next_boots`]: the next N reset pulses leave the chip dead
//! - [`ChipSim::set_dreq_stuck_low`]: DREQ never rises
//! - [`ChipSim::limit_fifo`]: DREQ drops once the stream FIFO has taken N bytes
//! - [`ChipSim::freeze`]: writes to a register are ignored
//! - [`ChipSim::set_spi_fault`]: every SPI call errors

use core::cell::RefCell;
use core::convert::Infallible;

use embassy_time::Duration;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;
use platform::{SpiConfig, SpiPeripheral};

use crate::config::{ConfigError, DriverConfig};
use crate::driver::{ControlPins, Vs1053};
use crate::registers::{Register, OPCODE_READ, OPCODE_WRITE, SM_SDINEW, STATUS_BOOT_DEFAULT};

fn register_bit(register: Register) -> u16 {
    1u16.checked_shl(u32::from(register.addr())).unwrap_or(0)
}

/// Capacity of the bus event log.
pub const LOG_CAPACITY: usize = 256;

/// Something the simulated chip observed.
///
/// SCI_VOL and SCI_STATUS traffic is counted, not logged, so self-check
/// ramps and monitor polls do not flood the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// SPI clock changed to this rate.
    Clock(u32),
    /// Completed SCI write frame.
    Write {
        /// Target register.
        register: Register,
        /// Value written.
        value: u16,
    },
    /// Completed SCI read frame.
    Read {
        /// Source register.
        register: Register,
        /// Value shifted out.
        value: u16,
    },
    /// XRESET released after being held low.
    ResetPulse {
        /// Time XRESET was low, in microseconds.
        held_us: u64,
    },
}

/// One of the simulated GPIO lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// SCI select.
    Xcs,
    /// SDI select.
    Xdcs,
    /// Data request (chip output).
    Dreq,
    /// Hardware reset.
    Reset,
    /// Health indicator LED.
    Indicator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SciPhase {
    Idle,
    Opcode,
    Address { opcode: u8 },
    High { opcode: u8, register: Option<Register>, out: u16 },
    Low { opcode: u8, register: Option<Register>, out: u16, high: u8 },
}

/// Simulated VS1053.
pub struct ChipSim {
    registers: [u16; 16],
    frozen: u16,
    powered: bool,
    booted: bool,
    failing_boots: u32,
    dreq_stuck_low: bool,
    fifo_room: Option<usize>,
    spi_fault: bool,
    xcs_low: bool,
    xdcs_low: bool,
    reset_low: bool,
    reset_low_since: u64,
    indicator_on: bool,
    sci: SciPhase,
    spi_config: Option<SpiConfig>,
    elapsed_us: u64,
    reset_pulses: u32,
    vol_writes: u32,
    status_reads: u32,
    data_bytes: usize,
    data_frames: u32,
    select_overlap: bool,
    log: heapless::Vec<SimEvent, LOG_CAPACITY>,
}

impl ChipSim {
    /// A powered, booted chip with power-on register defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registers: Self::boot_registers(),
            frozen: 0,
            powered: true,
            booted: true,
            failing_boots: 0,
            dreq_stuck_low: false,
            fifo_room: None,
            spi_fault: false,
            xcs_low: false,
            xdcs_low: false,
            reset_low: false,
            reset_low_since: 0,
            indicator_on: false,
            sci: SciPhase::Idle,
            spi_config: None,
            elapsed_us: 0,
            reset_pulses: 0,
            vol_writes: 0,
            status_reads: 0,
            data_bytes: 0,
            data_frames: 0,
            select_overlap: false,
            log: heapless::Vec::new(),
        }
    }

    fn boot_registers() -> [u16; 16] {
        let mut registers = [0u16; 16];
        if let Some(mode) = registers.get_mut(usize::from(Register::Mode.addr())) {
            *mode = SM_SDINEW;
        }
        if let Some(status) = registers.get_mut(usize::from(Register::Status.addr())) {
            *status = STATUS_BOOT_DEFAULT;
        }
        registers
    }

    // -- fault injection ----------------------------------------------------

    /// Cut power: DREQ drops and every read returns zero.
    pub fn kill(&mut self) {
        self.powered = false;
        self.booted = false;
    }

    /// Restore power. The chip stays silent until the next reset pulse.
    pub fn revive(&mut self) {
        self.powered = true;
    }

    /// Make the next `boots` reset pulses fail to bring the chip up.
    pub fn fail_next_boots(&mut self, boots: u32) {
        self.failing_boots = boots;
    }

    /// Hold DREQ low regardless of chip state.
    pub fn set_dreq_stuck_low(&mut self, stuck: bool) {
        self.dreq_stuck_low = stuck;
    }

    /// Accept `bytes` more SDI bytes, then hold DREQ low until
    /// [`drain_fifo`](Self::drain_fifo).
    pub fn limit_fifo(&mut self, bytes: usize) {
        self.fifo_room = Some(bytes);
    }

    /// Decoder caught up; SDI data no longer fills the FIFO.
    pub fn drain_fifo(&mut self) {
        self.fifo_room = None;
    }

    /// Ignore writes to `register`.
    pub fn freeze(&mut self, register: Register) {
        self.frozen |= register_bit(register);
    }

    /// Fail every SPI call while set.
    pub fn set_spi_fault(&mut self, fault: bool) {
        self.spi_fault = fault;
    }

    /// Drive XDCS as if another bus user held the data channel.
    pub fn hold_data_select(&mut self, held: bool) {
        self.drive(Line::Xdcs, !held);
    }

    /// Preload a register.
    pub fn set_register(&mut self, register: Register, value: u16) {
        if let Some(slot) = self.registers.get_mut(usize::from(register.addr())) {
            *slot = value;
        }
    }

    // -- inspection ---------------------------------------------------------

    /// Current register contents.
    #[must_use]
    pub fn register(&self, register: Register) -> u16 {
        self.registers
            .get(usize::from(register.addr()))
            .copied()
            .unwrap_or(0)
    }

    /// Bus events since the last [`clear_log`](Self::clear_log).
    #[must_use]
    pub fn log(&self) -> &[SimEvent] {
        &self.log
    }

    /// Forget logged events.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Virtual time spent in delays.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us)
    }

    /// XRESET pulses seen.
    #[must_use]
    pub fn reset_pulses(&self) -> u32 {
        self.reset_pulses
    }

    /// Completed SCI_VOL write frames.
    #[must_use]
    pub fn vol_writes(&self) -> u32 {
        self.vol_writes
    }

    /// Completed SCI_STATUS read frames.
    #[must_use]
    pub fn status_reads(&self) -> u32 {
        self.status_reads
    }

    /// Bytes clocked while only XDCS was asserted.
    #[must_use]
    pub fn data_bytes(&self) -> usize {
        self.data_bytes
    }

    /// XDCS assertions.
    #[must_use]
    pub fn data_frames(&self) -> u32 {
        self.data_frames
    }

    /// Whether XCS and XDCS were ever asserted together.
    #[must_use]
    pub fn select_overlap(&self) -> bool {
        self.select_overlap
    }

    /// Whether XCS is asserted.
    #[must_use]
    pub fn command_selected(&self) -> bool {
        self.xcs_low
    }

    /// Whether the health indicator is lit.
    #[must_use]
    pub fn indicator_on(&self) -> bool {
        self.indicator_on
    }

    /// Last SPI clock rate configured.
    #[must_use]
    pub fn spi_frequency(&self) -> Option<u32> {
        self.spi_config.map(|c| c.frequency)
    }

    /// Level of DREQ.
    #[must_use]
    pub fn dreq(&self) -> bool {
        self.alive() && !self.dreq_stuck_low && !self.reset_low && self.fifo_room != Some(0)
    }

    fn alive(&self) -> bool {
        self.powered && self.booted
    }

    fn record(&mut self, event: SimEvent) {
        // A full log drops new events.
        let _ = self.log.push(event);
    }

    // -- lines --------------------------------------------------------------

    fn level(&self, line: Line) -> bool {
        match line {
            Line::Xcs => !self.xcs_low,
            Line::Xdcs => !self.xdcs_low,
            Line::Dreq => self.dreq(),
            Line::Reset => !self.reset_low,
            Line::Indicator => self.indicator_on,
        }
    }

    fn drive(&mut self, line: Line, high: bool) {
        match line {
            Line::Xcs => {
                if !high && !self.xcs_low {
                    self.sci = SciPhase::Opcode;
                }
                if high {
                    self.sci = SciPhase::Idle;
                }
                self.xcs_low = !high;
            }
            Line::Xdcs => {
                if !high && !self.xdcs_low {
                    self.data_frames = self.data_frames.saturating_add(1);
                }
                self.xdcs_low = !high;
            }
            Line::Reset => {
                if !high && !self.reset_low {
                    self.reset_low_since = self.elapsed_us;
                }
                if high && self.reset_low {
                    self.release_reset();
                }
                self.reset_low = !high;
            }
            Line::Indicator => self.indicator_on = high,
            Line::Dreq => {}
        }
        if self.xcs_low && self.xdcs_low {
            self.select_overlap = true;
        }
    }

    fn release_reset(&mut self) {
        let held_us = self.elapsed_us.saturating_sub(self.reset_low_since);
        self.reset_pulses = self.reset_pulses.saturating_add(1);
        self.record(SimEvent::ResetPulse { held_us });
        if !self.powered {
            return;
        }
        if self.failing_boots > 0 {
            self.failing_boots = self.failing_boots.saturating_sub(1);
            self.booted = false;
        } else {
            self.booted = true;
            self.registers = Self::boot_registers();
        }
    }

    // -- SPI ----------------------------------------------------------------

    fn clock_byte(&mut self, mosi: u8) -> u8 {
        if self.xcs_low && !self.xdcs_low {
            self.sci_byte(mosi)
        } else {
            if self.xdcs_low && !self.xcs_low {
                self.data_bytes = self.data_bytes.saturating_add(1);
                if let Some(room) = self.fifo_room.as_mut() {
                    *room = room.saturating_sub(1);
                }
            }
            0
        }
    }

    fn sci_byte(&mut self, mosi: u8) -> u8 {
        let alive = self.alive();
        let phase = self.sci;
        let (next, miso) = match phase {
            SciPhase::Idle => (SciPhase::Idle, 0),
            SciPhase::Opcode => (SciPhase::Address { opcode: mosi }, 0),
            SciPhase::Address { opcode } => {
                let register = Register::from_addr(mosi);
                let out = register.map_or(0, |r| self.register(r));
                (
                    SciPhase::High {
                        opcode,
                        register,
                        out,
                    },
                    0,
                )
            }
            SciPhase::High {
                opcode,
                register,
                out,
            } => {
                let [out_high, _] = out.to_be_bytes();
                (
                    SciPhase::Low {
                        opcode,
                        register,
                        out,
                        high: mosi,
                    },
                    out_high,
                )
            }
            SciPhase::Low {
                opcode,
                register,
                out,
                high,
            } => {
                if alive {
                    if let Some(register) = register {
                        self.complete_frame(opcode, register, u16::from_be_bytes([high, mosi]), out);
                    }
                }
                let [_, out_low] = out.to_be_bytes();
                (SciPhase::Idle, out_low)
            }
        };
        self.sci = next;
        if alive {
            miso
        } else {
            0
        }
    }

    fn complete_frame(&mut self, opcode: u8, register: Register, written: u16, read: u16) {
        match opcode {
            OPCODE_WRITE => {
                if self.frozen & register_bit(register) == 0 {
                    self.set_register(register, written);
                }
                if register == Register::Vol {
                    self.vol_writes = self.vol_writes.saturating_add(1);
                } else {
                    self.record(SimEvent::Write {
                        register,
                        value: written,
                    });
                }
            }
            OPCODE_READ => match register {
                Register::Vol => {}
                Register::Status => self.status_reads = self.status_reads.saturating_add(1),
                _ => self.record(SimEvent::Read {
                    register,
                    value: read,
                }),
            },
            _ => {}
        }
    }
}

impl Default for ChipSim {
    fn default() -> Self {
        Self::new()
    }
}

/// Injected SPI failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiFault;

/// SPI transport wired to a [`ChipSim`].
pub struct MockSpi<'a> {
    sim: &'a RefCell<ChipSim>,
}

impl<'a> MockSpi<'a> {
    /// Attach to `sim`.
    #[must_use]
    pub fn new(sim: &'a RefCell<ChipSim>) -> Self {
        Self { sim }
    }
}

impl SpiPeripheral for MockSpi<'_> {
    type Error = SpiFault;

    async fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let mut sim = self.sim.borrow_mut();
        if sim.spi_fault {
            return Err(SpiFault);
        }
        for (rx, tx) in read.iter_mut().zip(write) {
            *rx = sim.clock_byte(*tx);
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let mut sim = self.sim.borrow_mut();
        if sim.spi_fault {
            return Err(SpiFault);
        }
        for byte in data {
            sim.clock_byte(*byte);
        }
        Ok(())
    }

    fn configure(&mut self, config: SpiConfig) -> Result<(), Self::Error> {
        let mut sim = self.sim.borrow_mut();
        if sim.spi_fault {
            return Err(SpiFault);
        }
        sim.spi_config = Some(config);
        sim.record(SimEvent::Clock(config.frequency));
        Ok(())
    }
}

/// GPIO line wired to a [`ChipSim`].
pub struct MockPin<'a> {
    sim: &'a RefCell<ChipSim>,
    line: Line,
}

impl<'a> MockPin<'a> {
    /// Attach to `line` of `sim`.
    #[must_use]
    pub fn new(sim: &'a RefCell<ChipSim>, line: Line) -> Self {
        Self { sim, line }
    }
}

impl ErrorType for MockPin<'_> {
    type Error = Infallible;
}

impl OutputPin for MockPin<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.sim.borrow_mut().drive(self.line, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.sim.borrow_mut().drive(self.line, true);
        Ok(())
    }
}

impl StatefulOutputPin for MockPin<'_> {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.sim.borrow().level(self.line))
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.sim.borrow().level(self.line))
    }
}

impl InputPin for MockPin<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.sim.borrow().level(self.line))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.sim.borrow().level(self.line))
    }
}

/// Virtual delay: advances the simulator clock and yields once.
pub struct MockDelay<'a> {
    sim: &'a RefCell<ChipSim>,
}

impl<'a> MockDelay<'a> {
    /// Attach to `sim`.
    #[must_use]
    pub fn new(sim: &'a RefCell<ChipSim>) -> Self {
        Self { sim }
    }
}

impl DelayNs for MockDelay<'_> {
    async fn delay_ns(&mut self, ns: u32) {
        {
            let mut sim = self.sim.borrow_mut();
            sim.elapsed_us = sim.elapsed_us.saturating_add(u64::from(ns / 1_000));
        }
        embassy_futures::yield_now().await;
    }
}

/// Driver type produced by [`mock_driver`].
pub type MockVs1053<'a> = Vs1053<
    MockSpi<'a>,
    MockPin<'a>,
    MockPin<'a>,
    MockPin<'a>,
    MockPin<'a>,
    MockPin<'a>,
    MockDelay<'a>,
>;

/// Build a driver whose SPI bus, pins and delay all drive `sim`.
pub fn mock_driver(
    sim: &RefCell<ChipSim>,
    config: DriverConfig,
) -> Result<MockVs1053<'_>, ConfigError> {
    Vs1053::new(
        MockSpi::new(sim),
        ControlPins {
            xcs: MockPin::new(sim, Line::Xcs),
            xdcs: MockPin::new(sim, Line::Xdcs),
            dreq: MockPin::new(sim, Line::Dreq),
            reset: MockPin::new(sim, Line::Reset),
            indicator: MockPin::new(sim, Line::Indicator),
        },
        MockDelay::new(sim),
        config,
    )
}

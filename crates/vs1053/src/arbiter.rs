//! Bus arbiter: XCS / XDCS exclusivity and the DREQ handshake.
//!
//! The arbiter owns both select lines and the DREQ input, so it is the only
//! code that can assert a channel. A successful [`BusArbiter::acquire`]
//! returns a [`ChannelGuard`]; dropping the guard releases the line, so an
//! early `?` return can never leave a channel held.
//!
//! ```text
//!   acquire(ch)
//!     other line low? ──yes──► Contention (no pin touched)
//!        │ no
//!     require_ready? ──no──► assert ch ──► guard
//!        │ yes
//!     DREQ high within polls × interval? ──no──► NotReady
//!        │ yes
//!     assert ch ──► guard
//! ```

use embassy_time::Duration;
use embedded_hal::digital::{self, ErrorKind, InputPin, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;

use crate::config::pause;

/// One of the two serial interfaces sharing the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// SCI: register transactions, selected by XCS.
    Command,
    /// SDI: decode data, selected by XDCS.
    Data,
}

impl Channel {
    /// The channel that excludes this one.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Command => Self::Data,
            Self::Data => Self::Command,
        }
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Command => "command",
            Self::Data => "data",
        })
    }
}

/// Arbitration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum ArbiterError {
    /// The other channel's select line is asserted; carries the requested one.
    #[error("{0} channel blocked by the other select line")]
    Contention(Channel),
    /// DREQ did not go high within the ready window.
    #[error("DREQ not asserted within the ready window")]
    NotReady,
    /// A select line or DREQ could not be accessed.
    #[error("select or DREQ pin fault: {0:?}")]
    Pin(ErrorKind),
}

impl ArbiterError {
    fn pin(err: impl digital::Error) -> Self {
        Self::Pin(err.kind())
    }
}

/// Owner of the select lines and the ready input.
///
/// Select lines are active low: `set_low` asserts, `set_high` releases.
pub struct BusArbiter<XCS, XDCS, DREQ> {
    xcs: XCS,
    xdcs: XDCS,
    dreq: DREQ,
    ready_polls: u8,
    ready_interval: Duration,
}

impl<XCS, XDCS, DREQ> BusArbiter<XCS, XDCS, DREQ>
where
    XCS: StatefulOutputPin,
    XDCS: StatefulOutputPin,
    DREQ: InputPin,
{
    /// Create an arbiter. Pins are not touched; call
    /// [`release_all`](Self::release_all) to drive both lines inactive.
    ///
    /// A ready wait samples DREQ at most `ready_polls + 1` times with
    /// `ready_interval` between samples.
    pub fn new(xcs: XCS, xdcs: XDCS, dreq: DREQ, ready_polls: u8, ready_interval: Duration) -> Self {
        Self {
            xcs,
            xdcs,
            dreq,
            ready_polls,
            ready_interval,
        }
    }

    /// Whether `channel`'s select line is currently driven low.
    pub fn is_asserted(&mut self, channel: Channel) -> Result<bool, ArbiterError> {
        match channel {
            Channel::Command => self.xcs.is_set_low().map_err(ArbiterError::pin),
            Channel::Data => self.xdcs.is_set_low().map_err(ArbiterError::pin),
        }
    }

    /// Single DREQ sample.
    pub fn is_ready(&mut self) -> Result<bool, ArbiterError> {
        self.dreq.is_high().map_err(ArbiterError::pin)
    }

    /// Poll DREQ until high, giving up after the configured number of polls.
    pub async fn wait_ready<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), ArbiterError> {
        let mut polls: u8 = 0;
        loop {
            if self.is_ready()? {
                return Ok(());
            }
            if polls >= self.ready_polls {
                trace!("DREQ low after {} polls", polls);
                return Err(ArbiterError::NotReady);
            }
            polls = polls.saturating_add(1);
            pause(delay, self.ready_interval).await;
        }
    }

    /// Assert `channel`'s select line.
    ///
    /// Fails with [`ArbiterError::Contention`] before touching any pin if the
    /// other channel is asserted. With `require_ready`, waits for DREQ first.
    pub async fn acquire<D: DelayNs>(
        &mut self,
        channel: Channel,
        require_ready: bool,
        delay: &mut D,
    ) -> Result<ChannelGuard<'_, XCS, XDCS, DREQ>, ArbiterError> {
        if self.is_asserted(channel.other())? {
            return Err(ArbiterError::Contention(channel));
        }
        if require_ready {
            self.wait_ready(delay).await?;
        }
        match channel {
            Channel::Command => self.xcs.set_low().map_err(ArbiterError::pin)?,
            Channel::Data => self.xdcs.set_low().map_err(ArbiterError::pin)?,
        }
        Ok(ChannelGuard {
            arbiter: self,
            channel,
        })
    }

    /// Drive `channel`'s select line high, whatever its current state.
    pub fn release(&mut self, channel: Channel) -> Result<(), ArbiterError> {
        match channel {
            Channel::Command => self.xcs.set_high().map_err(ArbiterError::pin),
            Channel::Data => self.xdcs.set_high().map_err(ArbiterError::pin),
        }
    }

    /// Drive both select lines high.
    pub fn release_all(&mut self) -> Result<(), ArbiterError> {
        let command = self.release(Channel::Command);
        let data = self.release(Channel::Data);
        command.and(data)
    }

    /// Replace the ready window.
    pub fn set_ready_window(&mut self, polls: u8, interval: Duration) {
        self.ready_polls = polls;
        self.ready_interval = interval;
    }

    /// Release the pins.
    pub fn free(self) -> (XCS, XDCS, DREQ) {
        (self.xcs, self.xdcs, self.dreq)
    }
}

/// An asserted channel. Releases the select line on drop.
pub struct ChannelGuard<'a, XCS, XDCS, DREQ>
where
    XCS: StatefulOutputPin,
    XDCS: StatefulOutputPin,
    DREQ: InputPin,
{
    arbiter: &'a mut BusArbiter<XCS, XDCS, DREQ>,
    channel: Channel,
}

impl<XCS, XDCS, DREQ> ChannelGuard<'_, XCS, XDCS, DREQ>
where
    XCS: StatefulOutputPin,
    XDCS: StatefulOutputPin,
    DREQ: InputPin,
{
    /// The held channel.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Release the line, reporting a pin failure instead of swallowing it.
    pub fn release(self) -> Result<(), ArbiterError> {
        let mut this = core::mem::ManuallyDrop::new(self);
        let channel = this.channel;
        this.arbiter.release(channel)
    }
}

impl<XCS, XDCS, DREQ> Drop for ChannelGuard<'_, XCS, XDCS, DREQ>
where
    XCS: StatefulOutputPin,
    XDCS: StatefulOutputPin,
    DREQ: InputPin,
{
    fn drop(&mut self) {
        // Nothing to report to from drop; the next acquire surfaces a dead pin.
        let _ = self.arbiter.release(self.channel);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTx};

    /// Counts requested sleep time without sleeping.
    #[derive(Default)]
    struct CountingDelay {
        total_us: u64,
        calls: u32,
    }

    impl DelayNs for CountingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.total_us = self.total_us.saturating_add(u64::from(ns / 1_000));
            self.calls = self.calls.saturating_add(1);
        }
    }

    fn arbiter(
        xcs: &[PinTx],
        xdcs: &[PinTx],
        dreq: &[PinTx],
    ) -> (BusArbiter<PinMock, PinMock, PinMock>, [PinMock; 3]) {
        let xcs = PinMock::new(xcs);
        let xdcs = PinMock::new(xdcs);
        let dreq = PinMock::new(dreq);
        let handles = [xcs.clone(), xdcs.clone(), dreq.clone()];
        (
            BusArbiter::new(xcs, xdcs, dreq, 5, Duration::from_millis(1)),
            handles,
        )
    }

    fn done(handles: [PinMock; 3]) {
        for mut pin in handles {
            pin.done();
        }
    }

    #[test]
    fn other_channel_is_symmetric() {
        assert_eq!(Channel::Command.other(), Channel::Data);
        assert_eq!(Channel::Data.other(), Channel::Command);
    }

    #[tokio::test]
    async fn command_blocked_while_data_asserted_touches_nothing() {
        // Only the XDCS state is read: no DREQ sample, no XCS write.
        let (mut arb, handles) = arbiter(&[], &[PinTx::get_state(State::Low)], &[]);
        let mut delay = CountingDelay::default();

        let result = arb.acquire(Channel::Command, true, &mut delay).await;

        assert_eq!(result.err(), Some(ArbiterError::Contention(Channel::Command)));
        assert_eq!(delay.calls, 0);
        done(handles);
    }

    #[tokio::test]
    async fn data_blocked_while_command_asserted_touches_nothing() {
        let (mut arb, handles) = arbiter(&[PinTx::get_state(State::Low)], &[], &[]);
        let mut delay = CountingDelay::default();

        let result = arb.acquire(Channel::Data, false, &mut delay).await;

        assert_eq!(result.err(), Some(ArbiterError::Contention(Channel::Data)));
        done(handles);
    }

    #[tokio::test]
    async fn guard_asserts_then_releases_on_drop() {
        let (mut arb, handles) = arbiter(
            &[PinTx::set(State::Low), PinTx::set(State::High)],
            &[PinTx::get_state(State::High)],
            &[PinTx::get(State::High)],
        );
        let mut delay = CountingDelay::default();

        {
            let guard = arb.acquire(Channel::Command, true, &mut delay).await.unwrap();
            assert_eq!(guard.channel(), Channel::Command);
        }

        assert_eq!(delay.calls, 0);
        done(handles);
    }

    #[tokio::test]
    async fn explicit_release_does_not_release_twice() {
        let (mut arb, handles) = arbiter(
            &[PinTx::get_state(State::High)],
            &[PinTx::set(State::Low), PinTx::set(State::High)],
            &[],
        );
        let mut delay = CountingDelay::default();

        let guard = arb.acquire(Channel::Data, false, &mut delay).await.unwrap();
        guard.release().unwrap();

        done(handles);
    }

    #[tokio::test]
    async fn ready_wait_succeeds_after_low_samples() {
        let (mut arb, handles) = arbiter(
            &[PinTx::set(State::Low), PinTx::set(State::High)],
            &[PinTx::get_state(State::High)],
            &[
                PinTx::get(State::Low),
                PinTx::get(State::Low),
                PinTx::get(State::High),
            ],
        );
        let mut delay = CountingDelay::default();

        let guard = arb.acquire(Channel::Command, true, &mut delay).await.unwrap();
        drop(guard);

        assert_eq!(delay.calls, 2);
        done(handles);
    }

    #[tokio::test]
    async fn ready_wait_is_bounded_when_dreq_stuck_low() {
        // 5 polls: 6 samples, 5 sleeps, never more than 5 ms.
        let samples = [
            PinTx::get(State::Low),
            PinTx::get(State::Low),
            PinTx::get(State::Low),
            PinTx::get(State::Low),
            PinTx::get(State::Low),
            PinTx::get(State::Low),
        ];
        let (mut arb, handles) = arbiter(&[], &[PinTx::get_state(State::High)], &samples);
        let mut delay = CountingDelay::default();

        let result = arb.acquire(Channel::Command, true, &mut delay).await;

        assert_eq!(result.err(), Some(ArbiterError::NotReady));
        assert_eq!(delay.calls, 5);
        assert!(delay.total_us <= 5_000);
        done(handles);
    }

    #[tokio::test]
    async fn zero_polls_samples_once() {
        let (mut arb, handles) = arbiter(
            &[],
            &[PinTx::get_state(State::High)],
            &[PinTx::get(State::Low)],
        );
        arb.set_ready_window(0, Duration::from_millis(1));
        let mut delay = CountingDelay::default();

        let result = arb.acquire(Channel::Command, true, &mut delay).await;

        assert_eq!(result.err(), Some(ArbiterError::NotReady));
        assert_eq!(delay.calls, 0);
        done(handles);
    }

    #[test]
    fn release_all_drives_both_high() {
        let (mut arb, handles) = arbiter(&[PinTx::set(State::High)], &[PinTx::set(State::High)], &[]);
        arb.release_all().unwrap();
        done(handles);
    }
}

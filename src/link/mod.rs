//! Reliable single-hop link over a half-duplex radio
//!
//! [`Link`] owns its transceiver, so exactly one link is ever bound to a
//! radio. `send` and `recv` block the caller: they program the radio, then
//! drain its events in a loop until the operation settles or a deadline
//! passes. Whatever happens, both leave the radio in continuous listen.

pub mod clock;
pub mod session;

pub use clock::Clock;
pub use session::{AckState, RxState, Session, SignalQuality, TxState};

use crate::config::lora_defaults::FREQUENCY_HZ;
use crate::config::protocol::MAX_PAYLOAD;
use crate::config::timing::{
    ACK_TIMEOUT_MS, DEADLINE_MARGIN_MS, POLL_INTERVAL_MS, SEND_GUARD_TIMEOUT_MS,
};
use crate::protocol::{encode_ack, encode_data};
use crate::radio::settings::LinkSettings;
use crate::radio::traits::{RadioError, Transceiver};
use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

/// Errors reported by link operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// `init` has not been called
    NotInitialised,
    /// Empty buffer, empty payload or payload over 253 bytes
    InvalidArgument,
    /// Transmission did not complete within the guard deadline
    TransmitTimeout,
    /// Radio reported a failed transmission
    TransmitFailed,
    /// No matching acknowledgment before the deadline
    AckTimeout,
    /// No frame arrived within the receive timeout
    ReceiveTimeout,
    /// Receive error, malformed frame or unknown frame kind
    ReceiveFailed,
    /// Radio failed while being brought up or reconfigured by `init`
    Radio(RadioError),
}

impl From<RadioError> for LinkError {
    fn from(error: RadioError) -> Self {
        LinkError::Radio(error)
    }
}

/// Result of a successful `recv`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Bytes copied into the caller's buffer
    pub copied: usize,
    /// Payload size as received
    pub received: usize,
}

impl Delivery {
    /// The payload did not fit in the caller's buffer
    pub fn is_truncated(&self) -> bool {
        self.received > self.copied
    }
}

/// Stop-and-wait link over one transceiver
pub struct Link<R, C, D> {
    radio: R,
    clock: C,
    delay: D,
    session: Session,
    settings: Option<LinkSettings>,
}

impl<R, C, D> Link<R, C, D>
where
    R: Transceiver,
    C: Clock,
    D: DelayNs,
{
    /// Bind a link to a transceiver. The radio is untouched until `init`.
    pub fn new(radio: R, clock: C, delay: D) -> Self {
        Self {
            radio,
            clock,
            delay,
            session: Session::new(),
            settings: None,
        }
    }

    /// Configure the radio and start listening.
    ///
    /// The first call brings the radio up and tunes the channel. Later calls
    /// only touch the hardware when a level changed.
    pub fn init(&mut self, settings: LinkSettings) -> Result<(), LinkError> {
        match self.settings {
            Some(current) if current == settings => {
                debug!("link settings unchanged");
                return Ok(());
            }
            Some(_) => {
                self.apply_modulation(&settings)?;
                info!(
                    "link reconfigured: {} dBm, SF{}",
                    settings.tx_power_dbm(),
                    settings.spreading_factor()
                );
            }
            None => {
                self.radio.init()?;
                self.radio.set_channel(FREQUENCY_HZ)?;
                self.apply_modulation(&settings)?;
                info!(
                    "link up on {} Hz: {} dBm, SF{}",
                    FREQUENCY_HZ,
                    settings.tx_power_dbm(),
                    settings.spreading_factor()
                );
            }
        }

        self.settings = Some(settings);
        Ok(())
    }

    fn apply_modulation(&mut self, settings: &LinkSettings) -> Result<(), RadioError> {
        self.radio.configure_tx(&settings.tx_config())?;
        self.radio.configure_rx(&settings.rx_config())?;
        self.radio.receive(0)
    }

    /// Send one payload and wait for the peer to acknowledge it.
    ///
    /// A sequence number is consumed even when the send fails.
    pub fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if self.settings.is_none() {
            return Err(LinkError::NotInitialised);
        }
        if data.is_empty() || data.len() > MAX_PAYLOAD {
            return Err(LinkError::InvalidArgument);
        }

        let sequence = self.session.allocate_sequence();
        let frame = encode_data(sequence, data).map_err(|_| LinkError::InvalidArgument)?;

        self.session.ack = AckState::Awaiting(sequence);
        if let Err(e) = self.transmit_blocking(&frame) {
            warn!("send {}: transmit failed: {:?}", sequence, e);
            self.session.ack = AckState::Idle;
            self.resume_listening();
            return Err(e);
        }

        if let Err(e) = self.radio.receive(ACK_TIMEOUT_MS) {
            warn!("send {}: cannot open ack window: {:?}", sequence, e);
        }
        self.wait_until(Some(ACK_TIMEOUT_MS as u64 + DEADLINE_MARGIN_MS), |s| {
            !s.is_awaiting_ack()
        });

        let result = match self.session.ack {
            AckState::Received => {
                debug!("send {}: acknowledged", sequence);
                Ok(())
            }
            _ => {
                warn!("send {}: no acknowledgment", sequence);
                Err(LinkError::AckTimeout)
            }
        };

        self.session.ack = AckState::Idle;
        self.resume_listening();
        result
    }

    /// Wait for one Data frame and acknowledge it.
    ///
    /// A `timeout_ms` of 0 waits indefinitely. Payloads larger than `buffer`
    /// are truncated; [`Delivery::is_truncated`] reports it.
    pub fn recv(&mut self, buffer: &mut [u8], timeout_ms: u32) -> Result<Delivery, LinkError> {
        if self.settings.is_none() {
            return Err(LinkError::NotInitialised);
        }
        if buffer.is_empty() {
            return Err(LinkError::InvalidArgument);
        }

        self.session.begin_receive();
        if let Err(e) = self.radio.receive(timeout_ms) {
            warn!("recv: cannot open receive window: {:?}", e);
            self.session.rx = RxState::Idle;
            self.resume_listening();
            return Err(LinkError::ReceiveFailed);
        }

        let limit = (timeout_ms > 0).then(|| timeout_ms as u64 + DEADLINE_MARGIN_MS);
        self.wait_until(limit, |s| s.rx != RxState::Listening);

        let outcome = self.session.rx;
        self.session.rx = RxState::Idle;
        if outcome != RxState::Done {
            self.resume_listening();
            return Err(match outcome {
                RxState::Failed => LinkError::ReceiveFailed,
                _ => LinkError::ReceiveTimeout,
            });
        }

        if let Some(sequence) = self.session.pending_ack.take() {
            match self.transmit_blocking(&encode_ack(sequence)) {
                Ok(()) => debug!("recv: ack {} sent", sequence),
                Err(e) => warn!("recv: ack {} not sent: {:?}", sequence, e),
            }
        }

        let received = self.session.received();
        let copied = received.len().min(buffer.len());
        buffer[..copied].copy_from_slice(&received[..copied]);
        let delivery = Delivery {
            copied,
            received: received.len(),
        };
        if delivery.is_truncated() {
            warn!(
                "recv: {}-byte payload truncated to {}",
                delivery.received, delivery.copied
            );
        }

        self.resume_listening();
        Ok(delivery)
    }

    pub fn is_initialised(&self) -> bool {
        self.settings.is_some()
    }

    /// Settings last applied by `init`
    pub fn settings(&self) -> Option<LinkSettings> {
        self.settings
    }

    /// Sequence number the next `send` will carry
    pub fn next_sequence(&self) -> u8 {
        self.session.next_sequence()
    }

    /// Signal quality of the last accepted Data frame
    pub fn last_signal(&self) -> Option<SignalQuality> {
        self.session.last_signal()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Unbind the link and hand the transceiver back
    pub fn release(self) -> R {
        self.radio
    }

    /// Transmit one frame and block until the radio reports the outcome
    fn transmit_blocking(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.session.tx = TxState::Pending;
        if let Err(e) = self.radio.transmit(frame) {
            warn!("radio rejected frame: {:?}", e);
            self.session.tx = TxState::Idle;
            return Err(LinkError::TransmitFailed);
        }

        self.wait_until(Some(SEND_GUARD_TIMEOUT_MS), |s| s.tx != TxState::Pending);

        let outcome = self.session.tx;
        self.session.tx = TxState::Idle;
        match outcome {
            TxState::Done => Ok(()),
            TxState::Failed => Err(LinkError::TransmitFailed),
            _ => Err(LinkError::TransmitTimeout),
        }
    }

    /// Drain radio events until `done` holds or `limit_ms` has elapsed.
    /// `None` waits forever.
    fn wait_until<F>(&mut self, limit_ms: Option<u64>, done: F)
    where
        F: Fn(&Session) -> bool,
    {
        let start = self.clock.now_ms();
        loop {
            self.radio.process_pending_events(&mut self.session);
            if done(&self.session) {
                return;
            }
            if let Some(limit) = limit_ms {
                if self.clock.now_ms().saturating_sub(start) > limit {
                    return;
                }
            }
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }
    }

    fn resume_listening(&mut self) {
        if let Err(e) = self.radio.receive(0) {
            warn!("radio listen failed: {:?}", e);
        }
    }
}

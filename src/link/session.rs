//! Link session state and radio event dispatch
//!
//! Every outcome the blocking loops wait for is a small state enum moved
//! forward only by the [`EventSink`] handlers below. If events are ever
//! delivered from a real interrupt context, this struct has to move behind a
//! critical-section mutex with the handlers as its only writers.

use crate::config::protocol::{HEADER_SIZE, MAX_FRAME_SIZE};
use crate::protocol::{decode, FrameError, FrameKind};
use crate::radio::traits::{EventSink, Transceiver};
use heapless::Vec;
use log::{debug, warn};

/// Progress of the frame currently being transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Pending,
    Done,
    Failed,
}

/// Progress of the current receive window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Idle,
    Listening,
    Done,
    Failed,
    TimedOut,
}

/// Progress of the acknowledgment wait for an outbound Data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Idle,
    /// Waiting for an Ack carrying this sequence
    Awaiting(u8),
    Received,
    TimedOut,
}

/// Signal quality of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    /// Received Signal Strength Indicator in dBm
    pub rssi: i16,
    /// Signal-to-Noise Ratio in dB
    pub snr: i8,
}

/// Outbound and inbound session state of one link
#[derive(Debug)]
pub struct Session {
    pub tx: TxState,
    pub rx: RxState,
    pub ack: AckState,
    next_sequence: u8,
    /// Sequence of a received Data frame still owed an Ack
    pub pending_ack: Option<u8>,
    /// Payload of the most recently accepted Data frame
    rx_slot: Vec<u8, MAX_FRAME_SIZE>,
    last_signal: Option<SignalQuality>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            tx: TxState::Idle,
            rx: RxState::Idle,
            ack: AckState::Idle,
            next_sequence: 0,
            pending_ack: None,
            rx_slot: Vec::new(),
            last_signal: None,
        }
    }

    /// Sequence the next `send` will use
    pub fn next_sequence(&self) -> u8 {
        self.next_sequence
    }

    /// Hand out the next sequence number. Never reused, even on failure.
    pub fn allocate_sequence(&mut self) -> u8 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    pub fn is_awaiting_ack(&self) -> bool {
        matches!(self.ack, AckState::Awaiting(_))
    }

    /// Reset the receive outcome before opening a new receive window
    pub fn begin_receive(&mut self) {
        self.rx = RxState::Listening;
        self.rx_slot.clear();
        self.pending_ack = None;
    }

    pub fn received(&self) -> &[u8] {
        &self.rx_slot
    }

    pub fn last_signal(&self) -> Option<SignalQuality> {
        self.last_signal
    }

    /// Settle the receive window on a failure. An accepted Data frame
    /// outranks anything raised after it in the same drain.
    fn fail_receive(&mut self, outcome: RxState) {
        if self.rx != RxState::Done {
            self.rx = outcome;
        }
    }

    /// Store an accepted Data payload, dropping anything past the slot size
    fn store_payload(&mut self, payload: &[u8]) {
        let len = payload.len().min(MAX_FRAME_SIZE);
        self.rx_slot.clear();
        // Cannot fail: len is capped at the slot capacity
        let _ = self.rx_slot.extend_from_slice(&payload[..len]);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn sleep<R: Transceiver>(radio: &mut R) {
    if let Err(e) = radio.sleep() {
        warn!("radio sleep failed: {:?}", e);
    }
}

fn listen<R: Transceiver>(radio: &mut R) {
    if let Err(e) = radio.receive(0) {
        warn!("radio listen failed: {:?}", e);
    }
}

impl<R: Transceiver> EventSink<R> for Session {
    fn on_tx_done(&mut self, radio: &mut R) {
        self.tx = TxState::Done;
        sleep(radio);
    }

    fn on_tx_timeout(&mut self, radio: &mut R) {
        self.tx = TxState::Failed;
        sleep(radio);
    }

    fn on_rx_done(&mut self, radio: &mut R, payload: &[u8], rssi: i16, snr: i8) {
        sleep(radio);

        if payload.len() < HEADER_SIZE {
            debug!("dropping {}-byte frame", payload.len());
            self.fail_receive(RxState::Failed);
            return;
        }

        let frame = match decode(payload) {
            Ok(frame) => frame,
            Err(FrameError::UnknownFrameKind(kind)) => {
                debug!("dropping frame of unknown kind 0x{:02x}", kind);
                self.fail_receive(RxState::Failed);
                return;
            }
            Err(e) => {
                debug!("dropping frame: {:?}", e);
                self.fail_receive(RxState::Failed);
                return;
            }
        };

        match frame.kind {
            FrameKind::Ack => {
                if self.ack == AckState::Awaiting(frame.sequence) {
                    debug!("ack {} received", frame.sequence);
                    self.ack = AckState::Received;
                } else {
                    debug!("ignoring unexpected ack {}", frame.sequence);
                }
                listen(radio);
            }
            FrameKind::Data => {
                self.store_payload(frame.payload);
                self.last_signal = Some(SignalQuality { rssi, snr });
                self.rx = RxState::Done;
                self.pending_ack = Some(frame.sequence);
            }
        }
    }

    fn on_rx_timeout(&mut self, radio: &mut R) {
        if self.is_awaiting_ack() {
            self.ack = AckState::TimedOut;
        } else {
            self.fail_receive(RxState::TimedOut);
        }
        sleep(radio);
    }

    fn on_rx_error(&mut self, radio: &mut R) {
        if self.is_awaiting_ack() {
            self.ack = AckState::TimedOut;
        } else {
            self.fail_receive(RxState::Failed);
        }
        sleep(radio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::clock::mock::SimClock;
    use crate::radio::traits::mock::{MockRadio, RadioCall, RadioMode};

    fn radio() -> MockRadio {
        MockRadio::new(SimClock::new())
    }

    #[test]
    fn test_sequence_wraps() {
        let mut session = Session::new();
        for expected in 0..=255u8 {
            assert_eq!(session.allocate_sequence(), expected);
        }
        assert_eq!(session.allocate_sequence(), 0);
    }

    #[test]
    fn test_tx_events_sleep_radio() {
        let mut session = Session::new();
        let mut radio = radio();

        session.tx = TxState::Pending;
        session.on_tx_done(&mut radio);
        assert_eq!(session.tx, TxState::Done);
        assert_eq!(radio.mode(), RadioMode::Sleep);

        session.tx = TxState::Pending;
        session.on_tx_timeout(&mut radio);
        assert_eq!(session.tx, TxState::Failed);
    }

    #[test]
    fn test_short_frame_fails_receive() {
        let mut session = Session::new();
        let mut radio = radio();
        session.begin_receive();

        session.on_rx_done(&mut radio, &[0x01], -50, 5);
        assert_eq!(session.rx, RxState::Failed);
        assert_eq!(session.pending_ack, None);
        assert_eq!(radio.calls(), &[RadioCall::Sleep]);
    }

    #[test]
    fn test_unknown_kind_fails_receive() {
        let mut session = Session::new();
        let mut radio = radio();
        session.begin_receive();

        session.on_rx_done(&mut radio, &[0x09, 0x00, 0x41], -50, 5);
        assert_eq!(session.rx, RxState::Failed);
        assert!(session.received().is_empty());
    }

    #[test]
    fn test_data_frame_is_stored_and_owes_ack() {
        let mut session = Session::new();
        let mut radio = radio();
        session.begin_receive();

        session.on_rx_done(&mut radio, &[0x01, 0x2A, 0x41, 0x42], -71, -3);
        assert_eq!(session.rx, RxState::Done);
        assert_eq!(session.received(), &[0x41, 0x42]);
        assert_eq!(session.pending_ack, Some(0x2A));
        assert_eq!(session.last_signal(), Some(SignalQuality { rssi: -71, snr: -3 }));
        assert_eq!(radio.mode(), RadioMode::Sleep);
    }

    #[test]
    fn test_matching_ack_ends_wait_and_resumes_listening() {
        let mut session = Session::new();
        let mut radio = radio();
        session.ack = AckState::Awaiting(4);

        session.on_rx_done(&mut radio, &[0x02, 4], -50, 5);
        assert_eq!(session.ack, AckState::Received);
        assert!(radio.is_listening_continuously());
    }

    #[test]
    fn test_mismatched_ack_is_dropped() {
        let mut session = Session::new();
        let mut radio = radio();
        session.ack = AckState::Awaiting(4);
        session.begin_receive();

        session.on_rx_done(&mut radio, &[0x02, 5], -50, 5);
        assert_eq!(session.ack, AckState::Awaiting(4));
        assert_eq!(session.rx, RxState::Listening);
        assert!(radio.is_listening_continuously());
    }

    #[test]
    fn test_rx_timeout_targets_ack_wait_first() {
        let mut session = Session::new();
        let mut radio = radio();

        session.ack = AckState::Awaiting(1);
        session.begin_receive();
        session.on_rx_timeout(&mut radio);
        assert_eq!(session.ack, AckState::TimedOut);
        assert_eq!(session.rx, RxState::Listening);

        session.ack = AckState::Idle;
        session.on_rx_timeout(&mut radio);
        assert_eq!(session.rx, RxState::TimedOut);
    }

    #[test]
    fn test_rx_error_targets_ack_wait_first() {
        let mut session = Session::new();
        let mut radio = radio();

        session.ack = AckState::Awaiting(1);
        session.begin_receive();
        session.on_rx_error(&mut radio);
        assert_eq!(session.ack, AckState::TimedOut);
        assert_eq!(session.rx, RxState::Listening);

        session.on_rx_error(&mut radio);
        assert_eq!(session.rx, RxState::Failed);
    }

    #[test]
    fn test_later_events_do_not_undo_accepted_frame() {
        let mut session = Session::new();
        let mut radio = radio();
        session.begin_receive();

        session.on_rx_done(&mut radio, &[0x01, 0x07, 0x41, 0x42], -50, 5);
        session.on_rx_error(&mut radio);
        session.on_rx_timeout(&mut radio);
        session.on_rx_done(&mut radio, &[0x01], -50, 5);
        session.on_rx_done(&mut radio, &[0x09, 0x00], -50, 5);

        assert_eq!(session.rx, RxState::Done);
        assert_eq!(session.received(), &[0x41, 0x42]);
        assert_eq!(session.pending_ack, Some(0x07));
    }
}

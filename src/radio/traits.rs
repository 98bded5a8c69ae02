//! Transceiver adapter contract
//!
//! The link layer never talks to radio hardware directly. It programs a
//! [`Transceiver`] and then drains its pending events into an [`EventSink`].
//! Events are only ever delivered from inside
//! [`Transceiver::process_pending_events`], on the caller's stack, so the
//! sink needs no locking.

use crate::config::protocol::MAX_FRAME_SIZE;
use heapless::Vec;

/// Errors reported by a transceiver adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Radio not initialised
    NotInitialised,
    /// SPI communication error
    SpiError,
    /// Radio busy timeout
    BusyTimeout,
    /// Invalid configuration
    InvalidConfig,
    /// Frame larger than the radio buffer
    PayloadTooLarge,
}

/// Transmit-side modulation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxConfig {
    /// Transmit power in dBm
    pub power_dbm: i8,
    /// Bandwidth in kHz
    pub bandwidth_khz: u32,
    /// Spreading factor (7-12)
    pub spreading_factor: u8,
    /// Coding rate denominator (5-8 for 4/5 to 4/8)
    pub coding_rate: u8,
    pub preamble_symbols: u16,
    pub fixed_length: bool,
    pub crc_on: bool,
    pub iq_inverted: bool,
    /// Timeout the radio applies to one transmission
    pub timeout_ms: u32,
}

/// Receive-side modulation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxConfig {
    /// Bandwidth in kHz
    pub bandwidth_khz: u32,
    /// Spreading factor (7-12)
    pub spreading_factor: u8,
    /// Coding rate denominator (5-8 for 4/5 to 4/8)
    pub coding_rate: u8,
    pub preamble_symbols: u16,
    pub symbol_timeout: u16,
    pub fixed_length: bool,
    pub crc_on: bool,
    pub iq_inverted: bool,
    /// Stay in receive after a packet instead of returning to standby
    pub continuous: bool,
}

/// Received packet with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxPacket {
    /// Raw frame bytes as received
    pub data: Vec<u8, MAX_FRAME_SIZE>,
    /// Received Signal Strength Indicator in dBm
    pub rssi: i16,
    /// Signal-to-Noise Ratio in dB
    pub snr: i8,
}

/// One hardware notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    TxDone,
    TxTimeout,
    RxDone(RxPacket),
    RxTimeout,
    RxError,
}

/// Receiver of radio events, one method per event kind.
///
/// Each handler gets the transceiver back so it can put the radio to sleep
/// or resume listening before returning.
pub trait EventSink<R: ?Sized> {
    fn on_tx_done(&mut self, radio: &mut R);
    fn on_tx_timeout(&mut self, radio: &mut R);
    fn on_rx_done(&mut self, radio: &mut R, payload: &[u8], rssi: i16, snr: i8);
    fn on_rx_timeout(&mut self, radio: &mut R);
    fn on_rx_error(&mut self, radio: &mut R);
}

/// Abstract half-duplex radio.
///
/// `transmit` and `receive` only start an operation; completion is reported
/// later as a [`RadioEvent`].
pub trait Transceiver {
    /// Bring the hardware up
    fn init(&mut self) -> Result<(), RadioError>;

    /// Tune the carrier frequency
    fn set_channel(&mut self, frequency_hz: u32) -> Result<(), RadioError>;

    fn configure_tx(&mut self, config: &TxConfig) -> Result<(), RadioError>;

    fn configure_rx(&mut self, config: &RxConfig) -> Result<(), RadioError>;

    /// Start transmitting one frame
    fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError>;

    /// Enter receive mode. A timeout of 0 listens indefinitely.
    fn receive(&mut self, timeout_ms: u32) -> Result<(), RadioError>;

    /// Enter the low-power state
    fn sleep(&mut self) -> Result<(), RadioError>;

    /// Take the next pending hardware event, if any
    fn next_event(&mut self) -> Option<RadioEvent>;

    /// Deliver every pending event to `sink`
    fn process_pending_events<S: EventSink<Self>>(&mut self, sink: &mut S)
    where
        Self: Sized,
    {
        while let Some(event) = self.next_event() {
            match event {
                RadioEvent::TxDone => sink.on_tx_done(self),
                RadioEvent::TxTimeout => sink.on_tx_timeout(self),
                RadioEvent::RxDone(packet) => {
                    sink.on_rx_done(self, &packet.data, packet.rssi, packet.snr)
                }
                RadioEvent::RxTimeout => sink.on_rx_timeout(self),
                RadioEvent::RxError => sink.on_rx_error(self),
            }
        }
    }
}

//! Reliable single-hop packet delivery over a half-duplex LoRa link.
//!
//! [`Link`] adds stop-and-wait acknowledgments on top of a radio that only
//! knows how to transmit and receive raw frames. The radio itself sits behind
//! the [`Transceiver`] trait.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod link;
pub mod protocol;
pub mod radio;
pub mod status;

pub use link::{Clock, Delivery, Link, LinkError, SignalQuality};
pub use radio::{EventSink, LinkSettings, RadioError, RadioEvent, Transceiver};
pub use status::StatusBoard;

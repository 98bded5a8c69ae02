pub mod frame;

pub use frame::{decode, encode_ack, encode_data, Frame, FrameError, FrameKind};

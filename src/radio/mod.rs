pub mod settings;
#[cfg(feature = "sx1262")]
pub mod sx1262;
pub mod traits;

pub use settings::LinkSettings;
#[cfg(feature = "sx1262")]
pub use sx1262::{Sx1262Pins, Sx1262Radio};
pub use traits::{EventSink, RadioError, RadioEvent, RxConfig, RxPacket, Transceiver, TxConfig};

//! Link and radio configuration constants

/// Fixed LoRa modulation parameters
pub mod lora_defaults {
    /// ISM band carrier (915 MHz)
    pub const FREQUENCY_HZ: u32 = 915_000_000;
    pub const BANDWIDTH_KHZ: u32 = 125;
    /// Coding rate 4/5
    pub const CODING_RATE: u8 = 5;
    pub const PREAMBLE_SYMBOLS: u16 = 8;
    /// No symbol timeout in receive
    pub const SYMBOL_TIMEOUT: u16 = 0;
    pub const FIXED_LENGTH_PAYLOAD: bool = false;
    pub const CRC_ON: bool = true;
    pub const IQ_INVERTED: bool = false;
    /// Timeout the radio itself applies to a single transmission
    pub const RADIO_TX_TIMEOUT_MS: u32 = 3000;
}

/// TCXO configuration for SX1262 modules
pub mod tcxo {
    /// SX1262 register code for a 1.8 V TCXO
    pub const VOLTAGE_CODE: u8 = 0x02;
}

/// Abstract power / spreading factor levels
pub mod levels {
    pub const DEFAULT_POWER_LEVEL: u8 = 2;
    pub const DEFAULT_SF_LEVEL: u8 = 1;

    /// Power level 1, 2, 3 in dBm
    pub const POWER_DBM: [i8; 3] = [10, 15, 20];
    /// Fallback for an out-of-range power level
    pub const FALLBACK_POWER_DBM: i8 = 15;

    /// Spreading factor for level 1, 2, 3
    pub const SPREADING_FACTOR: [u8; 3] = [7, 10, 12];
    /// Fallback for an out-of-range spreading factor level
    pub const FALLBACK_SPREADING_FACTOR: u8 = 7;
}

/// Deadlines for the blocking send / receive loops
pub mod timing {
    /// Maximum time for one transmission to complete
    pub const SEND_GUARD_TIMEOUT_MS: u64 = 6000;
    /// Receive window opened for an acknowledgment
    pub const ACK_TIMEOUT_MS: u32 = 3000;
    /// Scheduling jitter allowance added to receive-side deadlines
    pub const DEADLINE_MARGIN_MS: u64 = 50;
    /// Delay between event drains
    pub const POLL_INTERVAL_MS: u32 = 1;
}

/// Wire protocol constants
pub mod protocol {
    /// Physical frame ceiling
    pub const MAX_FRAME_SIZE: usize = 255;

    /// Header: kind tag + sequence
    pub const HEADER_SIZE: usize = 2;

    /// Maximum user payload per frame
    pub const MAX_PAYLOAD: usize = MAX_FRAME_SIZE - HEADER_SIZE;

    pub const FRAME_KIND_DATA: u8 = 0x01;
    pub const FRAME_KIND_ACK: u8 = 0x02;
}

/// Status board sizing
pub mod status {
    /// Number of lines kept in the circular log
    pub const LOG_LINES: usize = 16;
    /// Maximum length of one log line
    pub const LOG_LINE_LEN: usize = 96;
    /// Maximum length of the last payload shown as text
    pub const LAST_PAYLOAD_LEN: usize = 256;
    /// Maximum length of the device address string
    pub const ADDRESS_LEN: usize = 32;
    /// Status page reload interval
    pub const REFRESH_SECONDS: u32 = 2;
}

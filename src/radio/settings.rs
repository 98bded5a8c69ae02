//! Link configuration: abstract levels to concrete radio parameters

use crate::config::{levels, lora_defaults};
use crate::radio::traits::{RxConfig, TxConfig};

/// Map a power level (1-3) to transmit power in dBm
pub fn power_level_dbm(level: u8) -> i8 {
    match level {
        1..=3 => levels::POWER_DBM[(level - 1) as usize],
        _ => levels::FALLBACK_POWER_DBM,
    }
}

/// Map a spreading factor level (1-3) to a LoRa spreading factor
pub fn spreading_factor_for_level(level: u8) -> u8 {
    match level {
        1..=3 => levels::SPREADING_FACTOR[(level - 1) as usize],
        _ => levels::FALLBACK_SPREADING_FACTOR,
    }
}

/// Power and spreading factor levels selected by the application.
///
/// Levels outside 1-3 are accepted and fall back to 15 dBm / SF7. Two
/// settings are equal only when the raw levels match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub power_level: u8,
    pub sf_level: u8,
}

impl LinkSettings {
    pub fn new(power_level: u8, sf_level: u8) -> Self {
        Self {
            power_level,
            sf_level,
        }
    }

    pub fn tx_power_dbm(&self) -> i8 {
        power_level_dbm(self.power_level)
    }

    pub fn spreading_factor(&self) -> u8 {
        spreading_factor_for_level(self.sf_level)
    }

    /// Transmit parameters for these levels
    pub fn tx_config(&self) -> TxConfig {
        TxConfig {
            power_dbm: self.tx_power_dbm(),
            bandwidth_khz: lora_defaults::BANDWIDTH_KHZ,
            spreading_factor: self.spreading_factor(),
            coding_rate: lora_defaults::CODING_RATE,
            preamble_symbols: lora_defaults::PREAMBLE_SYMBOLS,
            fixed_length: lora_defaults::FIXED_LENGTH_PAYLOAD,
            crc_on: lora_defaults::CRC_ON,
            iq_inverted: lora_defaults::IQ_INVERTED,
            timeout_ms: lora_defaults::RADIO_TX_TIMEOUT_MS,
        }
    }

    /// Receive parameters for these levels
    pub fn rx_config(&self) -> RxConfig {
        RxConfig {
            bandwidth_khz: lora_defaults::BANDWIDTH_KHZ,
            spreading_factor: self.spreading_factor(),
            coding_rate: lora_defaults::CODING_RATE,
            preamble_symbols: lora_defaults::PREAMBLE_SYMBOLS,
            symbol_timeout: lora_defaults::SYMBOL_TIMEOUT,
            fixed_length: lora_defaults::FIXED_LENGTH_PAYLOAD,
            crc_on: lora_defaults::CRC_ON,
            iq_inverted: lora_defaults::IQ_INVERTED,
            continuous: true,
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::new(levels::DEFAULT_POWER_LEVEL, levels::DEFAULT_SF_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_levels() {
        assert_eq!(power_level_dbm(1), 10);
        assert_eq!(power_level_dbm(2), 15);
        assert_eq!(power_level_dbm(3), 20);
        assert_eq!(power_level_dbm(0), 15);
        assert_eq!(power_level_dbm(9), 15);
    }

    #[test]
    fn test_spreading_factor_levels() {
        assert_eq!(spreading_factor_for_level(1), 7);
        assert_eq!(spreading_factor_for_level(2), 10);
        assert_eq!(spreading_factor_for_level(3), 12);
        assert_eq!(spreading_factor_for_level(0), 7);
        assert_eq!(spreading_factor_for_level(4), 7);
    }

    #[test]
    fn test_default_settings() {
        let settings = LinkSettings::default();
        assert_eq!(settings, LinkSettings::new(2, 1));

        let tx = settings.tx_config();
        assert_eq!(tx.power_dbm, 15);
        assert_eq!(tx.spreading_factor, 7);
        assert_eq!(tx.bandwidth_khz, 125);
        assert_eq!(tx.coding_rate, 5);
        assert_eq!(tx.preamble_symbols, 8);
        assert!(!tx.fixed_length);
        assert!(!tx.iq_inverted);
    }

    #[test]
    fn test_rx_config_follows_sf_level() {
        let rx = LinkSettings::new(1, 3).rx_config();
        assert_eq!(rx.spreading_factor, 12);
        assert!(rx.continuous);
    }
}

//! SX1262 transceiver adapter
//!
//! Implements [`Transceiver`] over blocking embedded-hal SPI and GPIO with
//! manual NSS control. `transmit` and `receive` only start an operation;
//! [`Transceiver::next_event`] polls DIO1 and turns the IRQ status into a
//! [`RadioEvent`].

use crate::config::protocol::MAX_FRAME_SIZE;
use crate::config::tcxo;
use crate::radio::traits::{RadioError, RadioEvent, RxConfig, RxPacket, Transceiver, TxConfig};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;
use heapless::Vec;
use log::warn;

/// SX1262 command opcodes
mod cmd {
    pub const SET_SLEEP: u8 = 0x84;
    pub const SET_STANDBY: u8 = 0x80;
    pub const SET_TX: u8 = 0x83;
    pub const SET_RX: u8 = 0x82;
    pub const SET_RF_FREQUENCY: u8 = 0x86;
    pub const SET_PACKET_TYPE: u8 = 0x8A;
    pub const SET_MODULATION_PARAMS: u8 = 0x8B;
    pub const SET_PACKET_PARAMS: u8 = 0x8C;
    pub const SET_BUFFER_BASE_ADDRESS: u8 = 0x8F;
    pub const SET_PA_CONFIG: u8 = 0x95;
    pub const SET_DIO3_AS_TCXO_CTRL: u8 = 0x97;
    pub const SET_DIO2_AS_RF_SWITCH_CTRL: u8 = 0x9D;
    pub const SET_TX_PARAMS: u8 = 0x8E;
    pub const WRITE_BUFFER: u8 = 0x0E;
    pub const READ_BUFFER: u8 = 0x1E;
    pub const WRITE_REGISTER: u8 = 0x0D;
    pub const GET_RX_BUFFER_STATUS: u8 = 0x13;
    pub const GET_PACKET_STATUS: u8 = 0x14;
    pub const GET_IRQ_STATUS: u8 = 0x12;
    pub const CLEAR_IRQ_STATUS: u8 = 0x02;
    pub const SET_DIO_IRQ_PARAMS: u8 = 0x08;
}

/// SX1262 register addresses
mod reg {
    /// Over-current protection register
    pub const OCP_CONFIGURATION: u16 = 0x08E7;
}

mod standby {
    pub const STDBY_RC: u8 = 0x00;
}

/// Sleep with configuration retained
const SLEEP_WARM_START: u8 = 0x04;

const PACKET_TYPE_LORA: u8 = 0x01;

/// IRQ masks
mod irq {
    pub const TX_DONE: u16 = 0x0001;
    pub const RX_DONE: u16 = 0x0002;
    pub const HEADER_ERR: u16 = 0x0020;
    pub const CRC_ERR: u16 = 0x0040;
    pub const TIMEOUT: u16 = 0x0200;
    pub const ALL: u16 = 0xFFFF;
}

/// RX timeout value for continuous receive
const RX_CONTINUOUS: u32 = 0xFF_FFFF;

/// What the radio was last asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Idle,
    Transmitting,
    Receiving { continuous: bool },
}

/// Packet framing shared by TX and RX
#[derive(Debug, Clone, Copy)]
struct PacketFormat {
    preamble_symbols: u16,
    fixed_length: bool,
    crc_on: bool,
    iq_inverted: bool,
}

/// Control pins for SX1262
pub struct Sx1262Pins<Nss, Dio1, Nrst, Busy> {
    pub nss: Nss,
    pub dio1: Dio1,
    pub nrst: Nrst,
    pub busy: Busy,
}

/// SX1262 transceiver
pub struct Sx1262Radio<Spi, Nss, Dio1, Nrst, Busy, Delay> {
    spi: Spi,
    nss: Nss,
    dio1: Dio1,
    nrst: Nrst,
    busy: Busy,
    delay: Delay,
    initialised: bool,
    asleep: bool,
    operation: Operation,
    tx_format: PacketFormat,
    rx_format: PacketFormat,
    tx_timeout_ms: u32,
}

/// Convert milliseconds to the 15.625 us steps used by SET_TX / SET_RX
fn timeout_steps(timeout_ms: u32) -> u32 {
    (timeout_ms.saturating_mul(64)).min(RX_CONTINUOUS - 1)
}

fn bandwidth_code(bandwidth_khz: u32) -> u8 {
    match bandwidth_khz {
        7 | 8 => 0x00,
        10 => 0x08,
        15 | 16 => 0x01,
        20 | 21 => 0x09,
        31 => 0x02,
        41 | 42 => 0x0A,
        62 | 63 => 0x03,
        125 => 0x04,
        250 => 0x05,
        500 => 0x06,
        _ => 0x04,
    }
}

fn coding_rate_code(coding_rate: u8) -> u8 {
    match coding_rate {
        5 => 0x01,
        6 => 0x02,
        7 => 0x03,
        8 => 0x04,
        _ => 0x01,
    }
}

impl<Spi, Nss, Dio1, Nrst, Busy, Delay> Sx1262Radio<Spi, Nss, Dio1, Nrst, Busy, Delay>
where
    Spi: SpiBus,
    Nss: OutputPin,
    Dio1: InputPin,
    Nrst: OutputPin,
    Busy: InputPin,
    Delay: DelayNs,
{
    pub fn new(spi: Spi, pins: Sx1262Pins<Nss, Dio1, Nrst, Busy>, delay: Delay) -> Self {
        let format = PacketFormat {
            preamble_symbols: 8,
            fixed_length: false,
            crc_on: true,
            iq_inverted: false,
        };
        Self {
            spi,
            nss: pins.nss,
            dio1: pins.dio1,
            nrst: pins.nrst,
            busy: pins.busy,
            delay,
            initialised: false,
            asleep: false,
            operation: Operation::Idle,
            tx_format: format,
            rx_format: format,
            tx_timeout_ms: 0,
        }
    }

    fn reset(&mut self) {
        let _ = self.nrst.set_low();
        self.delay.delay_ms(10);
        let _ = self.nrst.set_high();
        self.delay.delay_ms(20);
    }

    /// A falling NSS edge wakes the chip from sleep
    fn wake(&mut self) {
        if self.asleep {
            let _ = self.nss.set_low();
            self.delay.delay_us(100);
            let _ = self.nss.set_high();
            self.delay.delay_ms(1);
            self.asleep = false;
        }
    }

    fn wait_not_busy(&mut self) -> Result<(), RadioError> {
        for _ in 0..1000 {
            if self.busy.is_low().unwrap_or(false) {
                return Ok(());
            }
            self.delay.delay_us(100);
        }
        Err(RadioError::BusyTimeout)
    }

    fn select<F>(&mut self, f: F) -> Result<(), RadioError>
    where
        F: FnOnce(&mut Spi) -> Result<(), Spi::Error>,
    {
        self.wake();
        self.wait_not_busy()?;

        let _ = self.nss.set_low();
        let result = f(&mut self.spi).and_then(|()| self.spi.flush());
        let _ = self.nss.set_high();

        result.map_err(|_| RadioError::SpiError)
    }

    fn write_command(&mut self, cmd: u8, data: &[u8]) -> Result<(), RadioError> {
        let mut buf = [0u8; 16];
        buf[0] = cmd;
        let len = 1 + data.len().min(15);
        buf[1..len].copy_from_slice(&data[..len - 1]);

        self.select(|spi| spi.write(&buf[..len]))
    }

    /// Issue a read command; the reply starts after the status byte
    fn read_command(&mut self, cmd: u8, len: usize) -> Result<[u8; 16], RadioError> {
        let mut tx_buf = [0u8; 18];
        let mut rx_buf = [0u8; 18];
        tx_buf[0] = cmd;

        let total_len = 2 + len;
        self.select(|spi| spi.transfer(&mut rx_buf[..total_len], &tx_buf[..total_len]))?;

        let mut result = [0u8; 16];
        result[..len].copy_from_slice(&rx_buf[2..2 + len]);
        Ok(result)
    }

    fn write_register(&mut self, addr: u16, value: u8) -> Result<(), RadioError> {
        let [hi, lo] = addr.to_be_bytes();
        self.write_command(cmd::WRITE_REGISTER, &[hi, lo, value])
    }

    fn set_standby(&mut self) -> Result<(), RadioError> {
        self.write_command(cmd::SET_STANDBY, &[standby::STDBY_RC])
    }

    fn set_modulation(&mut self, sf: u8, bandwidth_khz: u32, coding_rate: u8) -> Result<(), RadioError> {
        // Low data rate optimisation is required for SF11/SF12 at 125 kHz
        let ldro = u8::from(sf >= 11 && bandwidth_khz <= 125);
        let data = [sf, bandwidth_code(bandwidth_khz), coding_rate_code(coding_rate), ldro];
        self.write_command(cmd::SET_MODULATION_PARAMS, &data)
    }

    fn set_packet_params(&mut self, format: PacketFormat, payload_len: u8) -> Result<(), RadioError> {
        let [pre_hi, pre_lo] = format.preamble_symbols.to_be_bytes();
        let data = [
            pre_hi,
            pre_lo,
            u8::from(format.fixed_length),
            payload_len,
            u8::from(format.crc_on),
            u8::from(format.iq_inverted),
        ];
        self.write_command(cmd::SET_PACKET_PARAMS, &data)
    }

    fn clear_irq(&mut self) -> Result<(), RadioError> {
        self.write_command(cmd::CLEAR_IRQ_STATUS, &irq::ALL.to_be_bytes())
    }

    fn irq_status(&mut self) -> Result<u16, RadioError> {
        let result = self.read_command(cmd::GET_IRQ_STATUS, 2)?;
        Ok(u16::from_be_bytes([result[0], result[1]]))
    }

    fn write_buffer(&mut self, data: &[u8]) -> Result<(), RadioError> {
        let mut buf = [0u8; MAX_FRAME_SIZE + 2];
        buf[0] = cmd::WRITE_BUFFER;
        let len = data.len().min(MAX_FRAME_SIZE);
        buf[2..2 + len].copy_from_slice(&data[..len]);

        self.select(|spi| spi.write(&buf[..2 + len]))
    }

    fn read_packet(&mut self) -> Result<RxPacket, RadioError> {
        let status = self.read_command(cmd::GET_RX_BUFFER_STATUS, 2)?;
        let (len, offset) = (status[0] as usize, status[1]);

        let mut tx_buf = [0u8; MAX_FRAME_SIZE + 3];
        let mut rx_buf = [0u8; MAX_FRAME_SIZE + 3];
        tx_buf[0] = cmd::READ_BUFFER;
        tx_buf[1] = offset;
        let total_len = 3 + len.min(MAX_FRAME_SIZE);
        self.select(|spi| spi.transfer(&mut rx_buf[..total_len], &tx_buf[..total_len]))?;

        let mut data = Vec::new();
        data.extend_from_slice(&rx_buf[3..total_len])
            .map_err(|_| RadioError::PayloadTooLarge)?;

        let status = self.read_command(cmd::GET_PACKET_STATUS, 3)?;
        let rssi = -(status[0] as i16) / 2;
        let snr = (status[1] as i8) / 4;

        Ok(RxPacket { data, rssi, snr })
    }

    fn event_for(&mut self, operation: Operation, status: u16) -> Option<RadioEvent> {
        match operation {
            Operation::Idle => None,
            Operation::Transmitting if status & irq::TX_DONE != 0 => Some(RadioEvent::TxDone),
            Operation::Transmitting if status & irq::TIMEOUT != 0 => Some(RadioEvent::TxTimeout),
            Operation::Transmitting => None,
            Operation::Receiving { .. } if status & irq::TIMEOUT != 0 => Some(RadioEvent::RxTimeout),
            Operation::Receiving { .. } if status & (irq::CRC_ERR | irq::HEADER_ERR) != 0 => {
                Some(RadioEvent::RxError)
            }
            Operation::Receiving { .. } if status & irq::RX_DONE != 0 => match self.read_packet() {
                Ok(packet) => Some(RadioEvent::RxDone(packet)),
                Err(e) => {
                    warn!("sx1262: reading packet failed: {:?}", e);
                    Some(RadioEvent::RxError)
                }
            },
            Operation::Receiving { .. } => None,
        }
    }
}

impl<Spi, Nss, Dio1, Nrst, Busy, Delay> Transceiver for Sx1262Radio<Spi, Nss, Dio1, Nrst, Busy, Delay>
where
    Spi: SpiBus,
    Nss: OutputPin,
    Dio1: InputPin,
    Nrst: OutputPin,
    Busy: InputPin,
    Delay: DelayNs,
{
    fn init(&mut self) -> Result<(), RadioError> {
        self.reset();
        self.asleep = false;
        self.wait_not_busy()?;
        self.set_standby()?;

        // SetDIO3AsTcxoCtrl: voltage code + 24-bit startup timeout (~5 ms)
        let [_, t2, t1, t0] = 0x0000_0140u32.to_be_bytes();
        self.write_command(cmd::SET_DIO3_AS_TCXO_CTRL, &[tcxo::VOLTAGE_CODE, t2, t1, t0])?;
        self.delay.delay_ms(10);

        self.write_command(cmd::SET_DIO2_AS_RF_SWITCH_CTRL, &[0x01])?;

        // OCP = current / 2.5 mA, 140 mA
        self.write_register(reg::OCP_CONFIGURATION, ((140u32 * 10) / 25) as u8)?;

        self.write_command(cmd::SET_PACKET_TYPE, &[PACKET_TYPE_LORA])?;
        self.write_command(cmd::SET_BUFFER_BASE_ADDRESS, &[0x00, 0x00])?;

        let mask = irq::TX_DONE | irq::RX_DONE | irq::TIMEOUT | irq::CRC_ERR | irq::HEADER_ERR;
        let [hi, lo] = mask.to_be_bytes();
        self.write_command(cmd::SET_DIO_IRQ_PARAMS, &[hi, lo, hi, lo, 0, 0, 0, 0])?;
        self.clear_irq()?;

        self.operation = Operation::Idle;
        self.initialised = true;
        Ok(())
    }

    fn set_channel(&mut self, frequency_hz: u32) -> Result<(), RadioError> {
        // Frequency = (freq_rf * 2^25) / 32MHz
        let freq_reg = ((frequency_hz as u64 * (1 << 25)) / 32_000_000) as u32;
        self.set_standby()?;
        self.write_command(cmd::SET_RF_FREQUENCY, &freq_reg.to_be_bytes())
    }

    fn configure_tx(&mut self, config: &TxConfig) -> Result<(), RadioError> {
        if !(7..=12).contains(&config.spreading_factor) {
            return Err(RadioError::InvalidConfig);
        }
        self.set_standby()?;
        self.set_modulation(config.spreading_factor, config.bandwidth_khz, config.coding_rate)?;

        // paDutyCycle=0x04, hpMax=0x07, deviceSel=SX1262, paLut=0x01
        self.write_command(cmd::SET_PA_CONFIG, &[0x04, 0x07, 0x00, 0x01])?;
        // Power in dBm as two's complement, ramp time 200 us
        self.write_command(cmd::SET_TX_PARAMS, &[config.power_dbm as u8, 0x04])?;

        self.tx_format = PacketFormat {
            preamble_symbols: config.preamble_symbols,
            fixed_length: config.fixed_length,
            crc_on: config.crc_on,
            iq_inverted: config.iq_inverted,
        };
        self.tx_timeout_ms = config.timeout_ms;
        self.operation = Operation::Idle;
        Ok(())
    }

    fn configure_rx(&mut self, config: &RxConfig) -> Result<(), RadioError> {
        if !(7..=12).contains(&config.spreading_factor) {
            return Err(RadioError::InvalidConfig);
        }
        self.set_standby()?;
        self.set_modulation(config.spreading_factor, config.bandwidth_khz, config.coding_rate)?;

        self.rx_format = PacketFormat {
            preamble_symbols: config.preamble_symbols,
            fixed_length: config.fixed_length,
            crc_on: config.crc_on,
            iq_inverted: config.iq_inverted,
        };
        self.operation = Operation::Idle;
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        if !self.initialised {
            return Err(RadioError::NotInitialised);
        }
        if frame.is_empty() || frame.len() > MAX_FRAME_SIZE {
            return Err(RadioError::PayloadTooLarge);
        }

        self.set_standby()?;
        self.set_packet_params(self.tx_format, frame.len() as u8)?;
        self.write_buffer(frame)?;
        self.clear_irq()?;

        let [_, t2, t1, t0] = timeout_steps(self.tx_timeout_ms).to_be_bytes();
        self.write_command(cmd::SET_TX, &[t2, t1, t0])?;
        self.operation = Operation::Transmitting;
        Ok(())
    }

    fn receive(&mut self, timeout_ms: u32) -> Result<(), RadioError> {
        if !self.initialised {
            return Err(RadioError::NotInitialised);
        }

        self.set_standby()?;
        self.set_packet_params(self.rx_format, MAX_FRAME_SIZE as u8)?;
        self.clear_irq()?;

        let steps = if timeout_ms == 0 {
            RX_CONTINUOUS
        } else {
            timeout_steps(timeout_ms)
        };
        let [_, t2, t1, t0] = steps.to_be_bytes();
        self.write_command(cmd::SET_RX, &[t2, t1, t0])?;
        self.operation = Operation::Receiving {
            continuous: timeout_ms == 0,
        };
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), RadioError> {
        if !self.initialised {
            return Err(RadioError::NotInitialised);
        }
        self.write_command(cmd::SET_SLEEP, &[SLEEP_WARM_START])?;
        self.asleep = true;
        self.operation = Operation::Idle;
        Ok(())
    }

    fn next_event(&mut self) -> Option<RadioEvent> {
        if self.operation == Operation::Idle || !self.dio1.is_high().unwrap_or(false) {
            return None;
        }

        let operation = self.operation;
        let status = match self.irq_status().and_then(|status| self.clear_irq().map(|()| status)) {
            Ok(status) => status,
            Err(e) => {
                warn!("sx1262: irq status read failed: {:?}", e);
                self.operation = Operation::Idle;
                return Some(match operation {
                    Operation::Transmitting => RadioEvent::TxTimeout,
                    _ => RadioEvent::RxError,
                });
            }
        };

        let event = self.event_for(operation, status);
        if event.is_some() && operation != (Operation::Receiving { continuous: true }) {
            self.operation = Operation::Idle;
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_steps() {
        assert_eq!(timeout_steps(3000), 192_000);
        assert_eq!(timeout_steps(u32::MAX), RX_CONTINUOUS - 1);
    }

    #[test]
    fn test_parameter_codes() {
        assert_eq!(bandwidth_code(125), 0x04);
        assert_eq!(bandwidth_code(999), 0x04);
        assert_eq!(coding_rate_code(5), 0x01);
        assert_eq!(coding_rate_code(8), 0x04);
    }
}

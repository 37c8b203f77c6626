// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! ADS1115 16-bit ADC over Linux I2C
//!
//! Each read triggers a single-shot conversion of one single-ended input
//! against GND at ±4.096 V full scale, waits for it, then reads the result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use parking_lot::Mutex;
use tracing::info;

use super::{ChannelDriver, ReadError, SensorChannel};
use crate::config::SensorConfig;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const OS_SINGLE: u16 = 0x8000;
const MUX_SINGLE_AIN0: u16 = 0x4000;
const PGA_4_096V: u16 = 0x0200;
const MODE_SINGLE_SHOT: u16 = 0x0100;
const DR_128SPS: u16 = 0x0080;
const COMP_DISABLE: u16 = 0x0003;

const FULL_SCALE_VOLTS: f64 = 4.096;
// 1/128 s plus margin
const CONVERSION_TIME: Duration = Duration::from_millis(9);

pub struct Ads1115Driver {
    device: Arc<Mutex<LinuxI2CDevice>>,
}

impl Ads1115Driver {
    pub fn open(config: &SensorConfig) -> Result<Self> {
        let device = LinuxI2CDevice::new(&config.i2c_bus, config.i2c_address)?;
        info!("ADS1115 opened on {} at {:#04x}", config.i2c_bus, config.i2c_address);
        Ok(Self { device: Arc::new(Mutex::new(device)) })
    }

    fn config_word(channel: SensorChannel) -> u16 {
        let mux = MUX_SINGLE_AIN0 | ((channel.index() as u16) << 12);
        OS_SINGLE | mux | PGA_4_096V | MODE_SINGLE_SHOT | DR_128SPS | COMP_DISABLE
    }

    fn to_volts(raw: [u8; 2]) -> f64 {
        i16::from_be_bytes(raw) as f64 * FULL_SCALE_VOLTS / 32768.0
    }

    fn convert(device: &mut LinuxI2CDevice, channel: SensorChannel) -> Result<f64, String> {
        let [hi, lo] = Self::config_word(channel).to_be_bytes();
        device.write(&[REG_CONFIG, hi, lo]).map_err(|e| e.to_string())?;
        std::thread::sleep(CONVERSION_TIME);
        device.write(&[REG_CONVERSION]).map_err(|e| e.to_string())?;
        let mut raw = [0u8; 2];
        device.read(&mut raw).map_err(|e| e.to_string())?;
        Ok(Self::to_volts(raw))
    }
}

#[async_trait]
impl ChannelDriver for Ads1115Driver {
    fn name(&self) -> &str {
        "ads1115"
    }

    async fn read_voltage(&self, channel: SensorChannel) -> Result<f64, ReadError> {
        let device = self.device.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut device = device.lock();
            Self::convert(&mut device, channel)
        })
        .await;

        match result {
            Ok(Ok(voltage)) => Ok(voltage),
            Ok(Err(message)) => Err(ReadError::Bus { channel, message }),
            Err(e) => Err(ReadError::Bus { channel, message: e.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_word_selects_input() {
        assert_eq!(Ads1115Driver::config_word(SensorChannel::Mq135), 0xC383);
        assert_eq!(Ads1115Driver::config_word(SensorChannel::Mq7), 0xF383);
    }

    #[test]
    fn test_raw_to_volts() {
        assert_eq!(Ads1115Driver::to_volts([0x00, 0x00]), 0.0);
        assert!((Ads1115Driver::to_volts([0x7F, 0xFF]) - 4.096).abs() < 1e-3);
        assert!(Ads1115Driver::to_volts([0x80, 0x00]) < 0.0);
    }
}

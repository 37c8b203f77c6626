// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::sensors::{Circuit, SamplingMode, SensorChannel};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated sensors)
    pub demo_mode: bool,

    /// Sensor hardware and gas curves
    pub sensors: SensorConfig,

    /// Retrying reader
    pub reader: ReaderConfig,

    /// Startup calibration
    pub calibration: CalibrationConfig,

    /// Sampling loop
    pub sampling: SamplingConfig,

    /// Quality classification
    pub classification: ClassificationConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            demo_mode: false,
            sensors: SensorConfig::default(),
            reader: ReaderConfig::default(),
            calibration: CalibrationConfig::default(),
            sampling: SamplingConfig::default(),
            classification: ClassificationConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("enose"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Power-law curve for the gas a sensor is tuned to: `ppm = a * (Rs/Ro)^b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasProfile {
    /// Target gas name
    pub gas: String,
    pub a: f64,
    pub b: f64,
    /// Assumed concentration of the gas in clean air
    pub clean_air_ppm: f64,
    /// Concentration mapped to the top of the normalized range
    pub max_ppm: f64,
}

impl GasProfile {
    fn new(gas: &str, a: f64, b: f64, clean_air_ppm: f64, max_ppm: f64) -> Self {
        Self { gas: gas.to_string(), a, b, clean_air_ppm, max_ppm }
    }
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// I2C bus device
    pub i2c_bus: String,

    /// ADC address on the bus
    pub i2c_address: u16,

    /// Sensor supply voltage (V)
    pub vcc: f64,

    /// Load resistance (kΩ)
    pub r_load: f64,

    pub mq135: GasProfile,
    pub mq2: GasProfile,
    pub mq4: GasProfile,
    pub mq7: GasProfile,
}

impl SensorConfig {
    pub fn profile(&self, channel: SensorChannel) -> &GasProfile {
        match channel {
            SensorChannel::Mq135 => &self.mq135,
            SensorChannel::Mq2 => &self.mq2,
            SensorChannel::Mq4 => &self.mq4,
            SensorChannel::Mq7 => &self.mq7,
        }
    }

    pub fn circuit(&self) -> Circuit {
        Circuit { vcc: self.vcc, r_load: self.r_load }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-1".to_string(),
            i2c_address: 0x48,
            vcc: 5.0,
            r_load: 10.0,
            mq135: GasProfile::new("CO2", 110.47, -2.862, 400.0, 5000.0),
            mq2: GasProfile::new("LPG", 574.25, -2.222, 10.0, 10000.0),
            mq4: GasProfile::new("CH4", 1012.7, -2.786, 5.0, 10000.0),
            mq7: GasProfile::new("CO", 99.042, -1.518, 1.0, 1000.0),
        }
    }
}

/// Retrying reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Attempts per read
    pub retries: u32,

    /// Delay between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl ReaderConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_delay_ms: 500,
        }
    }
}

/// Calibration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Clean-air samples per channel
    pub samples: usize,

    /// Delay between samples in milliseconds
    pub sample_delay_ms: u64,

    /// Ro used when calibration cannot produce a positive value
    pub default_ro: f64,
}

impl CalibrationConfig {
    pub fn sample_delay(&self) -> Duration {
        Duration::from_millis(self.sample_delay_ms)
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            samples: 50,
            sample_delay_ms: 100,
            default_ro: 1.0,
        }
    }
}

/// Sampling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Idle time between ticks in milliseconds
    pub interval_ms: u64,

    /// Bounded wait for a worker to exit on stop
    pub stop_timeout_ms: u64,

    /// Moving average length
    pub smoothing_window: usize,

    /// Channels whose raw signal is noisy enough to smooth
    pub smoothed_channels: Vec<SensorChannel>,

    /// Modes started when the service launches
    pub startup_modes: Vec<SamplingMode>,
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            stop_timeout_ms: 5000,
            smoothing_window: 10,
            smoothed_channels: vec![SensorChannel::Mq4, SensorChannel::Mq7],
            startup_modes: vec![SamplingMode::All],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPolicy {
    /// Every channel checked against its own thresholds
    PerChannel,
    /// Mean of the active channels checked against fixed bands
    Average,
}

/// Upper bounds (exclusive) of the good and medium ranges for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub good_below: f64,
    pub medium_below: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelThresholds {
    pub mq135: Threshold,
    pub mq2: Threshold,
    pub mq4: Threshold,
    pub mq7: Threshold,
}

impl ChannelThresholds {
    pub fn get(&self, channel: SensorChannel) -> Threshold {
        match channel {
            SensorChannel::Mq135 => self.mq135,
            SensorChannel::Mq2 => self.mq2,
            SensorChannel::Mq4 => self.mq4,
            SensorChannel::Mq7 => self.mq7,
        }
    }
}

impl Default for ChannelThresholds {
    fn default() -> Self {
        Self {
            mq135: Threshold { good_below: 2.0, medium_below: 4.0 },
            mq2: Threshold { good_below: 1.5, medium_below: 3.5 },
            mq4: Threshold { good_below: 2.0, medium_below: 4.0 },
            mq7: Threshold { good_below: 1.0, medium_below: 3.0 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AverageBands {
    pub medium_from: f64,
    pub high_from: f64,
}

impl Default for AverageBands {
    fn default() -> Self {
        Self {
            medium_from: 2.0,
            high_from: 3.5,
        }
    }
}

/// Classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub policy: ClassificationPolicy,
    pub thresholds: ChannelThresholds,
    pub average_bands: AverageBands,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            policy: ClassificationPolicy::PerChannel,
            thresholds: ChannelThresholds::default(),
            average_bands: AverageBands::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Enable database storage
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/enose.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();

        assert_eq!(back.sampling.startup_modes, vec![SamplingMode::All]);
        assert_eq!(back.sampling.smoothed_channels, vec![SensorChannel::Mq4, SensorChannel::Mq7]);
        assert_eq!(back.sensors.mq7, config.sensors.mq7);
        assert_eq!(back.classification.policy, ClassificationPolicy::PerChannel);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let text = r#"
            demo_mode = true

            [classification]
            policy = "average"

            [classification.thresholds]
            mq7 = { good_below = 0.8, medium_below = 2.5 }

            [classification.average_bands]
            high_from = 3.0

            [sampling]
            interval_ms = 1000
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert!(config.demo_mode);
        assert_eq!(config.classification.policy, ClassificationPolicy::Average);
        assert_eq!(config.classification.thresholds.mq7.good_below, 0.8);
        assert_eq!(config.classification.thresholds.mq2.good_below, 1.5);
        assert_eq!(config.classification.average_bands.high_from, 3.0);
        assert_eq!(config.classification.average_bands.medium_from, 2.0);
        assert_eq!(config.sampling.interval(), Duration::from_secs(1));
        assert_eq!(config.sampling.smoothing_window, 10);
        assert_eq!(config.reader.retries, 5);
        assert_eq!(config.sampling.stop_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_mode_in_file_is_rejected() {
        let text = r#"
            [sampling]
            interval_ms = 1000
            stop_timeout_ms = 5000
            smoothing_window = 10
            smoothed_channels = ["mq4"]
            startup_modes = ["main_loop"]
        "#;
        assert!(toml::from_str::<Config>(text).is_err());
    }
}

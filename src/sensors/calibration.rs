// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Clean-air calibration and voltage to concentration conversion
//!
//! MQ sensors follow a power law: `ppm = A * (Rs / Ro) ^ B`, where `Rs` is
//! the instantaneous sensor resistance and `Ro` its resistance in clean air.
//! `Ro` is measured once at startup and anchors every later conversion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ChannelDriver, SensorChannel};
use crate::config::{CalibrationConfig, GasProfile, SensorConfig};

/// Upper bound of the normalized output range
pub const NORMALIZED_MAX: f64 = 5.0;

/// Voltage divider the sensors sit in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    /// Supply voltage (V)
    pub vcc: f64,
    /// Load resistance (kΩ)
    pub r_load: f64,
}

impl Circuit {
    /// Sensor resistance for a voltage; `None` when it is not a usable sample
    pub fn sensor_resistance(&self, voltage: f64) -> Option<f64> {
        if voltage.is_nan() || voltage <= 0.0 {
            return None;
        }
        let headroom = self.vcc - voltage;
        if headroom == 0.0 {
            return None;
        }
        let rs = voltage * self.r_load / headroom;
        (rs.is_finite() && rs > 0.0).then_some(rs)
    }
}

/// Solve `Ro` from the clean-air mean resistance, falling back to `default_ro`
pub fn baseline_resistance(rs_mean: f64, profile: &GasProfile, default_ro: f64) -> f64 {
    let ratio = (profile.clean_air_ppm / profile.a).powf(1.0 / profile.b);
    let ro = rs_mean / ratio;
    if ro.is_finite() && ro > 0.0 {
        ro
    } else {
        default_ro
    }
}

/// Calibration result for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCalibration {
    pub channel: SensorChannel,
    pub profile: GasProfile,
    /// Baseline resistance in clean air, always > 0
    pub ro: f64,
    /// Clean-air samples that produced a resistance
    pub valid_samples: usize,
    pub timestamp: DateTime<Utc>,
}

/// Calibrated conversion for all four channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    circuit: Circuit,
    channels: [ChannelCalibration; 4],
}

impl CalibrationTable {
    /// Build a table from already-known `Ro` values, indexed by channel
    pub fn from_ro(sensors: &SensorConfig, ro: [f64; 4], default_ro: f64) -> Self {
        let channels = SensorChannel::ALL.map(|channel| {
            let value = ro[channel.index()];
            ChannelCalibration {
                channel,
                profile: sensors.profile(channel).clone(),
                ro: if value.is_finite() && value > 0.0 { value } else { default_ro },
                valid_samples: 0,
                timestamp: Utc::now(),
            }
        });
        Self { circuit: sensors.circuit(), channels }
    }

    pub fn circuit(&self) -> Circuit {
        self.circuit
    }

    pub fn get(&self, channel: SensorChannel) -> &ChannelCalibration {
        &self.channels[channel.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelCalibration> {
        self.channels.iter()
    }

    /// Estimated concentration; `None` when the voltage gives no resistance
    pub fn ppm(&self, channel: SensorChannel, voltage: f64) -> Option<f64> {
        let cal = self.get(channel);
        let rs = self.circuit.sensor_resistance(voltage)?;
        Some(cal.profile.a * (rs / cal.ro).powf(cal.profile.b))
    }

    /// Concentration rescaled to `0..=5`; out-of-range values are clamped
    pub fn normalize(&self, channel: SensorChannel, voltage: f64) -> f64 {
        let Some(ppm) = self.ppm(channel, voltage) else {
            return 0.0;
        };
        let scaled = ppm / self.get(channel).profile.max_ppm * NORMALIZED_MAX;
        if scaled.is_nan() {
            return 0.0;
        }
        scaled.clamp(0.0, NORMALIZED_MAX)
    }
}

/// Runs the one-time clean-air calibration against a driver
pub struct Calibrator {
    driver: Arc<dyn ChannelDriver>,
    sensors: SensorConfig,
    config: CalibrationConfig,
}

impl Calibrator {
    pub fn new(driver: Arc<dyn ChannelDriver>, sensors: SensorConfig, config: CalibrationConfig) -> Self {
        Self { driver, sensors, config }
    }

    /// Calibrate every channel in order. Blocks until done; never fails.
    pub async fn run(&self) -> CalibrationTable {
        info!("Calibrating {} channels in clean air ({} samples each)...",
            SensorChannel::ALL.len(), self.config.samples);

        let mut ro = [self.config.default_ro; 4];
        let mut valid = [0usize; 4];
        for channel in SensorChannel::ALL {
            let result = self.calibrate_channel(channel).await;
            ro[channel.index()] = result.ro;
            valid[channel.index()] = result.valid_samples;
        }

        let mut table = CalibrationTable::from_ro(&self.sensors, ro, self.config.default_ro);
        for cal in table.channels.iter_mut() {
            cal.valid_samples = valid[cal.channel.index()];
        }
        info!("Calibration complete");
        table
    }

    /// Sample one channel `samples` times and solve its `Ro`
    pub async fn calibrate_channel(&self, channel: SensorChannel) -> ChannelCalibration {
        let circuit = self.sensors.circuit();
        let profile = self.sensors.profile(channel).clone();
        let delay = self.config.sample_delay();

        let mut total = 0.0;
        let mut valid_samples = 0usize;
        for i in 0..self.config.samples {
            match self.driver.read_voltage(channel).await {
                Ok(voltage) => match circuit.sensor_resistance(voltage) {
                    Some(rs) => {
                        total += rs;
                        valid_samples += 1;
                    }
                    None => debug!("{} calibration sample {} skipped ({:.3}V)", channel, i + 1, voltage),
                },
                Err(e) => debug!("{} calibration sample {} failed: {}", channel, i + 1, e),
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let ro = if valid_samples > 0 {
            let rs_mean = total / valid_samples as f64;
            let ro = baseline_resistance(rs_mean, &profile, self.config.default_ro);
            info!(
                "{} ({}) calibrated: Rs mean = {:.3}, Ro = {:.3} from {}/{} samples",
                channel, profile.gas, rs_mean, ro, valid_samples, self.config.samples
            );
            ro
        } else {
            warn!(
                "{}: no valid calibration samples, using default Ro = {:.3}",
                channel, self.config.default_ro
            );
            self.config.default_ro
        };

        ChannelCalibration {
            channel,
            profile,
            ro,
            valid_samples,
            timestamp: Utc::now(),
        }
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor traits and common types

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::EngineError;

/// Gas sensor channels wired to the ADC
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorChannel {
    Mq135,  // AIN0, air quality / CO2
    Mq2,    // AIN1, LPG / smoke
    Mq4,    // AIN2, methane
    Mq7,    // AIN3, carbon monoxide
}

impl SensorChannel {
    /// Every channel, in ADC input order
    pub const ALL: [SensorChannel; 4] = [
        SensorChannel::Mq135,
        SensorChannel::Mq2,
        SensorChannel::Mq4,
        SensorChannel::Mq7,
    ];

    /// Physical ADC input index
    pub fn index(self) -> usize {
        match self {
            SensorChannel::Mq135 => 0,
            SensorChannel::Mq2 => 1,
            SensorChannel::Mq4 => 2,
            SensorChannel::Mq7 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SensorChannel::Mq135 => "mq135",
            SensorChannel::Mq2 => "mq2",
            SensorChannel::Mq4 => "mq4",
            SensorChannel::Mq7 => "mq7",
        }
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensorChannel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        SensorChannel::ALL
            .into_iter()
            .find(|c| c.name() == lowered)
            .ok_or_else(|| EngineError::UnknownChannel(s.to_string()))
    }
}

/// A named sampling configuration: one channel, or every channel at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SamplingMode {
    Single(SensorChannel),
    All,
}

impl SamplingMode {
    pub const ALL_KEY: &'static str = "all";

    /// Every mode key the control surface accepts
    pub fn every() -> impl Iterator<Item = SamplingMode> {
        SensorChannel::ALL
            .into_iter()
            .map(SamplingMode::Single)
            .chain(std::iter::once(SamplingMode::All))
    }

    /// Modes that must be stopped before this one may drive the bus
    pub fn conflicts(self) -> Vec<SamplingMode> {
        match self {
            SamplingMode::All => SensorChannel::ALL.into_iter().map(SamplingMode::Single).collect(),
            SamplingMode::Single(_) => vec![SamplingMode::All],
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            SamplingMode::Single(channel) => channel.name(),
            SamplingMode::All => Self::ALL_KEY,
        }
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SamplingMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case(Self::ALL_KEY) {
            return Ok(SamplingMode::All);
        }
        s.parse::<SensorChannel>()
            .map(SamplingMode::Single)
            .map_err(|_| EngineError::UnknownMode(s.to_string()))
    }
}

impl TryFrom<String> for SamplingMode {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SamplingMode> for String {
    fn from(mode: SamplingMode) -> Self {
        mode.key().to_string()
    }
}

/// Failure of a single voltage read
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReadError {
    #[error("bus error on {channel}: {message}")]
    Bus { channel: SensorChannel, message: String },

    #[error("non-positive voltage {voltage:.3}V on {channel}")]
    NonPositive { channel: SensorChannel, voltage: f64 },

    #[error("no valid voltage on {channel} after {attempts} attempts")]
    Exhausted { channel: SensorChannel, attempts: u32 },
}

/// Raw transport returning one instantaneous voltage for a channel
#[async_trait]
pub trait ChannelDriver: Send + Sync {
    /// Driver name for diagnostics
    fn name(&self) -> &str;

    /// Read one voltage sample; may fail transiently
    async fn read_voltage(&self, channel: SensorChannel) -> Result<f64, ReadError>;
}

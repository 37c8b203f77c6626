//! Core engine module - activation, sampling workers and event distribution

mod activation;
mod engine;
mod event_bus;

pub use activation::ActivationSet;
pub use engine::{SamplingEngine, StartOutcome, StopOutcome};
pub use event_bus::{Event, EventBus, EventPayload};

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::QualityLabel;
use crate::sensors::{SamplingMode, SensorChannel};

/// Errors surfaced to callers of the control surface
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown sensor mode '{0}'")]
    UnknownMode(String),

    #[error("unknown sensor channel '{0}'")]
    UnknownChannel(String),
}

/// One sampling tick: normalized values of the channels active at sample time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub mode: SamplingMode,
    /// Normalized values in `0..=5`; absent channels were not active
    pub values: BTreeMap<SensorChannel, f64>,
    pub quality: QualityLabel,
}

impl Reading {
    pub fn value(&self, channel: SensorChannel) -> Option<f64> {
        self.values.get(&channel).copied()
    }
}

/// Persistence collaborator receiving every labelled reading
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn store(&self, reading: &Reading) -> anyhow::Result<()>;
}

/// Sink that drops readings, for running without storage
pub struct DiscardSink;

#[async_trait]
impl ReadingSink for DiscardSink {
    async fn store(&self, _reading: &Reading) -> anyhow::Result<()> {
        Ok(())
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! E-Nose - gas sensor acquisition and air quality classification
//!
//! Four MQ-series gas sensors share one ADS1115 ADC. The engine:
//! - calibrates every channel once against clean air (`Ro`)
//! - reads voltages with bounded retries, tolerating bus glitches
//! - converts voltage to concentration and normalizes it into `0..=5`
//! - smooths the noisy channels with a moving average
//! - labels each composite reading with a coarse quality class
//! - runs one background worker per sampling mode, never letting the
//!   single-channel and all-channel modes drive the bus together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Sampling Engine                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌──────────┐  ┌─────────────┐  ┌────────────┐  │
//! │  │ Channel │→ │ Retrying │→ │ Calibration │→ │ Smoothing  │  │
//! │  │ Driver  │  │ Reader   │  │ Table       │  │ Filter     │  │
//! │  └─────────┘  └──────────┘  └─────────────┘  └────────────┘  │
//! │       ↑                                            ↓          │
//! │  ┌────────────┐                             ┌────────────┐   │
//! │  │ Activation │                             │  Quality   │   │
//! │  │ Set        │                             │ Classifier │   │
//! │  └────────────┘                             └────────────┘   │
//! │                                                    ↓          │
//! │            ┌──────────────┐   ┌──────────────────────┐       │
//! │            │  Event Bus   │ ← │ Reading Sink (SQLite)│       │
//! │            └──────────────┘   └──────────────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod sensors;
pub mod analysis;
pub mod detection;
pub mod config;
pub mod db;

// Re-exports for convenience
pub use config::Config;
pub use crate::core::{EngineError, EventBus, Reading, ReadingSink, SamplingEngine, StartOutcome, StopOutcome};
pub use sensors::{CalibrationTable, Calibrator, ChannelDriver, SamplingMode, SensorChannel};
pub use detection::{QualityClassifier, QualityLabel};
pub use db::Database;

/// E-Nose version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// E-Nose name
pub const NAME: &str = "E-Nose";

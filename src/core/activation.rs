// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Set of channels currently enabled for sampling

use std::collections::BTreeSet;

use crate::sensors::{SamplingMode, SensorChannel};

/// Active channels. Mutated only through `activate`/`deactivate`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationSet {
    channels: BTreeSet<SensorChannel>,
}

impl ActivationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `All` enables every channel; a single mode adds its channel. Idempotent.
    pub fn activate(&mut self, mode: SamplingMode) {
        match mode {
            SamplingMode::All => self.channels.extend(SensorChannel::ALL),
            SamplingMode::Single(channel) => {
                self.channels.insert(channel);
            }
        }
    }

    /// `All` clears every channel; a single mode removes only its channel
    pub fn deactivate(&mut self, mode: SamplingMode) {
        match mode {
            SamplingMode::All => self.channels.clear(),
            SamplingMode::Single(channel) => {
                self.channels.remove(&channel);
            }
        }
    }

    pub fn deactivate_all(&mut self) {
        self.channels.clear();
    }

    pub fn is_active(&self, channel: SensorChannel) -> bool {
        self.channels.contains(&channel)
    }

    pub fn channels(&self) -> Vec<SensorChannel> {
        self.channels.iter().copied().collect()
    }

    /// Channels a worker for `mode` should sample this tick
    pub fn channels_for(&self, mode: SamplingMode) -> Vec<SensorChannel> {
        match mode {
            SamplingMode::All => self.channels(),
            SamplingMode::Single(channel) if self.is_active(channel) => vec![channel],
            SamplingMode::Single(_) => Vec::new(),
        }
    }
}

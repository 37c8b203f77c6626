// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Simulated and scripted channel drivers for demo/testing

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::StandardNormal;

use super::{ChannelDriver, ReadError, SensorChannel};

/// Simulates MQ sensor output voltages with drift, noise and gas events
pub struct SimulatedDriver {
    state: Mutex<SimulationState>,
    fault_probability: f64,
}

struct SimulationState {
    rng: StdRng,
    // Per channel: clean-air baseline, slow drift, remaining event ticks
    baseline: [f64; 4],
    drift: [f64; 4],
    event: [u32; 4],
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    #[cfg(test)]
    fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(SimulationState {
                rng,
                baseline: [0.95, 0.60, 0.45, 0.35],
                drift: [0.0; 4],
                event: [0; 4],
            }),
            fault_probability: 0.02,
        }
    }

    #[cfg(test)]
    fn with_fault_probability(mut self, probability: f64) -> Self {
        self.fault_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn read_voltage(&self, channel: SensorChannel) -> Result<f64, ReadError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let i = channel.index();

        if state.rng.gen_bool(self.fault_probability) {
            return Err(ReadError::Bus {
                channel,
                message: "simulated I2C NACK".to_string(),
            });
        }

        let step = state.rng.gen_range(-0.002..0.002);
        state.drift[i] = (state.drift[i] + step).clamp(-0.1, 0.1);

        if state.event[i] == 0 && state.rng.gen_bool(0.01) {
            state.event[i] = state.rng.gen_range(5..30);
        }
        let event_boost = if state.event[i] > 0 {
            state.event[i] -= 1;
            1.5
        } else {
            0.0
        };

        let noise: f64 = state.rng.sample::<f64, _>(StandardNormal) * 0.02;
        let voltage = state.baseline[i] + state.drift[i] + event_boost + noise;
        Ok(voltage.clamp(0.0, 4.096))
    }
}

/// Fake driver returning scripted voltages, for tests
pub struct ScriptedDriver {
    inner: Mutex<Script>,
}

#[derive(Default)]
struct Script {
    queued: HashMap<SensorChannel, VecDeque<Result<f64, ReadError>>>,
    steady: HashMap<SensorChannel, f64>,
    calls: HashMap<SensorChannel, u32>,
    latency: Duration,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Script::default()) }
    }

    /// Queue one voltage for a channel
    pub fn push(&self, channel: SensorChannel, voltage: f64) {
        self.inner.lock().queued.entry(channel).or_default().push_back(Ok(voltage));
    }

    /// Queue `count` bus failures for a channel
    pub fn push_failures(&self, channel: SensorChannel, count: usize) {
        let mut script = self.inner.lock();
        let queue = script.queued.entry(channel).or_default();
        for _ in 0..count {
            queue.push_back(Err(ReadError::Bus {
                channel,
                message: "scripted failure".to_string(),
            }));
        }
    }

    /// Voltage returned once a channel's queue is drained
    pub fn set_steady(&self, channel: SensorChannel, voltage: f64) {
        self.inner.lock().steady.insert(channel, voltage);
    }

    /// Delay applied to every read
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = latency;
    }

    pub fn calls(&self, channel: SensorChannel) -> u32 {
        self.inner.lock().calls.get(&channel).copied().unwrap_or(0)
    }
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelDriver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn read_voltage(&self, channel: SensorChannel) -> Result<f64, ReadError> {
        let (result, latency) = {
            let mut script = self.inner.lock();
            *script.calls.entry(channel).or_insert(0) += 1;
            let next = script.queued.get_mut(&channel).and_then(|q| q.pop_front());
            let result = match next {
                Some(r) => r,
                None => match script.steady.get(&channel) {
                    Some(&v) => Ok(v),
                    None => Err(ReadError::Bus {
                        channel,
                        message: "no scripted value".to_string(),
                    }),
                },
            };
            (result, script.latency)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

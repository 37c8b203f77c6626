// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Bounded-retry voltage reader

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{ChannelDriver, ReadError, SensorChannel};
use crate::config::ReaderConfig;

/// A voltage accepted by the reader
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageSample {
    pub voltage: f64,
    /// Failed attempts before this one succeeded
    pub retries: u32,
}

/// Wraps a channel driver with a fixed number of attempts and a fixed delay
pub struct RetryingReader {
    driver: Arc<dyn ChannelDriver>,
    attempts: u32,
    delay: Duration,
}

impl RetryingReader {
    pub fn new(driver: Arc<dyn ChannelDriver>, config: &ReaderConfig) -> Self {
        Self {
            driver,
            attempts: config.retries.max(1),
            delay: config.retry_delay(),
        }
    }

    pub fn driver(&self) -> &Arc<dyn ChannelDriver> {
        &self.driver
    }

    /// Read a strictly positive voltage, retrying transient failures
    pub async fn read(&self, channel: SensorChannel) -> Result<VoltageSample, ReadError> {
        for attempt in 1..=self.attempts {
            let result = match self.driver.read_voltage(channel).await {
                Ok(voltage) if voltage > 0.0 => Ok(voltage),
                Ok(voltage) => Err(ReadError::NonPositive { channel, voltage }),
                Err(e) => Err(e),
            };

            match result {
                Ok(voltage) => {
                    debug!("{} attempt {}/{}: {:.3}V", channel, attempt, self.attempts, voltage);
                    return Ok(VoltageSample { voltage, retries: attempt - 1 });
                }
                Err(e) => {
                    warn!("{} attempt {}/{} failed: {}", channel, attempt, self.attempts, e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        error!("{}: giving up after {} attempts", channel, self.attempts);
        Err(ReadError::Exhausted { channel, attempts: self.attempts })
    }
}

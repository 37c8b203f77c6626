// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event bus for readings and engine events

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::Reading;
use crate::sensors::{SamplingMode, SensorChannel};

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Reading(Reading),
    ModeStarted { mode: SamplingMode },
    ModeStopped { mode: SamplingMode },
    ReadFailure { channel: SensorChannel, message: String },
    SinkFailure { message: String },
}

/// Keeps the latest reading and fans readings and events out to subscribers
pub struct EventBus {
    reading_tx: broadcast::Sender<Reading>,
    event_tx: broadcast::Sender<Event>,
    latest: RwLock<Option<Reading>>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (reading_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            reading_tx,
            event_tx,
            latest: RwLock::new(None),
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_reading(&self, reading: Reading) {
        *self.latest.write() = Some(reading.clone());
        let _ = self.reading_tx.send(reading.clone());
        self.publish(EventPayload::Reading(reading));
    }

    pub fn publish(&self, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn latest(&self) -> Option<Reading> {
        self.latest.read().clone()
    }

    pub fn subscribe_readings(&self) -> broadcast::Receiver<Reading> {
        self.reading_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sampling engine - owns the per-mode background workers
//!
//! Each mode key (one channel, or `all`) has at most one worker. A worker
//! checks its liveness flag at the top of every tick, samples the channels
//! its mode has active, labels the reading, hands it to the sink and then
//! idles for the configured interval. Starting a mode first stops and joins
//! every conflicting mode so that two workers never drive the same channels.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ActivationSet, EngineError, EventBus, EventPayload, Reading, ReadingSink};
use crate::analysis::SmoothingFilter;
use crate::config::Config;
use crate::detection::QualityClassifier;
use crate::sensors::{CalibrationTable, ChannelDriver, RetryingReader, SamplingMode, SensorChannel};

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

impl StartOutcome {
    pub fn message(&self, mode: SamplingMode) -> String {
        let name = mode.key().to_uppercase();
        match self {
            StartOutcome::Started => format!("Sensor {} started collecting data", name),
            StartOutcome::AlreadyRunning => format!("Sensor {} is already running", name),
        }
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

impl StopOutcome {
    pub fn message(&self, mode: SamplingMode) -> String {
        let name = mode.key().to_uppercase();
        match self {
            StopOutcome::Stopped => format!("Sensor {} stopped collecting data", name),
            StopOutcome::NotRunning => format!("Sensor {} was not running", name),
        }
    }
}

struct Worker {
    running: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn is_live(&self) -> bool {
        *self.running.borrow() && !self.handle.is_finished()
    }
}

/// State shared between the engine and its workers
struct Sampler {
    reader: RetryingReader,
    calibration: CalibrationTable,
    smoothing: parking_lot::Mutex<SmoothingFilter>,
    classifier: QualityClassifier,
    activation: parking_lot::Mutex<ActivationSet>,
    sink: Arc<dyn ReadingSink>,
    bus: Arc<EventBus>,
    interval: Duration,
    sequence: AtomicU64,
}

impl Sampler {
    /// Acquire one composite reading over `channels`
    async fn sample(&self, mode: SamplingMode, channels: &[SensorChannel]) -> Reading {
        let mut values = BTreeMap::new();

        for &channel in channels {
            let voltage = match self.reader.read(channel).await {
                Ok(sample) => sample.voltage,
                Err(e) => {
                    warn!("{}; recording 0.000V", e);
                    self.bus.publish(EventPayload::ReadFailure {
                        channel,
                        message: e.to_string(),
                    });
                    0.0
                }
            };
            let normalized = self.calibration.normalize(channel, voltage);
            let value = self.smoothing.lock().apply(channel, normalized);
            debug!("{}: {:.3}V -> {:.3} (smoothed {:.3})", channel, voltage, normalized, value);
            values.insert(channel, value);
        }

        let quality = self.classifier.classify(&values);
        Reading {
            timestamp: Utc::now(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            mode,
            values,
            quality,
        }
    }
}

async fn run_worker(sampler: Arc<Sampler>, mode: SamplingMode, mut running: watch::Receiver<bool>) {
    info!("Sampling worker for {} started", mode);

    loop {
        // Flag and snapshot are read under the activation lock so a stop is
        // observed either before this tick or right after it
        let channels = {
            let active = sampler.activation.lock();
            if *running.borrow() {
                Some(active.channels_for(mode))
            } else {
                None
            }
        };
        let Some(channels) = channels else { break };

        if channels.is_empty() {
            warn!("{}: no active sensors this tick", mode);
        }

        let reading = sampler.sample(mode, &channels).await;
        if let Err(e) = sampler.sink.store(&reading).await {
            error!("Failed to store {} reading #{}: {}", mode, reading.sequence, e);
            sampler.bus.publish(EventPayload::SinkFailure { message: e.to_string() });
        } else {
            debug!("Stored {} reading #{} ({})", mode, reading.sequence, reading.quality);
        }
        sampler.bus.publish_reading(reading);

        tokio::select! {
            _ = tokio::time::sleep(sampler.interval) => {}
            changed = running.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("Sampling worker for {} exited", mode);
}

/// Owns the activation set and the worker table for every mode key
pub struct SamplingEngine {
    sampler: Arc<Sampler>,
    workers: Mutex<HashMap<SamplingMode, Worker>>,
    stop_timeout: Duration,
}

impl SamplingEngine {
    /// Build an engine over a finished calibration
    pub fn new(
        config: &Config,
        driver: Arc<dyn ChannelDriver>,
        calibration: CalibrationTable,
        sink: Arc<dyn ReadingSink>,
    ) -> Self {
        let sampler = Sampler {
            reader: RetryingReader::new(driver, &config.reader),
            calibration,
            smoothing: parking_lot::Mutex::new(SmoothingFilter::from_config(&config.sampling)),
            classifier: QualityClassifier::new(&config.classification),
            activation: parking_lot::Mutex::new(ActivationSet::new()),
            sink,
            bus: Arc::new(EventBus::default()),
            interval: config.sampling.interval(),
            sequence: AtomicU64::new(0),
        };

        info!(
            "Sampling engine ready (driver: {}, interval {:?}, policy {:?})",
            sampler.reader.driver().name(),
            sampler.interval,
            sampler.classifier.policy()
        );

        Self {
            sampler: Arc::new(sampler),
            workers: Mutex::new(HashMap::new()),
            stop_timeout: config.sampling.stop_timeout(),
        }
    }

    /// Start sampling in `mode`, stopping any conflicting mode first
    pub async fn start(&self, mode: SamplingMode) -> StartOutcome {
        let mut workers = self.workers.lock().await;

        if workers.get(&mode).is_some_and(Worker::is_live) {
            info!("{} already running", mode);
            return StartOutcome::AlreadyRunning;
        }

        for other in mode.conflicts() {
            self.halt(&mut workers, other).await;
        }
        // Join a leftover handle for this mode before replacing it
        self.halt(&mut workers, mode).await;

        self.sampler.activation.lock().activate(mode);
        let (running, rx) = watch::channel(true);
        let handle = tokio::spawn(run_worker(self.sampler.clone(), mode, rx));
        workers.insert(mode, Worker { running, handle });

        self.sampler.bus.publish(EventPayload::ModeStarted { mode });
        info!("Started {} (active: {:?})", mode, self.active_channels());
        StartOutcome::Started
    }

    pub async fn stop(&self, mode: SamplingMode) -> StopOutcome {
        let mut workers = self.workers.lock().await;
        if self.halt(&mut workers, mode).await {
            info!("Stopped {} (active: {:?})", mode, self.active_channels());
            StopOutcome::Stopped
        } else {
            debug!("{} was not running", mode);
            StopOutcome::NotRunning
        }
    }

    /// Stop every mode and clear the activation set. Returns how many were running.
    pub async fn stop_all(&self) -> usize {
        let mut workers = self.workers.lock().await;
        let mut stopped = 0;
        for mode in SamplingMode::every() {
            if self.halt(&mut workers, mode).await {
                stopped += 1;
            }
        }
        self.sampler.activation.lock().deactivate_all();
        info!("All sensors stopped ({} workers)", stopped);
        stopped
    }

    /// Parse a mode name at the control boundary and start it
    pub async fn start_named(&self, name: &str) -> Result<StartOutcome, EngineError> {
        let mode: SamplingMode = name.parse()?;
        Ok(self.start(mode).await)
    }

    /// Parse a mode name at the control boundary and stop it
    pub async fn stop_named(&self, name: &str) -> Result<StopOutcome, EngineError> {
        let mode: SamplingMode = name.parse()?;
        Ok(self.stop(mode).await)
    }

    /// Signal a worker, deactivate its channels and wait a bounded time for
    /// it to exit. Returns whether the worker was live.
    async fn halt(&self, workers: &mut HashMap<SamplingMode, Worker>, mode: SamplingMode) -> bool {
        let Some(worker) = workers.remove(&mode) else {
            return false;
        };
        let was_live = worker.is_live();
        let Worker { running, handle } = worker;

        let _ = running.send(false);
        self.sampler.activation.lock().deactivate(mode);

        match tokio::time::timeout(self.stop_timeout, handle).await {
            Ok(Ok(())) => debug!("{} worker joined", mode),
            Ok(Err(e)) => warn!("{} worker ended abnormally: {}", mode, e),
            Err(_) => warn!(
                "{} worker did not exit within {:?}; detaching it",
                mode, self.stop_timeout
            ),
        }

        if was_live {
            self.sampler.bus.publish(EventPayload::ModeStopped { mode });
        }
        was_live
    }

    pub async fn is_running(&self, mode: SamplingMode) -> bool {
        self.workers.lock().await.get(&mode).is_some_and(Worker::is_live)
    }

    pub async fn running_modes(&self) -> Vec<SamplingMode> {
        let workers = self.workers.lock().await;
        SamplingMode::every()
            .filter(|mode| workers.get(mode).is_some_and(Worker::is_live))
            .collect()
    }

    pub fn is_active(&self, channel: SensorChannel) -> bool {
        self.sampler.activation.lock().is_active(channel)
    }

    pub fn active_channels(&self) -> Vec<SensorChannel> {
        self.sampler.activation.lock().channels()
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.sampler.calibration
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.sampler.bus
    }

    /// Most recent reading from any mode
    pub fn latest(&self) -> Option<Reading> {
        self.sampler.bus.latest()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Reading> {
        self.sampler.bus.subscribe_readings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::QualityLabel;
    use crate::sensors::ScriptedDriver;
    use std::time::Instant;

    #[derive(Default)]
    struct CollectingSink {
        readings: parking_lot::Mutex<Vec<Reading>>,
    }

    impl CollectingSink {
        fn len(&self) -> usize {
            self.readings.lock().len()
        }

        fn snapshot(&self) -> Vec<Reading> {
            self.readings.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl ReadingSink for CollectingSink {
        async fn store(&self, reading: &Reading) -> anyhow::Result<()> {
            self.readings.lock().push(reading.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingSink {
        calls: AtomicU64,
    }

    #[async_trait::async_trait]
    impl ReadingSink for FailingSink {
        async fn store(&self, _reading: &Reading) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("database unavailable")
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.reader.retries = 2;
        config.reader.retry_delay_ms = 1;
        config.sampling.interval_ms = 20;
        config.sampling.stop_timeout_ms = 200;
        config
    }

    fn steady_driver() -> Arc<ScriptedDriver> {
        let driver = Arc::new(ScriptedDriver::new());
        for channel in SensorChannel::ALL {
            driver.set_steady(channel, 1.0);
        }
        driver
    }

    fn engine_with(driver: Arc<ScriptedDriver>, sink: Arc<dyn ReadingSink>) -> SamplingEngine {
        let config = test_config();
        let calibration = CalibrationTable::from_ro(&config.sensors, [1.0; 4], 1.0);
        SamplingEngine::new(&config, driver, calibration, sink)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_start_twice_is_idempotent() {
        let engine = engine_with(steady_driver(), Arc::new(CollectingSink::default()));

        assert_eq!(engine.start(SamplingMode::All).await, StartOutcome::Started);
        assert_eq!(engine.start(SamplingMode::All).await, StartOutcome::AlreadyRunning);
        assert_eq!(engine.running_modes().await, vec![SamplingMode::All]);

        engine.stop_all().await;
    }

    #[tokio::test]
    async fn test_all_and_single_modes_exclude_each_other() {
        let engine = engine_with(steady_driver(), Arc::new(CollectingSink::default()));
        let mq135 = SamplingMode::Single(SensorChannel::Mq135);
        let mq2 = SamplingMode::Single(SensorChannel::Mq2);

        engine.start(mq135).await;
        engine.start(SamplingMode::All).await;
        assert!(!engine.is_running(mq135).await);
        assert!(SensorChannel::ALL.iter().all(|c| engine.is_active(*c)));
        assert_eq!(engine.running_modes().await, vec![SamplingMode::All]);

        engine.start(mq2).await;
        assert!(!engine.is_running(SamplingMode::All).await);
        assert_eq!(engine.active_channels(), vec![SensorChannel::Mq2]);
        assert_eq!(engine.running_modes().await, vec![mq2]);

        engine.stop_all().await;
        assert!(engine.active_channels().is_empty());
    }

    #[tokio::test]
    async fn test_readings_reach_sink_and_subscribers() {
        let sink = Arc::new(CollectingSink::default());
        let engine = engine_with(steady_driver(), sink.clone());
        let mut stream = engine.subscribe();

        engine.start(SamplingMode::All).await;
        assert!(wait_for(|| sink.len() >= 2).await);
        engine.stop(SamplingMode::All).await;

        let streamed = stream.recv().await.unwrap();
        assert_eq!(streamed.sequence, 1);

        for reading in sink.snapshot() {
            assert_eq!(reading.mode, SamplingMode::All);
            assert_eq!(reading.values.len(), 4);
            assert!(reading.values.values().all(|v| (0.0..=5.0).contains(v)));
            assert_ne!(reading.quality, QualityLabel::Unknown);
        }
        assert!(engine.latest().is_some());
    }

    #[tokio::test]
    async fn test_single_mode_samples_only_its_channel() {
        let sink = Arc::new(CollectingSink::default());
        let driver = steady_driver();
        let engine = engine_with(driver.clone(), sink.clone());

        engine.start(SamplingMode::Single(SensorChannel::Mq7)).await;
        assert!(wait_for(|| sink.len() >= 1).await);
        engine.stop_all().await;

        let reading = &sink.snapshot()[0];
        assert_eq!(reading.values.keys().copied().collect::<Vec<_>>(), vec![SensorChannel::Mq7]);
        assert_eq!(driver.calls(SensorChannel::Mq2), 0);
    }

    #[tokio::test]
    async fn test_failed_channel_records_zero() {
        let sink = Arc::new(CollectingSink::default());
        let driver = Arc::new(ScriptedDriver::new());
        driver.set_steady(SensorChannel::Mq135, 1.0);
        let engine = engine_with(driver, sink.clone());

        engine.start(SamplingMode::All).await;
        assert!(wait_for(|| sink.len() >= 1).await);
        engine.stop_all().await;

        let reading = &sink.snapshot()[0];
        assert_eq!(reading.value(SensorChannel::Mq2), Some(0.0));
        assert!(reading.value(SensorChannel::Mq135).unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_worker() {
        let sink = Arc::new(FailingSink::default());
        let engine = engine_with(steady_driver(), sink.clone());

        engine.start(SamplingMode::All).await;
        assert!(wait_for(|| sink.calls.load(Ordering::Relaxed) >= 3).await);
        assert!(engine.is_running(SamplingMode::All).await);
        engine.stop_all().await;
    }

    #[tokio::test]
    async fn test_smoothing_history_survives_restart() {
        let sink = Arc::new(CollectingSink::default());
        let driver = Arc::new(ScriptedDriver::new());
        driver.set_steady(SensorChannel::Mq4, 0.5);
        let engine = engine_with(driver.clone(), sink.clone());
        let mq4 = SamplingMode::Single(SensorChannel::Mq4);

        engine.start(mq4).await;
        assert!(wait_for(|| sink.len() >= 2).await);
        engine.stop(mq4).await;

        let before = sink.snapshot();
        let held = before[0].value(SensorChannel::Mq4).unwrap();
        assert!(held > 0.1);

        driver.set_steady(SensorChannel::Mq4, 3.0);
        let fresh = engine.calibration().normalize(SensorChannel::Mq4, 3.0);
        assert!(fresh < 0.01);

        engine.start(mq4).await;
        assert!(wait_for(|| sink.len() > before.len()).await);
        engine.stop_all().await;

        let kept = before.len().min(9) as f64;
        let expected = (kept * held + fresh) / (kept + 1.0);
        let first_after = sink.snapshot()[before.len()].value(SensorChannel::Mq4).unwrap();
        assert!((first_after - expected).abs() < 1e-9);
        assert!(first_after > fresh + 0.1);
    }

    #[tokio::test]
    async fn test_stop_is_bounded_for_unresponsive_worker() {
        let driver = steady_driver();
        driver.set_latency(Duration::from_secs(2));
        let engine = engine_with(driver, Arc::new(CollectingSink::default()));

        engine.start(SamplingMode::All).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let started = Instant::now();
        assert_eq!(engine.stop(SamplingMode::All).await, StopOutcome::Stopped);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!engine.is_running(SamplingMode::All).await);

        assert_eq!(engine.start(SamplingMode::All).await, StartOutcome::Started);
    }

    #[tokio::test]
    async fn test_control_boundary_names() {
        let engine = engine_with(steady_driver(), Arc::new(CollectingSink::default()));

        assert_eq!(engine.start_named("mq9").await, Err(EngineError::UnknownMode("mq9".to_string())));
        assert_eq!(engine.stop_named("mq4").await, Ok(StopOutcome::NotRunning));
        assert_eq!(engine.start_named("MQ4").await, Ok(StartOutcome::Started));
        assert_eq!(engine.stop_named("mq4").await, Ok(StopOutcome::Stopped));
        assert_eq!(engine.stop_all().await, 0);
        assert_eq!(
            StartOutcome::AlreadyRunning.message(SamplingMode::Single(SensorChannel::Mq4)),
            "Sensor MQ4 is already running"
        );
    }
}

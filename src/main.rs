// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! E-Nose - gas sensor acquisition service
//!
//! Calibrates the four MQ sensors in clean air, then samples them in the
//! configured modes until interrupted, storing every labelled reading.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use enose::core::DiscardSink;
use enose::sensors::SimulatedDriver;
use enose::{Calibrator, ChannelDriver, Config, Database, ReadingSink, SamplingEngine, SamplingMode, VERSION};

/// E-Nose - gas sensor acquisition service
#[derive(Parser, Debug)]
#[command(name = "enose")]
#[command(version = VERSION)]
#[command(about = "Gas sensor acquisition, calibration and air quality classification")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with simulated sensors
    #[arg(long)]
    demo: bool,

    /// Sampling mode to start (mq135, mq2, mq4, mq7 or all); repeatable
    #[arg(short, long = "mode")]
    modes: Vec<SamplingMode>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Print every reading to stdout as a JSON line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let config_existed = config_path.exists();
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let filter = if args.trace {
        EnvFilter::new("trace")
    } else if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("E-Nose v{} starting", VERSION);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(data_dir) = args.data_dir {
        config.database.path = data_dir.join("enose.db");
        config.data_dir = data_dir;
    }
    if !args.modes.is_empty() {
        config.sampling.startup_modes = args.modes;
    }

    // Config is read before the subscriber exists, so report it here
    if config_existed {
        info!("Configuration loaded from {:?}", config_path);
    } else {
        info!("Default configuration written to {:?}", config_path);
    }
    info!("Demo mode: {}", config.demo_mode);

    let driver = open_driver(&config)?;

    // Ro must exist before any worker reads a channel
    let calibration = Calibrator::new(driver.clone(), config.sensors.clone(), config.calibration.clone())
        .run()
        .await;

    let sink: Arc<dyn ReadingSink> = if config.database.enabled {
        let db = Arc::new(Database::open(&config.database)?);
        for cal in calibration.iter() {
            if let Err(e) = db.store_calibration(cal) {
                warn!("Could not store calibration for {}: {}", cal.channel, e);
            }
        }
        db
    } else {
        warn!("Database disabled; readings will not be stored");
        Arc::new(DiscardSink)
    };

    let engine = SamplingEngine::new(&config, driver, calibration, sink);

    if args.json {
        let mut readings = engine.subscribe();
        tokio::spawn(async move {
            loop {
                match readings.recv().await {
                    Ok(reading) => match serde_json::to_string(&reading) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Could not encode reading {}: {}", reading.sequence, e),
                    },
                    Err(RecvError::Lagged(skipped)) => warn!("JSON output lagged, skipped {} readings", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
    for mode in &config.sampling.startup_modes {
        let outcome = engine.start(*mode).await;
        info!("{}", outcome.message(*mode));
    }

    info!("Sampling; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, stopping sensors...");
    engine.stop_all().await;
    info!("E-Nose shutdown complete");

    Ok(())
}

fn open_driver(config: &Config) -> Result<Arc<dyn ChannelDriver>> {
    if config.demo_mode {
        info!("Using simulated sensors");
        return Ok(Arc::new(SimulatedDriver::new()));
    }

    #[cfg(feature = "hardware")]
    {
        Ok(Arc::new(enose::sensors::Ads1115Driver::open(&config.sensors)?))
    }

    #[cfg(not(feature = "hardware"))]
    {
        anyhow::bail!("Hardware feature not enabled. Build with --features hardware or use --demo")
    }
}

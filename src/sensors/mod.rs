//! Sensor module - channel drivers, retrying reads and calibration

mod traits;
mod reader;
mod calibration;
mod simulator;

#[cfg(feature = "hardware")]
mod ads1115;

pub use traits::{ChannelDriver, ReadError, SamplingMode, SensorChannel};
pub use reader::{RetryingReader, VoltageSample};
pub use calibration::{
    baseline_resistance, CalibrationTable, Calibrator, ChannelCalibration, Circuit, NORMALIZED_MAX,
};
pub use simulator::{ScriptedDriver, SimulatedDriver};

#[cfg(feature = "hardware")]
pub use ads1115::Ads1115Driver;

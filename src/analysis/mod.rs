//! Analysis module - signal conditioning

mod smoothing;

pub use smoothing::SmoothingFilter;

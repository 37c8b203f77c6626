//! Detection module - air quality classification

mod classification;

pub use classification::{QualityClassifier, QualityLabel};

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Air quality classification

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{AverageBands, ChannelThresholds, ClassificationConfig, ClassificationPolicy};
use crate::sensors::SensorChannel;

/// Coarse quality label attached to each reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityLabel {
    // Per-channel threshold policy
    Good,
    Medium,
    Bad,

    // Average-value policy
    LowIntensity,
    MediumIntensity,
    HighIntensity,

    /// No active channel had a value
    Unknown,
}

impl QualityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Good => "Good",
            QualityLabel::Medium => "Medium",
            QualityLabel::Bad => "Bad",
            QualityLabel::LowIntensity => "Low intensity",
            QualityLabel::MediumIntensity => "Medium intensity",
            QualityLabel::HighIntensity => "High intensity",
            QualityLabel::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            QualityLabel::Good,
            QualityLabel::Medium,
            QualityLabel::Bad,
            QualityLabel::LowIntensity,
            QualityLabel::MediumIntensity,
            QualityLabel::HighIntensity,
            QualityLabel::Unknown,
        ]
        .into_iter()
        .find(|label| label.as_str() == s)
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless mapping from channel values to a quality label
#[derive(Debug, Clone)]
pub struct QualityClassifier {
    policy: ClassificationPolicy,
    thresholds: ChannelThresholds,
    bands: AverageBands,
}

impl QualityClassifier {
    pub fn new(config: &ClassificationConfig) -> Self {
        Self {
            policy: config.policy,
            thresholds: config.thresholds.clone(),
            bands: config.average_bands,
        }
    }

    pub fn policy(&self) -> ClassificationPolicy {
        self.policy
    }

    pub fn classify(&self, values: &BTreeMap<SensorChannel, f64>) -> QualityLabel {
        if values.is_empty() {
            return QualityLabel::Unknown;
        }
        match self.policy {
            ClassificationPolicy::PerChannel => self.classify_per_channel(values),
            ClassificationPolicy::Average => self.classify_average(values),
        }
    }

    /// Good only if every channel is below its good bound, Medium only if
    /// every channel is below its medium bound, otherwise Bad
    fn classify_per_channel(&self, values: &BTreeMap<SensorChannel, f64>) -> QualityLabel {
        let mut good = true;
        let mut medium = true;

        for (&channel, &value) in values {
            let threshold = self.thresholds.get(channel);
            if value >= threshold.medium_below {
                good = false;
                medium = false;
            } else if value >= threshold.good_below {
                good = false;
            }
        }

        if good {
            QualityLabel::Good
        } else if medium {
            QualityLabel::Medium
        } else {
            QualityLabel::Bad
        }
    }

    fn classify_average(&self, values: &BTreeMap<SensorChannel, f64>) -> QualityLabel {
        let mean = values.values().sum::<f64>() / values.len() as f64;
        if mean < self.bands.medium_from {
            QualityLabel::LowIntensity
        } else if mean < self.bands.high_from {
            QualityLabel::MediumIntensity
        } else {
            QualityLabel::HighIntensity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SensorChannel::*;

    fn values(pairs: &[(SensorChannel, f64)]) -> BTreeMap<SensorChannel, f64> {
        pairs.iter().copied().collect()
    }

    fn classifier(policy: ClassificationPolicy) -> QualityClassifier {
        QualityClassifier::new(&ClassificationConfig { policy, ..Default::default() })
    }

    #[test]
    fn test_per_channel_good_medium_bad() {
        let c = classifier(ClassificationPolicy::PerChannel);

        let clean = values(&[(Mq135, 1.0), (Mq2, 1.0), (Mq4, 1.0), (Mq7, 0.5)]);
        assert_eq!(c.classify(&clean), QualityLabel::Good);

        assert_eq!(c.classify(&values(&[(Mq135, 4.5)])), QualityLabel::Bad);
        assert_eq!(c.classify(&values(&[(Mq135, 2.0)])), QualityLabel::Medium);
        assert_eq!(c.classify(&values(&[(Mq2, 1.0), (Mq7, 1.2)])), QualityLabel::Medium);
        assert_eq!(c.classify(&values(&[(Mq2, 1.6), (Mq7, 3.0)])), QualityLabel::Bad);
    }

    #[test]
    fn test_inactive_channels_are_skipped() {
        let c = classifier(ClassificationPolicy::PerChannel);
        // mq7 would fail at 1.5 but mq2 at 1.4 is still good
        assert_eq!(c.classify(&values(&[(Mq2, 1.4)])), QualityLabel::Good);
    }

    #[test]
    fn test_no_values_is_unknown() {
        let empty = BTreeMap::new();
        assert_eq!(classifier(ClassificationPolicy::PerChannel).classify(&empty), QualityLabel::Unknown);
        assert_eq!(classifier(ClassificationPolicy::Average).classify(&empty), QualityLabel::Unknown);
    }

    #[test]
    fn test_average_bands() {
        let c = classifier(ClassificationPolicy::Average);
        assert_eq!(c.classify(&values(&[(Mq135, 1.0), (Mq2, 2.9)])), QualityLabel::LowIntensity);
        assert_eq!(c.classify(&values(&[(Mq135, 2.0)])), QualityLabel::MediumIntensity);
        assert_eq!(c.classify(&values(&[(Mq4, 3.0), (Mq7, 4.0)])), QualityLabel::HighIntensity);
    }

    #[test]
    fn test_label_round_trips_through_str() {
        assert_eq!(QualityLabel::parse("Medium intensity"), Some(QualityLabel::MediumIntensity));
        assert_eq!(QualityLabel::parse("bogus"), None);
    }
}

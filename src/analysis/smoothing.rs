// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Moving-average smoothing for noisy channels

use std::collections::VecDeque;

use crate::config::SamplingConfig;
use crate::sensors::SensorChannel;

/// Fixed-window moving average over designated channels
///
/// History is kept per channel for the lifetime of the filter and is not
/// cleared when sampling stops and restarts.
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    window: usize,
    smoothed: [bool; 4],
    history: [VecDeque<f64>; 4],
}

impl SmoothingFilter {
    pub fn new(window: usize, channels: &[SensorChannel]) -> Self {
        let window = window.max(1);
        let mut smoothed = [false; 4];
        for channel in channels {
            smoothed[channel.index()] = true;
        }
        Self {
            window,
            smoothed,
            history: std::array::from_fn(|_| VecDeque::with_capacity(window)),
        }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(config.smoothing_window, &config.smoothed_channels)
    }

    pub fn is_smoothed(&self, channel: SensorChannel) -> bool {
        self.smoothed[channel.index()]
    }

    /// Record `value` and return the smoothed value for the channel
    pub fn apply(&mut self, channel: SensorChannel, value: f64) -> f64 {
        if !self.is_smoothed(channel) {
            return value;
        }

        let history = &mut self.history[channel.index()];
        if history.len() == self.window {
            history.pop_front();
        }
        history.push_back(value);

        history.iter().sum::<f64>() / history.len() as f64
    }

    #[cfg(test)]
    fn buffered(&self, channel: SensorChannel) -> usize {
        self.history[channel.index()].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eleventh_value_evicts_oldest() {
        let mut filter = SmoothingFilter::new(10, &[SensorChannel::Mq4, SensorChannel::Mq7]);

        let mut last = 0.0;
        for v in 1..=11 {
            last = filter.apply(SensorChannel::Mq4, v as f64);
        }

        let expected = (2..=11).sum::<i32>() as f64 / 10.0;
        assert!((last - expected).abs() < 1e-12);
        assert_eq!(filter.buffered(SensorChannel::Mq4), 10);
    }

    #[test]
    fn test_partial_window_averages_what_it_has() {
        let mut filter = SmoothingFilter::new(10, &[SensorChannel::Mq7]);
        assert_eq!(filter.apply(SensorChannel::Mq7, 4.0), 4.0);
        assert_eq!(filter.apply(SensorChannel::Mq7, 2.0), 3.0);
    }

    #[test]
    fn test_other_channels_pass_through() {
        let mut filter = SmoothingFilter::new(10, &[SensorChannel::Mq4]);
        filter.apply(SensorChannel::Mq135, 1.0);
        assert_eq!(filter.apply(SensorChannel::Mq135, 3.0), 3.0);
        assert_eq!(filter.buffered(SensorChannel::Mq135), 0);
    }

    #[test]
    fn test_channels_do_not_share_history() {
        let mut filter = SmoothingFilter::new(10, &[SensorChannel::Mq4, SensorChannel::Mq7]);
        filter.apply(SensorChannel::Mq4, 5.0);
        assert_eq!(filter.apply(SensorChannel::Mq7, 1.0), 1.0);
        assert_eq!(filter.buffered(SensorChannel::Mq4), 1);
    }
}

//! Per-topic producers
//!
//! A producer owns the rolling observation window for one sensor topic and
//! reduces it to a weighted influence contribution per target parameter.
//! Windows are bounded by the producer's analysis interval: every retained
//! observation is younger than `now - analysis_interval` after each ingest.

use crate::classifier::ClassifierKind;
use crate::config::{ProducerConfig, ProducerPatch};
use crate::error::EngineError;
use crate::types::Observation;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

/// Rolling-window state for one sensor topic.
#[derive(Debug, Clone)]
pub struct Producer {
    topic: String,
    window: VecDeque<Observation>,
    analysis_interval: Duration,
    threshold: f64,
    classifier: ClassifierKind,
    weights: HashMap<String, f64>,
}

impl Producer {
    /// Build a producer from validated configuration. An empty weight map is
    /// a configuration error: a producer with no target parameter is dead
    /// wiring.
    pub fn from_config(config: ProducerConfig) -> Result<Self, EngineError> {
        if config.weights.is_empty() {
            return Err(EngineError::EmptyWeightMap(config.topic));
        }
        let analysis_interval = seconds_to_duration(&config.topic, config.analysis_interval)?;
        Ok(Self {
            topic: config.topic,
            window: VecDeque::new(),
            analysis_interval,
            threshold: config.threshold,
            classifier: config.classifier,
            weights: config.weights,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn analysis_interval(&self) -> Duration {
        self.analysis_interval
    }

    pub fn weights(&self) -> &HashMap<String, f64> {
        &self.weights
    }

    /// Current window contents, oldest first.
    pub fn window(&self) -> impl Iterator<Item = &Observation> {
        self.window.iter()
    }

    /// Append an observation and evict everything older than the analysis
    /// interval. O(window size) per call.
    pub fn ingest(&mut self, observation: Observation, now: DateTime<Utc>) {
        self.window.push_back(observation);
        let cutoff = now - self.analysis_interval;
        self.window.retain(|obs| obs.timestamp >= cutoff);
    }

    /// Reduce the current window to a signed signal.
    pub fn classify(&self) -> i8 {
        self.classifier.classify(&self.window, self.threshold)
    }

    /// Weighted fan-out of the classification result. A neutral
    /// classification yields zero influence on every target regardless of
    /// weight sign.
    pub fn produce_influence(&self) -> HashMap<String, f64> {
        let signal = self.classify();
        self.weights
            .iter()
            .map(|(parameter, weight)| {
                let value = if signal == 0 {
                    0.0
                } else {
                    f64::from(signal) * weight
                };
                (parameter.clone(), value)
            })
            .collect()
    }

    /// Overwrite only the fields present in the patch.
    pub fn apply_patch(&mut self, patch: ProducerPatch) -> Result<(), EngineError> {
        if let Some(seconds) = patch.analysis_interval {
            self.analysis_interval = seconds_to_duration(&self.topic, seconds)?;
        }
        if let Some(threshold) = patch.threshold {
            self.threshold = threshold;
        }
        if let Some(weights) = patch.weights {
            if weights.is_empty() {
                return Err(EngineError::EmptyWeightMap(self.topic.clone()));
            }
            self.weights = weights;
        }
        Ok(())
    }

    /// Static configuration view for operator listings.
    pub fn descriptor(&self) -> ProducerConfig {
        ProducerConfig {
            topic: self.topic.clone(),
            analysis_interval: self.analysis_interval.num_milliseconds() as f64 / 1000.0,
            threshold: self.threshold,
            classifier: self.classifier.clone(),
            weights: self.weights.clone(),
        }
    }
}

/// Convert a configured interval in seconds into a duration, rejecting
/// non-positive or non-finite values at load time.
pub(crate) fn seconds_to_duration(name: &str, seconds: f64) -> Result<Duration, EngineError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(EngineError::InvalidInterval {
            name: name.to_string(),
            seconds,
        });
    }
    Ok(Duration::milliseconds((seconds * 1000.0).round() as i64))
}

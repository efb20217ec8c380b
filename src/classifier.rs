//! Window classifiers
//!
//! This module reduces a producer's rolling window to a small signed signal:
//! - Trend: least-squares slope of a scalar series against a threshold
//! - Event-sum: cumulative signed codes for categorical affect labels
//! - Spike: local maxima/minima detection with separation and prominence
//!
//! Classification never fails: insufficient or non-numeric data degrades to
//! a neutral (0) signal. Unknown classifier kinds are rejected when the
//! configuration is loaded, not here.

use crate::types::{Observation, ObservationValue};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Slopes whose magnitude exceeds this multiple of the configured threshold
/// are treated as sensor artifacts and classified as neutral.
pub const OUTLIER_SLOPE_MULTIPLIER: f64 = 5.0;

/// Default minimum sample count before the trend classifier reports a signal
pub const DEFAULT_TREND_MIN_SAMPLES: usize = 10;

/// Default minimum index distance between two reported spikes
pub const DEFAULT_SPIKE_MIN_SEPARATION: usize = 2;

/// Default minimum prominence for a spike to qualify
pub const DEFAULT_SPIKE_MIN_PROMINENCE: f64 = 10.0;

fn default_trend_min_samples() -> usize {
    DEFAULT_TREND_MIN_SAMPLES
}

fn default_spike_min_separation() -> usize {
    DEFAULT_SPIKE_MIN_SEPARATION
}

fn default_spike_min_prominence() -> f64 {
    DEFAULT_SPIKE_MIN_PROMINENCE
}

/// Closed set of window classifiers, resolved once at configuration load.
///
/// Deserializing an unknown `kind` is a configuration error and prevents the
/// process from starting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Fit one linear segment over (index, value) pairs and compare its slope
    /// against the producer threshold.
    Trend {
        #[serde(default = "default_trend_min_samples")]
        min_samples: usize,
    },
    /// Sum signed codes for categorical labels over the whole window and
    /// report a binary event when the sum falls below the producer threshold.
    EventSum {
        /// Label-to-code overrides; the built-in facial affect map is used
        /// when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        codes: Option<HashMap<String, i64>>,
    },
    /// Detect local maxima and minima subject to a minimum sample separation
    /// and a minimum prominence.
    Spike {
        #[serde(default = "default_spike_min_separation")]
        min_separation: usize,
        #[serde(default = "default_spike_min_prominence")]
        min_prominence: f64,
    },
}

impl ClassifierKind {
    /// Reduce a window to a signed signal. `threshold` is the owning
    /// producer's configured threshold.
    pub fn classify(&self, window: &VecDeque<Observation>, threshold: f64) -> i8 {
        match self {
            ClassifierKind::Trend { min_samples } => {
                classify_trend(&scalar_series(window), threshold, *min_samples)
            }
            ClassifierKind::EventSum { codes } => {
                classify_event_sum(label_series(window), threshold, codes.as_ref())
            }
            ClassifierKind::Spike {
                min_separation,
                min_prominence,
            } => classify_spikes(&scalar_series(window), *min_separation, *min_prominence),
        }
    }
}

/// Signed codes for facial affect labels: positive affect counts up,
/// negative-affect categories count down, neutral contributes nothing.
pub fn affect_code(label: &str) -> i64 {
    match label {
        "happy" => 1,
        "neutral" => 0,
        "angry" | "fear" | "sad" | "disgust" | "surprise" => -1,
        _ => 0,
    }
}

fn scalar_series(window: &VecDeque<Observation>) -> Vec<f64> {
    window
        .iter()
        .filter_map(|obs| obs.value.as_scalar())
        .collect()
}

fn label_series(window: &VecDeque<Observation>) -> impl Iterator<Item = &str> {
    window.iter().filter_map(|obs| match &obs.value {
        ObservationValue::Categorical(label) => Some(label.as_str()),
        ObservationValue::Scalar(_) => None,
    })
}

/// Trend classification: +1 / -1 when the fitted slope exceeds the threshold
/// in either direction, 0 below the sample floor or when the slope magnitude
/// is past the outlier clip.
pub fn classify_trend(series: &[f64], threshold: f64, min_samples: usize) -> i8 {
    let n = series.len();
    if n < min_samples || n < 2 {
        return 0;
    }

    let slope = match fit_slope(series) {
        Some(slope) => slope,
        None => return 0,
    };

    if slope.abs() > OUTLIER_SLOPE_MULTIPLIER * threshold {
        // Sensor artifact: a jump this steep is not a behavioral trend
        return 0;
    }

    if slope > threshold {
        1
    } else if slope < -threshold {
        -1
    } else {
        0
    }
}

/// Least-squares slope of the single best-fit segment over (index, value).
fn fit_slope(series: &[f64]) -> Option<f64> {
    let n = series.len() as f64;
    let sum_x: f64 = (0..series.len()).map(|i| i as f64).sum();
    let sum_y: f64 = series.iter().sum();
    let sum_xy: f64 = series.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..series.len()).map(|i| (i as f64).powi(2)).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }
    Some((n * sum_xy - sum_x * sum_y) / denominator)
}

/// Event-sum classification: 1 iff the summed codes are strictly below the
/// threshold (cumulative negative affect has exceeded tolerance), else 0.
/// The result depends only on the multiset of labels in the window.
pub fn classify_event_sum<'a>(
    labels: impl Iterator<Item = &'a str>,
    threshold: f64,
    codes: Option<&HashMap<String, i64>>,
) -> i8 {
    let running_sum: i64 = labels
        .map(|label| match codes {
            Some(map) => map.get(label).copied().unwrap_or(0),
            None => affect_code(label),
        })
        .sum();

    if (running_sum as f64) < threshold {
        1
    } else {
        0
    }
}

/// Spike classification: +1 when only qualifying maxima exist, -1 when only
/// qualifying minima exist, 0 when both (ambiguous) or neither are present.
pub fn classify_spikes(series: &[f64], min_separation: usize, min_prominence: f64) -> i8 {
    let maxima = !find_peaks(series, min_separation, min_prominence).is_empty();
    let negated: Vec<f64> = series.iter().map(|v| -v).collect();
    let minima = !find_peaks(&negated, min_separation, min_prominence).is_empty();

    match (maxima, minima) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => -1,
        (false, false) => 0,
    }
}

/// Indices of local maxima with at least `min_prominence` above the
/// surrounding terrain, thinned so that no two kept peaks are closer than
/// `min_separation` samples. Taller peaks win ties.
fn find_peaks(series: &[f64], min_separation: usize, min_prominence: f64) -> Vec<usize> {
    let mut candidates: Vec<usize> = Vec::new();
    for i in 1..series.len().saturating_sub(1) {
        if series[i] > series[i - 1]
            && series[i] > series[i + 1]
            && prominence(series, i) >= min_prominence
        {
            candidates.push(i);
        }
    }

    candidates.sort_by(|a, b| {
        series[*b]
            .partial_cmp(&series[*a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<usize> = Vec::new();
    for candidate in candidates {
        let separated = kept
            .iter()
            .all(|peak| candidate.abs_diff(*peak) >= min_separation);
        if separated {
            kept.push(candidate);
        }
    }
    kept.sort_unstable();
    kept
}

/// Height of a peak above the higher of the two valley floors reached before
/// the terrain rises back above the peak (or the window edge).
fn prominence(series: &[f64], peak: usize) -> f64 {
    let height = series[peak];

    let mut left_min = height;
    for value in series[..peak].iter().rev() {
        if *value >= height {
            break;
        }
        left_min = left_min.min(*value);
    }

    let mut right_min = height;
    for value in series[peak + 1..].iter() {
        if *value >= height {
            break;
        }
        right_min = right_min.min(*value);
    }

    height - left_min.max(right_min)
}

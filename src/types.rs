//! Core types for the Attune engine
//!
//! This module defines the data structures that flow through the engine:
//! ingested observations, per-cycle decisions, actuation requests, and the
//! operator-facing observability snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A single sensor reading value: numeric for scalar streams (gaze, distance,
/// heart rate, blinks), categorical for label streams (facial affect).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    Scalar(f64),
    Categorical(String),
}

impl ObservationValue {
    /// Numeric view of the value, `None` for categorical readings.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ObservationValue::Scalar(v) => Some(*v),
            ObservationValue::Categorical(_) => None,
        }
    }

    /// Label view of the value, `None` for scalar readings.
    pub fn as_label(&self) -> Option<&str> {
        match self {
            ObservationValue::Scalar(_) => None,
            ObservationValue::Categorical(label) => Some(label.as_str()),
        }
    }
}

impl From<f64> for ObservationValue {
    fn from(v: f64) -> Self {
        ObservationValue::Scalar(v)
    }
}

impl From<&str> for ObservationValue {
    fn from(label: &str) -> Self {
        ObservationValue::Categorical(label.to_string())
    }
}

/// One timestamped sensor reading, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// When the reading was taken (UTC)
    pub timestamp: DateTime<Utc>,
    /// Scalar or categorical reading
    pub value: ObservationValue,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: impl Into<ObservationValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// Wire form of an ingested reading as delivered by sensor processors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMessage {
    /// Source topic (e.g. "heartrate", "operator/distance")
    pub topic: String,
    /// Scalar or categorical reading
    pub value: ObservationValue,
    /// Reading timestamp (ISO-8601)
    pub timestamp: DateTime<Utc>,
    /// Delivery identifier, generated when the sender omits it
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
}

impl IngestMessage {
    /// Split the message into its routing topic and the retained observation.
    pub fn into_parts(self) -> (String, Observation) {
        let observation = Observation {
            timestamp: self.timestamp,
            value: self.value,
        };
        (self.topic, observation)
    }
}

/// Outcome of one ingestion call, mirrored to the caller's acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    /// No producer is configured for the topic; acknowledged as a no-op
    NoProducer,
    /// Window updated, debounce interval not yet elapsed
    Accepted,
    /// Window updated and a full aggregation pass ran
    Analyzed,
}

/// Three-way hysteresis decision for one modality in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Increase,
    Decrease,
    Neutral,
}

impl Decision {
    pub fn is_neutral(&self) -> bool {
        matches!(self, Decision::Neutral)
    }
}

/// HTTP verb used for an actuation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[default]
    #[serde(rename = "POST")]
    Post,
}

/// One outbound actuation call, fully resolved from modality configuration.
///
/// GET requests carry no body; POST requests may carry an optional JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuationRequest {
    pub url: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Per-producer window contents as captured at the last non-neutral cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub topic: String,
    pub observations: Vec<Observation>,
}

/// Last published engine state: window contents from the most recent cycle in
/// which at least one modality left neutral, plus the static weight wiring.
///
/// Cycles where every modality resolves to neutral leave the window portion
/// stale; observability queries still succeed with the previous capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySnapshot {
    /// Engine instance that produced the capture
    pub instance_id: Uuid,
    /// When the capture was taken (UTC), `None` before the first capture
    pub captured_at: Option<DateTime<Utc>>,
    /// Per-topic window contents, empty until a non-neutral cycle has run
    pub windows: Vec<WindowSnapshot>,
    /// Static wiring: modality name -> {topic: weight}
    pub influences: HashMap<String, HashMap<String, f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_observation_value_untagged_roundtrip() {
        let scalar: ObservationValue = serde_json::from_str("71.5").unwrap();
        assert_eq!(scalar, ObservationValue::Scalar(71.5));

        let label: ObservationValue = serde_json::from_str("\"happy\"").unwrap();
        assert_eq!(label, ObservationValue::Categorical("happy".to_string()));
    }

    #[test]
    fn test_ingest_message_generates_id_when_absent() {
        let msg: IngestMessage = serde_json::from_str(
            r#"{"topic": "heartrate", "value": 72.0, "timestamp": "2024-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.topic, "heartrate");
        assert_eq!(msg.value.as_scalar(), Some(72.0));
    }

    #[test]
    fn test_http_method_serialized_as_verb() {
        assert_eq!(serde_json::to_string(&HttpMethod::Get).unwrap(), "\"GET\"");
        let method: HttpMethod = serde_json::from_str("\"POST\"").unwrap();
        assert_eq!(method, HttpMethod::Post);
    }

    #[test]
    fn test_scalar_and_label_views() {
        let v = ObservationValue::Scalar(3.0);
        assert_eq!(v.as_scalar(), Some(3.0));
        assert_eq!(v.as_label(), None);

        let v = ObservationValue::from("sad");
        assert_eq!(v.as_scalar(), None);
        assert_eq!(v.as_label(), Some("sad"));
    }
}

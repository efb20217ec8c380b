//! Aggregation and orchestration
//!
//! The engine owns every producer and modality plus the debounce clock; all
//! state lives inside this one context and is mutated through `&mut self`,
//! so exactly one ingestion-or-aggregation operation runs at a time.
//!
//! Aggregation is ingestion-triggered ("lazy"): an arriving observation
//! feeds its producer's window, and only when the debounce clock has elapsed
//! does one full pass over all modalities run. A topic that never reports
//! again will never retroactively trigger an overdue pass.

use crate::config::{EngineConfig, ModalityConfig, ModalityPatch, ProducerConfig, ProducerPatch};
use crate::dispatch::ActuationClient;
use crate::error::EngineError;
use crate::modality::Modality;
use crate::producer::{seconds_to_duration, Producer};
use crate::types::{
    Decision, IngestMessage, IngestOutcome, ObservabilitySnapshot, WindowSnapshot,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Signal-fusion engine: producer registry, modality registry, and the
/// debounce clock, evaluated in configuration order.
pub struct Engine {
    instance_id: Uuid,
    producers: Vec<Producer>,
    topic_index: HashMap<String, usize>,
    modalities: Vec<Modality>,
    debounce_interval: Duration,
    /// Next instant an aggregation pass may start; `None` until the first
    /// trigger
    debounce_until: Option<DateTime<Utc>>,
    /// Window contents captured at the last non-neutral cycle
    last_capture: Option<(DateTime<Utc>, Vec<WindowSnapshot>)>,
}

impl Engine {
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let debounce_interval =
            seconds_to_duration("debounce_interval", config.debounce_interval)?;

        let mut producers = Vec::with_capacity(config.producers.len());
        let mut topic_index = HashMap::new();
        for producer_config in config.producers {
            let producer = Producer::from_config(producer_config)?;
            topic_index.insert(producer.topic().to_string(), producers.len());
            producers.push(producer);
        }

        let mut modalities = Vec::with_capacity(config.modalities.len());
        for modality_config in config.modalities {
            modalities.push(Modality::from_config(modality_config)?);
        }

        Ok(Self {
            instance_id: Uuid::new_v4(),
            producers,
            topic_index,
            modalities,
            debounce_interval,
            debounce_until: None,
            last_capture: None,
        })
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Route one delivered reading to its producer and, if the debounce
    /// interval has elapsed, run a full aggregation pass over all modalities.
    ///
    /// An unmatched topic is acknowledged as a no-op, never an error.
    pub fn ingest(
        &mut self,
        message: IngestMessage,
        now: DateTime<Utc>,
        client: &dyn ActuationClient,
    ) -> IngestOutcome {
        let (topic, observation) = message.into_parts();
        let Some(&index) = self.topic_index.get(&topic) else {
            return IngestOutcome::NoProducer;
        };
        self.producers[index].ingest(observation, now);

        let elapsed = self.debounce_until.map_or(true, |until| now >= until);
        if !elapsed {
            return IngestOutcome::Accepted;
        }
        self.debounce_until = Some(now + self.debounce_interval);
        self.run_aggregation(now, client);
        IngestOutcome::Analyzed
    }

    /// One aggregation pass: sum each modality's influence across all
    /// producers, make the three-way dead-band decision, and dispatch.
    /// Modalities are evaluated in configuration order so cycles are
    /// reproducible. Returns the per-modality decisions of this cycle.
    pub fn run_aggregation(
        &mut self,
        now: DateTime<Utc>,
        client: &dyn ActuationClient,
    ) -> Vec<(String, Decision)> {
        let influences: Vec<HashMap<String, f64>> = self
            .producers
            .iter()
            .map(Producer::produce_influence)
            .collect();

        let mut decisions = Vec::with_capacity(self.modalities.len());
        let mut any_non_neutral = false;

        for modality in &mut self.modalities {
            let sum: f64 = influences
                .iter()
                .filter_map(|influence| influence.get(modality.name()))
                .sum();

            let decision = if sum > modality.threshold() {
                Decision::Increase
            } else if sum < -modality.threshold() {
                Decision::Decrease
            } else {
                Decision::Neutral
            };
            if !decision.is_neutral() {
                any_non_neutral = true;
            }

            info!(modality = %modality.name(), sum, ?decision, "aggregation decision");
            modality.apply(decision, now, client);
            decisions.push((modality.name().to_string(), decision));
        }

        // Influence directed at parameters with no configured modality is
        // dropped here by construction: sums are only built per modality.

        if any_non_neutral {
            self.last_capture = Some((now, self.capture_windows()));
        }
        decisions
    }

    fn capture_windows(&self) -> Vec<WindowSnapshot> {
        self.producers
            .iter()
            .map(|producer| WindowSnapshot {
                topic: producer.topic().to_string(),
                observations: producer.window().cloned().collect(),
            })
            .collect()
    }

    /// Static wiring table: modality name -> {topic: weight}. Weights aimed
    /// at unconfigured parameters do not appear.
    pub fn wiring(&self) -> HashMap<String, HashMap<String, f64>> {
        let mut wiring: HashMap<String, HashMap<String, f64>> = self
            .modalities
            .iter()
            .map(|modality| (modality.name().to_string(), HashMap::new()))
            .collect();
        for producer in &self.producers {
            for (parameter, weight) in producer.weights() {
                if let Some(entry) = wiring.get_mut(parameter) {
                    entry.insert(producer.topic().to_string(), *weight);
                }
            }
        }
        wiring
    }

    /// Operator-facing snapshot: the windows from the last non-neutral cycle
    /// (possibly stale, never an error) plus the current wiring table.
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        let (captured_at, windows) = match &self.last_capture {
            Some((at, windows)) => (Some(*at), windows.clone()),
            None => (None, Vec::new()),
        };
        ObservabilitySnapshot {
            instance_id: self.instance_id,
            captured_at,
            windows,
            influences: self.wiring(),
        }
    }

    pub fn producer_descriptors(&self) -> Vec<ProducerConfig> {
        self.producers.iter().map(Producer::descriptor).collect()
    }

    pub fn modality_descriptors(&self) -> Vec<ModalityConfig> {
        self.modalities.iter().map(Modality::descriptor).collect()
    }

    /// Patch one producer's tuning; absent fields are untouched.
    pub fn patch_producer(&mut self, topic: &str, patch: ProducerPatch) -> Result<(), EngineError> {
        let index = self
            .topic_index
            .get(topic)
            .copied()
            .ok_or_else(|| EngineError::ProducerNotFound(topic.to_string()))?;
        self.producers[index].apply_patch(patch)
    }

    /// Patch one modality's tuning; absent fields are untouched.
    pub fn patch_modality(&mut self, name: &str, patch: ModalityPatch) -> Result<(), EngineError> {
        let modality = self
            .modalities
            .iter_mut()
            .find(|m| m.name() == name)
            .ok_or_else(|| EngineError::ModalityNotFound(name.to_string()))?;
        modality.apply_patch(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REFERENCE_CONFIG;
    use crate::dispatch::testing::RecordingClient;
    use crate::types::ObservationValue;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn message(topic: &str, value: impl Into<ObservationValue>, at: DateTime<Utc>) -> IngestMessage {
        IngestMessage {
            topic: topic.to_string(),
            value: value.into(),
            timestamp: at,
            id: Uuid::new_v4(),
        }
    }

    fn engine_from(toml_text: &str) -> Engine {
        Engine::from_config(EngineConfig::from_toml_str(toml_text).unwrap()).unwrap()
    }

    const CANCELLATION_CONFIG: &str = r#"
debounce_interval = 60.0

[[producers]]
topic = "gaze"
analysis_interval = 60.0
threshold = 0.1
classifier = { kind = "trend", min_samples = 2 }
weights = { speed = 1.0 }

[[producers]]
topic = "distance"
analysis_interval = 60.0
threshold = 0.1
classifier = { kind = "trend", min_samples = 2 }
weights = { speed = -1.0 }

[[modalities]]
name = "speed"
threshold = 0.1
cooldown_duration = 0.5
base_url = "http://robot:5000"
increase = { path = "/increase_speed" }
decrease = { path = "/decrease_speed" }
"#;

    #[test]
    fn test_opposing_influence_cancels_to_neutral() {
        let mut engine = engine_from(CANCELLATION_CONFIG);
        let client = RecordingClient::default();
        let start = base_time();

        // Both producers see the same rising series: both classify +1, but
        // their weights oppose each other on speed
        for i in 0..10 {
            let at = start + Duration::seconds(i);
            engine.ingest(message("gaze", i as f64 * 0.3, at), at, &client);
            engine.ingest(message("distance", i as f64 * 0.3, at), at, &client);
        }

        let decisions = engine.run_aggregation(start + Duration::seconds(10), &client);
        assert_eq!(decisions, vec![("speed".to_string(), Decision::Neutral)]);
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_unmatched_topic_is_acknowledged_noop() {
        let mut engine = engine_from(CANCELLATION_CONFIG);
        let client = RecordingClient::default();
        let now = base_time();

        let outcome = engine.ingest(message("thermal", 1.0, now), now, &client);
        assert_eq!(outcome, IngestOutcome::NoProducer);
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_debounce_gates_aggregation() {
        let config = CANCELLATION_CONFIG.replace("debounce_interval = 60.0", "debounce_interval = 0.1");
        let mut engine = engine_from(&config);
        let client = RecordingClient::default();
        let start = base_time();

        // First ingest triggers immediately and arms the debounce clock
        let outcome = engine.ingest(message("gaze", 1.0, start), start, &client);
        assert_eq!(outcome, IngestOutcome::Analyzed);

        // Within the debounce interval: window updated, no aggregation
        let at = start + Duration::milliseconds(50);
        let outcome = engine.ingest(message("gaze", 2.0, at), at, &client);
        assert_eq!(outcome, IngestOutcome::Accepted);

        // Past the debounce interval: aggregation runs again
        let at = start + Duration::milliseconds(150);
        let outcome = engine.ingest(message("gaze", 3.0, at), at, &client);
        assert_eq!(outcome, IngestOutcome::Analyzed);
    }

    #[test]
    fn test_unmapped_influence_is_dropped() {
        let config = CANCELLATION_CONFIG.replace(
            "weights = { speed = -1.0 }",
            "weights = { warp_factor = -1.0 }",
        );
        let mut engine = engine_from(&config);
        let client = RecordingClient::default();
        let start = base_time();

        for i in 0..10 {
            let at = start + Duration::seconds(i);
            engine.ingest(message("distance", i as f64 * 0.3, at), at, &client);
        }

        // The distance producer classifies +1 but targets a parameter with
        // no modality; nothing reaches the actuator from it. The gaze
        // producer has no data, so speed stays neutral.
        let decisions = engine.run_aggregation(start + Duration::seconds(10), &client);
        assert_eq!(decisions, vec![("speed".to_string(), Decision::Neutral)]);
        assert_eq!(client.request_count(), 0);
        assert!(!engine.wiring()["speed"].contains_key("distance"));
    }

    #[test]
    fn test_modalities_evaluated_in_configuration_order() {
        let mut engine = engine_from(REFERENCE_CONFIG);
        let client = RecordingClient::default();
        let start = base_time();

        // Rising pupil series within one debounce interval: only the first
        // ingest aggregates (over a one-sample window, all neutral), leaving
        // every cooldown untouched
        for i in 0..10 {
            let at = start + Duration::milliseconds(i * 10);
            engine.ingest(message("pupil", i as f64 * 0.002, at), at, &client);
        }
        assert_eq!(client.request_count(), 0);

        // +1 on speed, smoothness, and rotation in configuration order
        engine.run_aggregation(start + Duration::milliseconds(200), &client);
        assert_eq!(
            client.urls(),
            vec![
                "http://robot-controller:5000/increase_speed",
                "http://robot-controller:5000/add_smoothness",
                "http://robot-controller:5000/add_rotations",
            ]
        );
    }

    #[test]
    fn test_snapshot_updates_only_on_non_neutral_cycle() {
        let mut engine = engine_from(CANCELLATION_CONFIG);
        let client = RecordingClient::default();
        let start = base_time();

        // Before any cycle: empty capture, wiring still present
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.captured_at, None);
        assert!(snapshot.windows.is_empty());
        assert!(snapshot.influences.contains_key("speed"));

        // Neutral cycle leaves the capture empty
        engine.run_aggregation(start, &client);
        assert_eq!(engine.snapshot().captured_at, None);

        // Drive a non-neutral cycle through gaze alone
        for i in 0..10 {
            let at = start + Duration::seconds(i);
            engine.ingest(message("gaze", i as f64 * 0.3, at), at, &client);
        }
        let at = start + Duration::seconds(10);
        engine.run_aggregation(at, &client);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.captured_at, Some(at));
        let gaze = snapshot
            .windows
            .iter()
            .find(|w| w.topic == "gaze")
            .unwrap();
        assert_eq!(gaze.observations.len(), 10);

        // A much later gaze reading evicts the old window, the triggered
        // cycle resolves all-neutral, and the capture stays stale
        let later = at + Duration::seconds(120);
        engine.ingest(message("gaze", 1.0, later), later, &client);
        assert_eq!(engine.snapshot().captured_at, Some(at));
    }

    #[test]
    fn test_wiring_reflects_configuration() {
        let engine = engine_from(REFERENCE_CONFIG);
        let wiring = engine.wiring();

        assert_eq!(wiring["speed"]["pupil"], 1.0);
        assert_eq!(wiring["speed"]["operator/distance"], 1.2);
        assert_eq!(wiring["speed"]["heartrate"], -1.0);
        assert_eq!(wiring["episodic_behaviour"]["expression"], 1.0);
        assert_eq!(wiring["episodic_behaviour"]["blinks"], -1.0);
        assert!(!wiring["proxemics"].contains_key("pupil"));
    }

    #[test]
    fn test_heartrate_spike_drives_speed_decrease() {
        let config = r#"
debounce_interval = 0.45

[[producers]]
topic = "heartrate"
analysis_interval = 10.0
threshold = 0.1
classifier = { kind = "spike" }
weights = { speed = -1.0 }

[[modalities]]
name = "speed"
threshold = 0.1
cooldown_duration = 0.5
base_url = "http://robot:5000"
increase = { path = "/increase_speed" }
decrease = { path = "/decrease_speed" }
"#;
        let mut engine = engine_from(config);
        let client = RecordingClient::default();
        let start = base_time();

        let readings = [70.0, 71.0, 95.0, 69.0, 70.0, 71.0, 70.0, 69.0, 68.0, 70.0];
        for (i, value) in readings.iter().enumerate() {
            let at = start + Duration::milliseconds(i as i64 * 50);
            engine.ingest(message("heartrate", *value, at), at, &client);
        }

        // The first ingest aggregates a one-sample window (neutral); the
        // debounce clock then holds until the final reading, whose pass sees
        // the full window with the single upward spike
        assert_eq!(client.urls(), vec!["http://robot:5000/decrease_speed"]);

        // The next debounce interval, with the spike still in the window and
        // the cooldown expired, dispatches exactly one more decrease
        let at = start + Duration::seconds(1);
        engine.ingest(message("heartrate", 70.0, at), at, &client);
        assert_eq!(
            client.urls(),
            vec![
                "http://robot:5000/decrease_speed",
                "http://robot:5000/decrease_speed",
            ]
        );
    }

    #[test]
    fn test_patch_producer_and_modality() {
        let mut engine = engine_from(REFERENCE_CONFIG);

        engine
            .patch_producer(
                "heartrate",
                ProducerPatch {
                    threshold: Some(0.2),
                    analysis_interval: None,
                    weights: None,
                },
            )
            .unwrap();
        let descriptor = engine
            .producer_descriptors()
            .into_iter()
            .find(|p| p.topic == "heartrate")
            .unwrap();
        assert_eq!(descriptor.threshold, 0.2);
        assert_eq!(descriptor.analysis_interval, 10.0);

        engine
            .patch_modality(
                "speed",
                ModalityPatch {
                    threshold: None,
                    cooldown_duration: Some(2.0),
                },
            )
            .unwrap();
        let descriptor = engine
            .modality_descriptors()
            .into_iter()
            .find(|m| m.name == "speed")
            .unwrap();
        assert_eq!(descriptor.cooldown_duration, 2.0);
        assert_eq!(descriptor.threshold, 0.3);

        assert!(matches!(
            engine.patch_producer("unknown", ProducerPatch::default()),
            Err(EngineError::ProducerNotFound(_))
        ));
        assert!(matches!(
            engine.patch_modality("unknown", ModalityPatch::default()),
            Err(EngineError::ModalityNotFound(_))
        ));
    }
}

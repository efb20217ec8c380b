//! Engine configuration
//!
//! Configuration is read once at startup from a TOML file (or string) and
//! validated before the engine is constructed: unknown classifier kinds,
//! empty weight maps, non-positive intervals, and missing modality endpoint
//! fields are all load-time failures. At runtime, only the narrow patch
//! types can change producer and modality tuning; patches overwrite exactly
//! the fields they carry.

use crate::bootstrap::BaselineParams;
use crate::classifier::ClassifierKind;
use crate::error::EngineError;
use crate::types::HttpMethod;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Default minimum time between aggregation passes, in seconds
pub const DEFAULT_DEBOUNCE_INTERVAL_SECS: f64 = 0.1;

fn default_debounce_interval() -> f64 {
    DEFAULT_DEBOUNCE_INTERVAL_SECS
}

/// Static per-producer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Source topic this producer subscribes to
    pub topic: String,
    /// Trailing window span in seconds
    pub analysis_interval: f64,
    /// Classifier threshold (meaning depends on the classifier kind)
    pub threshold: f64,
    /// Window classifier
    pub classifier: ClassifierKind,
    /// Target parameter -> signed weight; must be non-empty
    pub weights: HashMap<String, f64>,
}

/// One actuation endpoint: remote path, HTTP verb, optional JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Static per-modality configuration. Increase and decrease endpoints are
/// required; a missing one fails deserialization and therefore startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityConfig {
    pub name: String,
    /// Dead-band half-width for the aggregation decision
    pub threshold: f64,
    /// Minimum time between actuation dispatches, in seconds
    pub cooldown_duration: f64,
    pub base_url: String,
    pub increase: EndpointConfig,
    pub decrease: EndpointConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neutral: Option<EndpointConfig>,
}

/// Baseline initialization configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Derive baselines from an external experience estimate instead of the
    /// fixed defaults
    #[serde(default)]
    pub use_external_estimate: bool,
    /// Where to fetch the experience estimate (external mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_url: Option<String>,
    /// Where to push the derived baselines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_url: Option<String>,
    #[serde(default = "BootstrapConfig::default_speed_multiplier")]
    pub speed_multiplier: f64,
    #[serde(default = "BootstrapConfig::default_proxemics_multiplier")]
    pub proxemics_multiplier: f64,
    #[serde(default = "BootstrapConfig::default_smoothness_threshold")]
    pub smoothness_threshold: i64,
    #[serde(default = "BootstrapConfig::default_rotation_threshold")]
    pub rotation_threshold: i64,
    /// Fixed baselines used when external estimation is disabled
    #[serde(default)]
    pub defaults: BaselineParams,
}

impl BootstrapConfig {
    fn default_speed_multiplier() -> f64 {
        2.5
    }

    fn default_proxemics_multiplier() -> f64 {
        2.3
    }

    fn default_smoothness_threshold() -> i64 {
        3
    }

    fn default_rotation_threshold() -> i64 {
        2
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            use_external_estimate: false,
            estimate_url: None,
            push_url: None,
            speed_multiplier: Self::default_speed_multiplier(),
            proxemics_multiplier: Self::default_proxemics_multiplier(),
            smoothness_threshold: Self::default_smoothness_threshold(),
            rotation_threshold: Self::default_rotation_threshold(),
            defaults: BaselineParams::default(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum time between aggregation passes, in seconds
    #[serde(default = "default_debounce_interval")]
    pub debounce_interval: f64,
    pub producers: Vec<ProducerConfig>,
    pub modalities: Vec<ModalityConfig>,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Structural checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut topics = HashSet::new();
        for producer in &self.producers {
            if !topics.insert(producer.topic.as_str()) {
                return Err(EngineError::DuplicateTopic(producer.topic.clone()));
            }
            if producer.weights.is_empty() {
                return Err(EngineError::EmptyWeightMap(producer.topic.clone()));
            }
        }

        let mut names = HashSet::new();
        for modality in &self.modalities {
            if !names.insert(modality.name.as_str()) {
                return Err(EngineError::DuplicateModality(modality.name.clone()));
            }
        }
        Ok(())
    }
}

/// Runtime producer patch; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<HashMap<String, f64>>,
}

/// Runtime modality patch; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModalityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_duration: Option<f64>,
}

/// Reference wiring from the study deployment: five sensor topics feeding
/// five behavior parameters on a single robot controller. Shipped as the
/// CLI's sample configuration and used across the test suite.
pub const REFERENCE_CONFIG: &str = r#"
debounce_interval = 0.1

[[producers]]
topic = "pupil"
analysis_interval = 0.5
threshold = 0.001
classifier = { kind = "trend" }
weights = { speed = 1.0, smoothness = 1.0, rotation = 1.0 }

[[producers]]
topic = "operator/distance"
analysis_interval = 1.0
threshold = 5.0
classifier = { kind = "trend" }
weights = { speed = 1.2, proxemics = 1.2 }

[[producers]]
topic = "expression"
analysis_interval = 3.0
threshold = -2.0
classifier = { kind = "event_sum" }
weights = { episodic_behaviour = 1.0 }

[[producers]]
topic = "heartrate"
analysis_interval = 10.0
threshold = 0.1
classifier = { kind = "spike" }
weights = { speed = -1.0, smoothness = -1.0, rotation = -1.0 }

[[producers]]
topic = "blinks"
analysis_interval = 300.0
threshold = 0.1
classifier = { kind = "trend" }
weights = { episodic_behaviour = -1.0, rotation = -1.0 }

[[modalities]]
name = "speed"
threshold = 0.3
cooldown_duration = 0.5
base_url = "http://robot-controller:5000"
increase = { path = "/increase_speed" }
decrease = { path = "/decrease_speed" }

[[modalities]]
name = "proxemics"
threshold = 0.2
cooldown_duration = 0.5
base_url = "http://robot-controller:5000"
increase = { path = "/increase_proxemics" }
decrease = { path = "/decrease_proxemics" }

[[modalities]]
name = "smoothness"
threshold = 0.1
cooldown_duration = 10.0
base_url = "http://robot-controller:5000"
increase = { path = "/add_smoothness" }
decrease = { path = "/remove_smoothness" }

[[modalities]]
name = "rotation"
threshold = 0.1
cooldown_duration = 10.0
base_url = "http://robot-controller:5000"
increase = { path = "/add_rotations" }
decrease = { path = "/remove_rotations" }

[[modalities]]
name = "episodic_behaviour"
threshold = 0.3
cooldown_duration = 300.0
base_url = "http://robot-controller:5000"
increase = { path = "/episodic_behaviour" }
decrease = { path = "/episodic_behaviour" }

[bootstrap]
use_external_estimate = false
push_url = "http://robot-controller:5000/initialize_robot_params"
"#;

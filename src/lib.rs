//! Attune - Signal-fusion and actuation-dispatch engine for adaptive
//! human-robot interaction
//!
//! Attune turns irregularly-arriving sensor streams (gaze, interpersonal
//! distance, facial affect, heart rate, blink rate) into discrete,
//! rate-limited adjustments of actuator-facing behavior parameters through a
//! deterministic pipeline: rolling-window classification → weighted fan-in
//! aggregation → per-parameter hysteresis decision → cooldown-gated dispatch.
//!
//! ## Modules
//!
//! - **Producers**: per-topic rolling windows reduced by trend, event-sum,
//!   or spike classifiers
//! - **Engine**: debounced aggregation and three-way dead-band decisions
//! - **Modalities**: cooldown-gated actuation toward the robot controller
//! - **Bootstrap**: one-time baseline seeding from an experience estimate

pub mod bootstrap;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod modality;
pub mod producer;
pub mod types;

pub use bootstrap::{bootstrap, BaselineParams, ExperienceSource, HttpExperienceSource};
pub use classifier::{ClassifierKind, OUTLIER_SLOPE_MULTIPLIER};
pub use config::{EngineConfig, ModalityPatch, ProducerPatch};
pub use dispatch::{ActuationClient, HttpActuationClient};
pub use engine::Engine;
pub use error::EngineError;
pub use modality::Modality;
pub use producer::Producer;
pub use types::{Decision, IngestMessage, IngestOutcome, Observation, ObservationValue};

/// Engine version embedded in observability snapshots and CLI output
pub const ATTUNE_VERSION: &str = env!("CARGO_PKG_VERSION");

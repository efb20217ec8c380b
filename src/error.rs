//! Error types for the Attune engine

use thiserror::Error;

/// Errors that can occur while loading configuration or running the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Producer '{0}' declares an empty weight map; at least one target parameter is required")]
    EmptyWeightMap(String),

    #[error("Duplicate producer topic: {0}")]
    DuplicateTopic(String),

    #[error("Duplicate modality name: {0}")]
    DuplicateModality(String),

    #[error("Invalid interval for '{name}': {seconds} seconds")]
    InvalidInterval { name: String, seconds: f64 },

    #[error("Producer not found: {0}")]
    ProducerNotFound(String),

    #[error("Modality not found: {0}")]
    ModalityNotFound(String),

    #[error("Actuation dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Experience estimate request failed: {0}")]
    ExperienceUnavailable(String),

    #[error("Experience estimate is zero; baseline parameters are undetermined")]
    UndeterminedExperience,
}

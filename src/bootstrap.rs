//! Baseline initialization
//!
//! Before steady-state ingestion begins, the actuator collaborator is seeded
//! once with baseline parameter values: either derived from an external
//! experience estimate via fixed linear multipliers and threshold
//! comparisons, or taken from fixed defaults when external estimation is
//! disabled. A zero estimate means the operator could not be assessed, and
//! the process must not start with an undefined baseline.

use crate::config::BootstrapConfig;
use crate::dispatch::ActuationClient;
use crate::error::EngineError;
use crate::types::{ActuationRequest, HttpMethod};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Baseline values pushed to the actuator collaborator once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineParams {
    pub speed: i64,
    pub proxemics: i64,
    pub smoothness: bool,
    pub rotation: bool,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            speed: 5,
            proxemics: 5,
            smoothness: true,
            rotation: true,
        }
    }
}

/// Seam for the external experience-estimation collaborator.
pub trait ExperienceSource {
    /// Fetch the operator's experience score. Zero means undetermined.
    fn experience_score(&self) -> Result<i64, EngineError>;
}

/// HTTP experience source querying the reputation collaborator.
pub struct HttpExperienceSource {
    url: String,
    operator: Option<String>,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct ExperienceResponse {
    score: i64,
}

impl HttpExperienceSource {
    pub fn new(url: impl Into<String>, operator: Option<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            url: url.into(),
            operator,
            client,
        }
    }
}

impl ExperienceSource for HttpExperienceSource {
    fn experience_score(&self) -> Result<i64, EngineError> {
        let mut request = self.client.get(&self.url);
        if let Some(operator) = &self.operator {
            request = request.query(&[("operator", operator.as_str())]);
        }
        let response: ExperienceResponse = request
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json())
            .map_err(|e| EngineError::ExperienceUnavailable(e.to_string()))?;
        Ok(response.score)
    }
}

/// Derive baseline parameters from an experience score: linear multipliers
/// for the numeric parameters, threshold comparisons for the boolean ones.
pub fn derive_baselines(
    config: &BootstrapConfig,
    experience: i64,
) -> Result<BaselineParams, EngineError> {
    if experience == 0 {
        return Err(EngineError::UndeterminedExperience);
    }
    Ok(BaselineParams {
        speed: (config.speed_multiplier * experience as f64).round() as i64,
        proxemics: (config.proxemics_multiplier * experience as f64).round() as i64,
        smoothness: experience > config.smoothness_threshold,
        rotation: experience > config.rotation_threshold,
    })
}

/// Establish and push baseline parameters. Runs once, before any observation
/// is ingested; any failure here halts startup.
pub fn bootstrap(
    config: &BootstrapConfig,
    source: &dyn ExperienceSource,
    client: &dyn ActuationClient,
) -> Result<BaselineParams, EngineError> {
    let params = if config.use_external_estimate {
        let experience = source.experience_score()?;
        info!(experience, "external experience estimate received");
        derive_baselines(config, experience)?
    } else {
        config.defaults.clone()
    };

    if let Some(push_url) = &config.push_url {
        client.dispatch(&ActuationRequest {
            url: push_url.clone(),
            method: HttpMethod::Post,
            body: Some(serde_json::to_value(&params)?),
        })?;
        info!(?params, "baseline parameters pushed");
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::RecordingClient;
    use pretty_assertions::assert_eq;

    struct StubSource(Result<i64, ()>);

    impl ExperienceSource for StubSource {
        fn experience_score(&self) -> Result<i64, EngineError> {
            self.0
                .map_err(|_| EngineError::ExperienceUnavailable("stub".to_string()))
        }
    }

    fn external_config() -> BootstrapConfig {
        BootstrapConfig {
            use_external_estimate: true,
            estimate_url: Some("http://reputation:5000/score".to_string()),
            push_url: Some("http://robot:5000/initialize_robot_params".to_string()),
            speed_multiplier: 1.7,
            proxemics_multiplier: 0.7,
            smoothness_threshold: 3,
            rotation_threshold: 2,
            defaults: BaselineParams::default(),
        }
    }

    #[test]
    fn test_derive_baselines_from_experience() {
        let params = derive_baselines(&external_config(), 4).unwrap();
        assert_eq!(
            params,
            BaselineParams {
                speed: 7,     // round(1.7 * 4)
                proxemics: 3, // round(0.7 * 4)
                smoothness: true,
                rotation: true,
            }
        );
    }

    #[test]
    fn test_derive_baselines_threshold_boundaries() {
        let params = derive_baselines(&external_config(), 2).unwrap();
        assert!(!params.smoothness); // 2 > 3 is false
        assert!(!params.rotation); // 2 > 2 is false

        let params = derive_baselines(&external_config(), 3).unwrap();
        assert!(!params.smoothness);
        assert!(params.rotation);
    }

    #[test]
    fn test_zero_experience_is_fatal() {
        assert!(matches!(
            derive_baselines(&external_config(), 0),
            Err(EngineError::UndeterminedExperience)
        ));
    }

    #[test]
    fn test_bootstrap_external_pushes_derived_params() {
        let config = external_config();
        let client = RecordingClient::default();
        let params = bootstrap(&config, &StubSource(Ok(4)), &client).unwrap();

        assert_eq!(params.speed, 7);
        assert_eq!(client.request_count(), 1);
        let requests = client.requests.borrow();
        assert_eq!(requests[0].url, "http://robot:5000/initialize_robot_params");
        assert_eq!(requests[0].method, HttpMethod::Post);
        let body = requests[0].body.as_ref().unwrap();
        assert_eq!(body["speed"], 7);
        assert_eq!(body["proxemics"], 3);
        assert_eq!(body["smoothness"], true);
        assert_eq!(body["rotation"], true);
    }

    #[test]
    fn test_bootstrap_disabled_uses_defaults() {
        let mut config = external_config();
        config.use_external_estimate = false;
        let client = RecordingClient::default();

        // The estimate source must not be consulted at all
        let params = bootstrap(&config, &StubSource(Err(())), &client).unwrap();
        assert_eq!(params, BaselineParams::default());
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn test_bootstrap_unreachable_estimate_is_fatal() {
        let config = external_config();
        let client = RecordingClient::default();
        let result = bootstrap(&config, &StubSource(Err(())), &client);
        assert!(matches!(result, Err(EngineError::ExperienceUnavailable(_))));
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_bootstrap_without_push_url_is_local_only() {
        let mut config = external_config();
        config.push_url = None;
        let client = RecordingClient::default();
        let params = bootstrap(&config, &StubSource(Ok(5)), &client).unwrap();
        assert_eq!(params.speed, 9); // round(1.7 * 5) = round(8.5)
        assert_eq!(client.request_count(), 0);
    }
}

//! Controllable behavior parameters
//!
//! A modality represents one actuator-facing parameter (speed, proxemics,
//! smoothness, rotation, episodic behavior) and rate-limits its remote
//! actuation with a single shared cooldown bucket.
//!
//! States are Idle (actuation permitted) and Cooling (all calls are no-ops).
//! The transition back to Idle is purely time-driven: once `now` reaches the
//! cooldown end, the next call dispatches again. The dispatch *attempt*
//! consumes the cooldown, whether or not the remote call succeeds.

use crate::config::{EndpointConfig, ModalityConfig, ModalityPatch};
use crate::dispatch::ActuationClient;
use crate::error::EngineError;
use crate::producer::seconds_to_duration;
use crate::types::{ActuationRequest, Decision, HttpMethod};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

/// Cooldown-gated actuation state for one behavior parameter.
#[derive(Debug, Clone)]
pub struct Modality {
    name: String,
    threshold: f64,
    cooldown_duration: Duration,
    /// Monotonically non-decreasing once set
    cooldown_end: Option<DateTime<Utc>>,
    base_url: String,
    increase: EndpointConfig,
    decrease: EndpointConfig,
    neutral: Option<EndpointConfig>,
}

impl Modality {
    pub fn from_config(config: ModalityConfig) -> Result<Self, EngineError> {
        let cooldown_duration = seconds_to_duration(&config.name, config.cooldown_duration)?;
        Ok(Self {
            name: config.name,
            threshold: config.threshold,
            cooldown_duration,
            cooldown_end: None,
            base_url: config.base_url,
            increase: config.increase,
            decrease: config.decrease,
            neutral: config.neutral,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn cooldown_duration(&self) -> Duration {
        self.cooldown_duration
    }

    /// Whether actuation is currently suppressed.
    pub fn is_cooling(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_end.is_some_and(|end| now < end)
    }

    /// Dispatch the actuation call for `decision`. Returns `true` when a
    /// remote call was attempted (the cooldown was consumed), `false` when
    /// the call was suppressed.
    pub fn apply(
        &mut self,
        decision: Decision,
        now: DateTime<Utc>,
        client: &dyn ActuationClient,
    ) -> bool {
        match decision {
            Decision::Increase => self.actuate(self.increase.clone(), now, client),
            Decision::Decrease => self.actuate(self.decrease.clone(), now, client),
            Decision::Neutral => match self.neutral.clone() {
                // No neutral endpoint configured: a complete no-op, the
                // cooldown is left untouched
                None => false,
                Some(endpoint) => self.actuate(endpoint, now, client),
            },
        }
    }

    pub fn increase(&mut self, now: DateTime<Utc>, client: &dyn ActuationClient) -> bool {
        self.apply(Decision::Increase, now, client)
    }

    pub fn decrease(&mut self, now: DateTime<Utc>, client: &dyn ActuationClient) -> bool {
        self.apply(Decision::Decrease, now, client)
    }

    pub fn neutral(&mut self, now: DateTime<Utc>, client: &dyn ActuationClient) -> bool {
        self.apply(Decision::Neutral, now, client)
    }

    fn actuate(
        &mut self,
        endpoint: EndpointConfig,
        now: DateTime<Utc>,
        client: &dyn ActuationClient,
    ) -> bool {
        if self.is_cooling(now) {
            debug!(modality = %self.name, "actuation suppressed by cooldown");
            return false;
        }

        let request = ActuationRequest {
            url: format!("{}{}", self.base_url, endpoint.path),
            method: endpoint.method,
            body: match endpoint.method {
                HttpMethod::Get => None,
                HttpMethod::Post => endpoint.body,
            },
        };

        // Best-effort, at-most-once: the attempt consumes the cooldown even
        // when the remote call fails
        if let Err(e) = client.dispatch(&request) {
            warn!(modality = %self.name, url = %request.url, error = %e, "actuation call failed");
        }
        self.cooldown_end = Some(now + self.cooldown_duration);
        true
    }

    /// Overwrite only the fields present in the patch.
    pub fn apply_patch(&mut self, patch: ModalityPatch) -> Result<(), EngineError> {
        if let Some(threshold) = patch.threshold {
            self.threshold = threshold;
        }
        if let Some(seconds) = patch.cooldown_duration {
            self.cooldown_duration = seconds_to_duration(&self.name, seconds)?;
        }
        Ok(())
    }

    /// Static configuration view for operator listings.
    pub fn descriptor(&self) -> ModalityConfig {
        ModalityConfig {
            name: self.name.clone(),
            threshold: self.threshold,
            cooldown_duration: self.cooldown_duration.num_milliseconds() as f64 / 1000.0,
            base_url: self.base_url.clone(),
            increase: self.increase.clone(),
            decrease: self.decrease.clone(),
            neutral: self.neutral.clone(),
        }
    }
}

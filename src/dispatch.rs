//! Outbound actuation transport
//!
//! The engine talks to the robot-controller collaborator through the
//! [`ActuationClient`] seam. Production code uses the blocking HTTP client;
//! tests substitute recording or failing clients.
//!
//! Dispatch is synchronous: a slow actuator endpoint stalls the aggregation
//! cycle that triggered it. The request timeout bounds that stall.

use crate::error::EngineError;
use crate::types::{ActuationRequest, HttpMethod};
use std::time::Duration;

/// Default per-request timeout for actuation calls
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 5;

/// Transport seam for outbound actuation calls.
pub trait ActuationClient {
    /// Perform one actuation call. No retries; the caller decides what a
    /// failure means.
    fn dispatch(&self, request: &ActuationRequest) -> Result<(), EngineError>;
}

/// Blocking HTTP actuation client with request and connect timeouts.
pub struct HttpActuationClient {
    client: reqwest::blocking::Client,
}

impl HttpActuationClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self { client }
    }
}

impl Default for HttpActuationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuationClient for HttpActuationClient {
    fn dispatch(&self, request: &ActuationRequest) -> Result<(), EngineError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => {
                let builder = self.client.post(&request.url);
                match &request.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        builder
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| EngineError::DispatchFailed(e.to_string()))?;
        Ok(())
    }
}

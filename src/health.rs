//! Health Monitor
//!
//! Checks that the forwarding proxy answers on its primary port and counts
//! strictly consecutive failures. Reaching the threshold asks the supervisor
//! for a restart and resets the count.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::core::error::ConfigError;
use crate::core::types::Port;

/// A single pass/fail check of the supervised proxy
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> bool;
}

/// GET against the proxy's primary port; only `200 OK` is healthy.
///
/// Redirects are not followed, so a `302` counts as a failure.
pub struct HttpHealthCheck {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthCheck {
    pub fn new(port: Port, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: format!("http://127.0.0.1:{}/", port),
        })
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                tracing::debug!(url = %self.url, status = %response.status(), "Health check rejected");
                false
            }
            Err(e) => {
                tracing::debug!(url = %self.url, "Health check failed: {}", e);
                false
            }
        }
    }
}

/// Outcome of recording one health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    /// First success after `after_failures` consecutive failures
    Restored { after_failures: u32 },
    Failing { failures: u32 },
    /// Threshold hit; the counter has already been reset
    ThresholdReached { failures: u32 },
}

impl HealthVerdict {
    pub fn needs_restart(&self) -> bool {
        matches!(self, HealthVerdict::ThresholdReached { .. })
    }
}

/// Consecutive-failure counter
#[derive(Debug, Clone)]
pub struct HealthState {
    consecutive_failures: u32,
    threshold: u32,
}

impl HealthState {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn record(&mut self, healthy: bool) -> HealthVerdict {
        if healthy {
            let previous = std::mem::take(&mut self.consecutive_failures);
            return if previous > 0 {
                HealthVerdict::Restored {
                    after_failures: previous,
                }
            } else {
                HealthVerdict::Healthy
            };
        }

        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold {
            let failures = std::mem::take(&mut self.consecutive_failures);
            HealthVerdict::ThresholdReached { failures }
        } else {
            HealthVerdict::Failing {
                failures: self.consecutive_failures,
            }
        }
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// A health check paired with its failure counter
pub struct HealthMonitor {
    check: Box<dyn HealthCheck>,
    state: HealthState,
}

impl HealthMonitor {
    pub fn new(check: Box<dyn HealthCheck>, threshold: u32) -> Self {
        Self {
            check,
            state: HealthState::new(threshold),
        }
    }

    /// Run the check once and fold it into the counter
    pub async fn check_health(&mut self) -> HealthVerdict {
        let healthy = self.check.check().await;
        let verdict = self.state.record(healthy);

        match verdict {
            HealthVerdict::Healthy => {}
            HealthVerdict::Restored { after_failures } => {
                tracing::info!(after_failures, "Proxy health restored");
            }
            HealthVerdict::Failing { failures } => {
                tracing::warn!(failures, threshold = self.state.threshold(), "Proxy health check failed");
            }
            HealthVerdict::ThresholdReached { failures } => {
                tracing::error!(failures, "Proxy failed consecutive health checks");
            }
        }
        verdict
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.consecutive_failures()
    }
}

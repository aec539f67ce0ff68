//! Environment Probe
//!
//! Samples the three independent facts the watchdog relies on:
//! - ports bound by the backend process
//! - the session token on the backend's command line
//! - the port advertised in the agent tab's routing descriptor
//!
//! Probes never retry; retry and backoff belong to the caller.

mod descriptor;
mod sockets;
mod token;

pub use descriptor::{fetch_advertised, DescriptorParser};
pub use sockets::{parse_listening_ports, query_listening_ports};
pub use token::TokenMatcher;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BackendConfig, TimingConfig};
use crate::core::error::{ConfigError, ProbeError};
use crate::core::types::{AdvertisedRoute, ConfigSnapshot, PortSet, SessionToken};
use crate::process::find_processes;

/// Source of authoritative facts about the backend
#[async_trait]
pub trait EnvironmentProbe: Send + Sync {
    /// Loopback ports bound by the backend. `Err` means "no information".
    async fn probe_ports(&self) -> Result<PortSet, ProbeError>;

    /// Session token from the backend's invocation metadata
    async fn probe_token(&self) -> Option<SessionToken>;

    /// Routing descriptor advertised by the backend
    async fn probe_advertised(&self) -> Option<AdvertisedRoute>;

    /// Sample all three facts into one snapshot
    async fn snapshot(&self) -> ConfigSnapshot {
        let ports = match self.probe_ports().await {
            Ok(ports) => ports,
            Err(e) => {
                tracing::warn!("Port probe failed: {}", e);
                PortSet::new()
            }
        };
        let token = self.probe_token().await;
        let advertised = self.probe_advertised().await.map(|route| route.port);
        ConfigSnapshot::new(ports, token, advertised)
    }
}

/// Probe backed by the real OS and loopback HTTP
pub struct SystemProbe {
    process_name: String,
    agent_tab_port: u16,
    token_matcher: TokenMatcher,
    descriptor_parser: DescriptorParser,
    client: reqwest::Client,
    query_timeout: Duration,
    descriptor_timeout: Duration,
}

impl SystemProbe {
    pub fn new(backend: &BackendConfig, timing: &TimingConfig) -> Result<Self, ConfigError> {
        let token_matcher = TokenMatcher::new(
            backend.process_name.clone(),
            &backend.token_flag,
            backend.required_markers.clone(),
        )
        .map_err(|e| ConfigError::Invalid(format!("backend.token_flag: {}", e)))?;

        let descriptor_parser =
            DescriptorParser::new(&backend.descriptor_variable, backend.descriptor_url_field.clone())
                .map_err(|e| ConfigError::Invalid(format!("backend.descriptor_variable: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timing.descriptor_timeout())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        Ok(Self {
            process_name: backend.process_name.clone(),
            agent_tab_port: backend.agent_tab_port,
            token_matcher,
            descriptor_parser,
            client,
            query_timeout: timing.probe_timeout(),
            descriptor_timeout: timing.descriptor_timeout(),
        })
    }
}

#[async_trait]
impl EnvironmentProbe for SystemProbe {
    async fn probe_ports(&self) -> Result<PortSet, ProbeError> {
        query_listening_ports(&self.process_name, self.query_timeout).await
    }

    async fn probe_token(&self) -> Option<SessionToken> {
        let lookup = tokio::time::timeout(
            self.query_timeout,
            find_processes(self.token_matcher.process_name()),
        )
        .await;

        let processes = match lookup {
            Ok(Ok(processes)) => processes,
            Ok(Err(e)) => {
                let err = ProbeError::ProcessQueryFailed {
                    reason: e.to_string(),
                };
                tracing::warn!("Token probe failed: {}", err);
                return None;
            }
            Err(_) => {
                let err = ProbeError::Timeout {
                    timeout_ms: self.query_timeout.as_millis() as u64,
                };
                tracing::warn!("Token probe failed: {}", err);
                return None;
            }
        };

        self.token_matcher
            .find(processes.iter().map(|p| p.command_line.as_str()))
    }

    async fn probe_advertised(&self) -> Option<AdvertisedRoute> {
        match fetch_advertised(
            &self.client,
            &self.descriptor_parser,
            self.agent_tab_port,
            self.descriptor_timeout,
        )
        .await
        {
            Ok(route) => Some(route),
            Err(e) => {
                tracing::warn!(port = self.agent_tab_port, "Descriptor probe failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted probe for deterministic tests

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays queued answers; the last answer of each queue repeats forever
    #[derive(Default)]
    pub struct FakeProbe {
        ports: Mutex<VecDeque<Option<PortSet>>>,
        tokens: Mutex<VecDeque<Option<SessionToken>>>,
        advertised: Mutex<VecDeque<Option<u16>>>,
        pub advertised_calls: Mutex<Vec<tokio::time::Instant>>,
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>, fallback: T) -> T {
        let mut queue = queue.lock();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(fallback)
        } else {
            queue.front().cloned().unwrap_or(fallback)
        }
    }

    impl FakeProbe {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue port answers; `None` simulates a failed socket query
        pub fn with_ports(self, answers: Vec<Option<Vec<u16>>>) -> Self {
            self.push_ports(answers);
            self
        }

        pub fn push_ports(&self, answers: Vec<Option<Vec<u16>>>) {
            self.ports.lock().extend(
                answers
                    .into_iter()
                    .map(|answer| answer.map(|ports| ports.into_iter().collect())),
            );
        }

        /// Discard queued port answers and replace them
        pub fn set_ports(&self, answers: Vec<Option<Vec<u16>>>) {
            self.ports.lock().clear();
            self.push_ports(answers);
        }

        pub fn with_tokens(self, answers: Vec<Option<&str>>) -> Self {
            self.push_tokens(answers);
            self
        }

        pub fn push_tokens(&self, answers: Vec<Option<&str>>) {
            self.tokens
                .lock()
                .extend(answers.into_iter().map(|t| t.map(SessionToken::new)));
        }

        pub fn with_advertised(self, answers: Vec<Option<u16>>) -> Self {
            self.push_advertised(answers);
            self
        }

        pub fn push_advertised(&self, answers: Vec<Option<u16>>) {
            self.advertised.lock().extend(answers);
        }

        /// Replace every queue with fixed answers
        pub fn set_steady(&self, ports: &[u16], token: Option<&str>, advertised: Option<u16>) {
            *self.ports.lock() = VecDeque::from([Some(ports.iter().copied().collect())]);
            *self.tokens.lock() = VecDeque::from([token.map(SessionToken::new)]);
            *self.advertised.lock() = VecDeque::from([advertised]);
        }
    }

    #[async_trait]
    impl EnvironmentProbe for FakeProbe {
        async fn probe_ports(&self) -> Result<PortSet, ProbeError> {
            next(&self.ports, Some(PortSet::new())).ok_or(ProbeError::SocketQueryFailed {
                reason: "scripted failure".to_string(),
            })
        }

        async fn probe_token(&self) -> Option<SessionToken> {
            next(&self.tokens, None)
        }

        async fn probe_advertised(&self) -> Option<AdvertisedRoute> {
            self.advertised_calls.lock().push(tokio::time::Instant::now());
            next(&self.advertised, None).map(|port| AdvertisedRoute {
                port,
                url: format!("https://127.0.0.1:{}/", port),
                raw: serde_json::Value::Null,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeProbe;
    use super::*;

    #[tokio::test]
    async fn snapshot_treats_port_failure_as_empty() {
        let probe = FakeProbe::new()
            .with_ports(vec![None])
            .with_tokens(vec![Some("abcd-01")])
            .with_advertised(vec![Some(100)]);

        let snapshot = probe.snapshot().await;
        assert!(snapshot.bound_ports.is_empty());
        assert_eq!(snapshot.auth_token, Some(SessionToken::new("abcd-01")));
        assert_eq!(snapshot.advertised_port, Some(100));
    }

    #[tokio::test]
    async fn fake_replays_then_repeats_last_answer() {
        let probe = FakeProbe::new().with_ports(vec![Some(vec![1]), Some(vec![1, 2])]);
        assert_eq!(probe.probe_ports().await.unwrap().len(), 1);
        assert_eq!(probe.probe_ports().await.unwrap().len(), 2);
        assert_eq!(probe.probe_ports().await.unwrap().len(), 2);
    }

    #[test]
    fn system_probe_builds_from_defaults() {
        let probe = SystemProbe::new(&BackendConfig::default(), &TimingConfig::default());
        assert!(probe.is_ok());
    }
}

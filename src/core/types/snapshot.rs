//! Configuration snapshot types
//!
//! Defines what the watchdog learns about the backend in one probe cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::port::{Port, PortSet};

/// Per-session credential taken from the backend's invocation metadata.
///
/// Only a short prefix is ever shown in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Number of leading characters shown by `Display`
    pub const VISIBLE_PREFIX: usize = 8;

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form safe for log output
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(Self::VISIBLE_PREFIX).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.redacted())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Routing descriptor advertised by the backend's agent tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedRoute {
    /// Port extracted from the descriptor's URL field
    pub port: Port,
    /// The URL the port was taken from
    pub url: String,
    /// Decoded JSON payload, kept for diagnostics
    pub raw: serde_json::Value,
}

/// One sample of the backend's observable configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub bound_ports: PortSet,
    pub auth_token: Option<SessionToken>,
    pub advertised_port: Option<Port>,
    pub captured_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    pub fn new(
        bound_ports: PortSet,
        auth_token: Option<SessionToken>,
        advertised_port: Option<Port>,
    ) -> Self {
        Self {
            bound_ports,
            auth_token,
            advertised_port,
            captured_at: Utc::now(),
        }
    }

    /// Whether the advertised port points at one of the bound ports
    pub fn advertisement_is_current(&self) -> bool {
        self.advertised_port
            .map(|port| self.bound_ports.contains(&port))
            .unwrap_or(false)
    }

    /// Describe how `observed` differs from this snapshot.
    ///
    /// Absent values in `observed` carry no information and never count as a
    /// change.
    pub fn config_change(
        &self,
        observed_token: Option<&SessionToken>,
        observed_port: Option<Port>,
    ) -> Option<ConfigChange> {
        if let Some(token) = observed_token {
            if self.auth_token.as_ref() != Some(token) {
                return Some(ConfigChange::Token(token.clone()));
            }
        }
        if let Some(port) = observed_port {
            if self.advertised_port != Some(port) {
                return Some(ConfigChange::AdvertisedPort(port));
            }
        }
        None
    }
}

/// The first difference found between last-known-good and a fresh sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    Token(SessionToken),
    AdvertisedPort(Port),
}

impl fmt::Display for ConfigChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigChange::Token(token) => write!(f, "session token changed to {}", token),
            ConfigChange::AdvertisedPort(port) => write!(f, "advertised port changed to {}", port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(token: Option<&str>, port: Option<Port>) -> ConfigSnapshot {
        ConfigSnapshot::new(
            [100, 101].into_iter().collect(),
            token.map(SessionToken::new),
            port,
        )
    }

    #[test]
    fn token_is_redacted_in_logs() {
        let token = SessionToken::new("0123456789abcdef-0123-4567");
        assert_eq!(token.to_string(), "01234567...");
        assert!(!format!("{:?}", token).contains("89abcdef"));
        assert_eq!(token.as_str(), "0123456789abcdef-0123-4567");
    }

    #[test]
    fn absent_observations_are_not_changes() {
        let lkg = snapshot(Some("aaaa"), Some(100));
        assert_eq!(lkg.config_change(None, None), None);
    }

    #[test]
    fn token_change_is_reported_first() {
        let lkg = snapshot(Some("aaaa"), Some(100));
        let new_token = SessionToken::new("bbbb");
        assert_eq!(
            lkg.config_change(Some(&new_token), Some(200)),
            Some(ConfigChange::Token(new_token))
        );
    }

    #[test]
    fn advertised_port_change_detected() {
        let lkg = snapshot(Some("aaaa"), Some(100));
        let same = SessionToken::new("aaaa");
        assert_eq!(
            lkg.config_change(Some(&same), Some(101)),
            Some(ConfigChange::AdvertisedPort(101))
        );
        assert_eq!(lkg.config_change(Some(&same), Some(100)), None);
    }

    #[test]
    fn advertisement_currency() {
        assert!(snapshot(None, Some(101)).advertisement_is_current());
        assert!(!snapshot(None, Some(7)).advertisement_is_current());
        assert!(!snapshot(None, None).advertisement_is_current());
    }
}

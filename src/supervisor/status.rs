//! Supervisor state shared with the admin server

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::core::types::{ConfigChange, ConfigSnapshot, Port, PortSet};

/// Why a restart was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    Initial,
    PortSetChanged,
    ConfigChanged(ConfigChange),
    HealthFailures { failures: u32 },
    Manual(String),
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::Initial => write!(f, "initial start"),
            RestartReason::PortSetChanged => write!(f, "backend port set changed"),
            RestartReason::ConfigChanged(change) => write!(f, "{}", change),
            RestartReason::HealthFailures { failures } => {
                write!(f, "{} consecutive health failures", failures)
            }
            RestartReason::Manual(reason) => write!(f, "manual request: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorPhase {
    Starting,
    Monitoring,
    Stabilizing,
    WaitingForDescriptor,
    Restarting,
    ShuttingDown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestartRecord {
    pub reason: String,
    pub success: bool,
    pub at: DateTime<Utc>,
}

/// Point-in-time view of the supervisor, safe to expose over HTTP
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub phase: SupervisorPhase,
    pub started_at: DateTime<Utc>,
    pub backend_ports: PortSet,
    /// Redacted
    pub session_token: Option<String>,
    pub advertised_port: Option<Port>,
    pub config_captured_at: Option<DateTime<Utc>>,
    pub proxy_pid: Option<u32>,
    pub proxy_started_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub consecutive_failed_restarts: u32,
    pub consecutive_health_failures: u32,
    pub last_restart: Option<RestartRecord>,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self {
            phase: SupervisorPhase::Starting,
            started_at: Utc::now(),
            backend_ports: PortSet::new(),
            session_token: None,
            advertised_port: None,
            config_captured_at: None,
            proxy_pid: None,
            proxy_started_at: None,
            restart_count: 0,
            consecutive_failed_restarts: 0,
            consecutive_health_failures: 0,
            last_restart: None,
        }
    }
}

impl SupervisorStatus {
    pub fn apply_snapshot(&mut self, snapshot: &ConfigSnapshot) {
        self.session_token = snapshot.auth_token.as_ref().map(|t| t.redacted());
        self.advertised_port = snapshot.advertised_port;
        self.config_captured_at = Some(snapshot.captured_at);
    }
}

pub type SharedStatus = Arc<RwLock<SupervisorStatus>>;

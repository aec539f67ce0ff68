//! Watchdog settings
//!
//! Every section is `#[serde(default)]`, so a config file only needs to name
//! the values it overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::ConfigError;
use crate::core::types::Port;
use crate::logging::LoggingConfig;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level watchdog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Monitored IDE backend
    pub backend: BackendConfig,

    /// Supervised forwarding proxy
    pub proxy: ProxyConfig,

    /// Cadences, thresholds and timeouts
    pub timing: TimingConfig,

    /// Administrative HTTP server
    pub admin: AdminConfig,

    /// Logging setup
    pub logging: LoggingConfig,
}

/// How to recognise the backend and read its advertised routing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Substring identifying the backend in socket and process tables
    pub process_name: String,

    /// Command-line flag that precedes the session token
    pub token_flag: String,

    /// Other markers that must appear on the same command line
    pub required_markers: Vec<String>,

    /// Loopback port serving the agent tab page
    pub agent_tab_port: Port,

    /// JavaScript variable holding the base64 descriptor
    pub descriptor_variable: String,

    /// JSON field in the decoded descriptor holding the backend URL
    pub descriptor_url_field: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            process_name: "language_server".to_string(),
            token_flag: "csrf_token".to_string(),
            required_markers: vec!["workspace_id".to_string()],
            agent_tab_port: 9090,
            descriptor_variable: "window.chatParams".to_string(),
            descriptor_url_field: "languageServerUrl".to_string(),
        }
    }
}

/// How to launch and recognise the forwarding proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Program to execute
    pub program: String,

    /// Arguments passed to the program
    pub args: Vec<String>,

    /// Working directory for the proxy (defaults to the watchdog's)
    pub working_dir: Option<PathBuf>,

    /// Substring identifying stray proxy instances in the process table
    pub identity: String,

    /// Web UI port
    pub ui_port: Port,

    /// LSP relay port
    pub lsp_port: Port,

    /// Mobile-facing port; also the health and liveness port
    pub mobile_port: Port,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["tcp_forward.py".to_string()],
            working_dir: None,
            identity: "tcp_forward.py".to_string(),
            ui_port: 8890,
            lsp_port: 8891,
            mobile_port: 8892,
        }
    }
}

impl ProxyConfig {
    /// Port used for health checks and post-launch verification
    pub fn primary_port(&self) -> Port {
        self.mobile_port
    }

    /// All ports the proxy is expected to bind
    pub fn ports(&self) -> [Port; 3] {
        [self.ui_port, self.mobile_port, self.lsp_port]
    }
}

/// Timing parameters, in seconds unless the field says otherwise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Supervisor tick cadence
    pub check_interval_secs: u64,

    /// Spacing between stabilization samples
    pub stabilize_interval_secs: u64,

    /// Consecutive equal samples needed to call the port set stable
    pub stable_required: u32,

    /// Sampling rounds before stabilization gives up
    pub stabilize_max_rounds: u32,

    /// Smallest port set considered a plausible running backend
    pub min_plausible_ports: usize,

    /// Overall bound on waiting for the descriptor to catch up
    pub readiness_timeout_secs: u64,

    /// Spacing between descriptor polls
    pub readiness_interval_secs: u64,

    /// Consecutive health failures that trigger a restart
    pub health_threshold: u32,

    /// Timeout for socket/process queries and health checks
    pub probe_timeout_secs: u64,

    /// Timeout for the descriptor fetch
    pub descriptor_timeout_secs: u64,

    /// Wait after SIGTERM before escalating to SIGKILL
    pub grace_period_secs: u64,

    /// Pause after stopping the proxy so the OS releases its ports
    pub restart_cooldown_secs: u64,

    /// Pause after launch before verifying the proxy listens
    pub startup_grace_secs: u64,

    /// Pause after an unexpected loop error
    pub error_cooldown_secs: u64,

    /// Upper bound on backoff after consecutive failed restarts
    pub backoff_max_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            stabilize_interval_secs: 5,
            stable_required: 3,
            stabilize_max_rounds: 30,
            min_plausible_ports: 2,
            readiness_timeout_secs: 60,
            readiness_interval_secs: 3,
            health_threshold: 3,
            probe_timeout_secs: 5,
            descriptor_timeout_secs: 10,
            grace_period_secs: 5,
            restart_cooldown_secs: 5,
            startup_grace_secs: 3,
            error_cooldown_secs: 5,
            backoff_max_secs: 60,
        }
    }
}

impl TimingConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn stabilize_interval(&self) -> Duration {
        Duration::from_secs(self.stabilize_interval_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn descriptor_timeout(&self) -> Duration {
        Duration::from_secs(self.descriptor_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

/// Administrative HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: Port,
    /// Program used to deliver the agent-mode gesture
    pub gesture_program: String,
    /// Arguments for the gesture program
    pub gesture_args: Vec<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".to_string(),
            port: 8893,
            gesture_program: "xdotool".to_string(),
            gesture_args: vec!["key".to_string(), "ctrl+e".to_string()],
        }
    }
}

impl WatchdogConfig {
    /// Load configuration from a JSON file
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: WatchdogConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config)
    }

    /// Save configuration with an atomic write
    pub async fn save(&self, path: &Path) -> ConfigResult<()> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content).await.map_err(io_err)?;
        tokio::fs::rename(&temp_path, path).await.map_err(io_err)?;

        Ok(())
    }

    /// Reject settings the supervisor cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        let t = &self.timing;
        let positive = [
            ("check_interval_secs", t.check_interval_secs),
            ("stabilize_interval_secs", t.stabilize_interval_secs),
            ("readiness_interval_secs", t.readiness_interval_secs),
            ("readiness_timeout_secs", t.readiness_timeout_secs),
            ("probe_timeout_secs", t.probe_timeout_secs),
            ("descriptor_timeout_secs", t.descriptor_timeout_secs),
            ("stable_required", t.stable_required as u64),
            ("stabilize_max_rounds", t.stabilize_max_rounds as u64),
            ("health_threshold", t.health_threshold as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("timing.{} must be > 0", name)));
            }
        }

        if t.readiness_interval_secs > t.readiness_timeout_secs {
            return Err(ConfigError::Invalid(
                "timing.readiness_interval_secs exceeds readiness_timeout_secs".to_string(),
            ));
        }

        let ports = [
            ("backend.agent_tab_port", self.backend.agent_tab_port),
            ("proxy.ui_port", self.proxy.ui_port),
            ("proxy.lsp_port", self.proxy.lsp_port),
            ("proxy.mobile_port", self.proxy.mobile_port),
            ("admin.port", self.admin.port),
        ];
        for (name, port) in ports {
            if port == 0 {
                return Err(ConfigError::Invalid(format!("{} must be a non-zero port", name)));
            }
        }

        if self.backend.process_name.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.process_name is empty".to_string()));
        }
        if self.proxy.program.trim().is_empty() {
            return Err(ConfigError::Invalid("proxy.program is empty".to_string()));
        }
        if self.proxy.identity.trim().is_empty() {
            return Err(ConfigError::Invalid("proxy.identity is empty".to_string()));
        }

        Ok(())
    }
}

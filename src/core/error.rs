//! Error types for Hayat
//!
//! Probe and restart failures are recovered inside the supervisor loop; only
//! configuration and startup errors ever reach `main`.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watchdog operations
pub type Result<T> = std::result::Result<T, WatchdogError>;

/// Main error type for the watchdog
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Admin server error: {0}")]
    Admin(String),

    #[error("Shutdown requested")]
    ShutdownRequested,
}

/// Failures while sampling the environment.
///
/// A probe error means "no information", never "zero ports".
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Socket table query failed: {reason}")]
    SocketQueryFailed { reason: String },

    #[error("Process table query failed: {reason}")]
    ProcessQueryFailed { reason: String },

    #[error("Probe timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Decode failures for the advertised routing descriptor
#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("No encoded assignment found in response body")]
    AssignmentNotFound,

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Field '{field}' missing or not a string")]
    MissingField { field: String },

    #[error("No port found in URL: {url}")]
    NoPortInUrl { url: String },
}

/// Supervised process control errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to launch '{program}': {reason}")]
    LaunchFailed { program: String, reason: String },

    #[error("Failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },

    #[error("Failed to wait for process: {0}")]
    WaitFailed(#[source] std::io::Error),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl WatchdogError {
    /// Whether the supervisor loop may continue after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            WatchdogError::Config(_) | WatchdogError::ShutdownRequested
        )
    }
}

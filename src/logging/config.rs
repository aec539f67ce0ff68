//! Logging configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    pub fn writes_files(&self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

/// How often the log file rolls over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// The `logging` section of the watchdog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,

    /// Where rolled files go; platform data dir when unset
    pub directory: Option<PathBuf>,

    pub rotation: RotationStrategy,

    /// Per-target overrides, e.g. `"hayat::probe": "trace"`
    pub modules: BTreeMap<String, LogLevel>,

    /// Include file and line of each event
    pub source_locations: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        // The HTTP client logs every loopback probe at debug
        let modules = [("hyper", LogLevel::Warn), ("reqwest", LogLevel::Warn)]
            .into_iter()
            .map(|(target, level)| (target.to_string(), level))
            .collect();

        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            output: LogOutput::Console,
            directory: None,
            rotation: RotationStrategy::Daily,
            modules,
            source_locations: false,
        }
    }
}

impl LoggingConfig {
    /// Directory actually used for file output
    pub fn effective_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_log_directory)
    }

    /// `EnvFilter` directives: the global level first, then overrides
    pub fn directives(&self) -> Vec<String> {
        std::iter::once(self.level.to_string())
            .chain(
                self.modules
                    .iter()
                    .map(|(target, level)| format!("{}={}", target, level)),
            )
            .collect()
    }
}

fn default_log_directory() -> PathBuf {
    match dirs::data_local_dir() {
        Some(data_dir) => data_dir.join("hayat").join("logs"),
        None => PathBuf::from("logs"),
    }
}

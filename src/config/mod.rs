//! Configuration Management Module for Hayat
//!
//! Provides the watchdog configuration with:
//! - Defaults matching the backend/proxy deployment
//! - JSON file loading with per-section defaults
//! - Atomic saves (temp file + rename)
//! - Validation before the supervisor starts

mod settings;

pub use settings::{
    AdminConfig, BackendConfig, ConfigResult, ProxyConfig, TimingConfig, WatchdogConfig,
};

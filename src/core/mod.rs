//! Hayat Core Module
//!
//! Error taxonomy and the data model shared by every component.

pub mod error;
pub mod types;

// Re-export commonly used items
pub use error::{ConfigError, DescriptorError, ProbeError, ProcessError, Result, WatchdogError};
pub use types::*;

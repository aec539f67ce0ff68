//! Hayat - self-healing watchdog for an IDE backend and its forwarding proxy
//!
//! The IDE's language-server backend restarts on its own schedule and comes
//! back on new ports with a new session token. Hayat notices, waits for the
//! backend to settle, and restarts the forwarding proxy so it points at the
//! live backend again. It also restarts the proxy when it stops answering.
//!
//! - `probe`: OS and loopback-HTTP facts about the backend
//! - `stability`, `readiness`: wait for ports and the advertised descriptor to settle
//! - `health`: consecutive-failure health checks of the proxy
//! - `orchestrator`: ordered stop, sweep, launch and verify of the proxy
//! - `supervisor`: the monitoring loop tying it together
//! - `admin`: HTTP control endpoints for the mobile UI

pub mod admin;
pub mod config;
pub mod core;
pub mod health;
pub mod logging;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod readiness;
pub mod shutdown;
pub mod stability;
pub mod supervisor;

// Re-export commonly used items
pub use crate::config::WatchdogConfig;
pub use crate::core::error::{Result, WatchdogError};
pub use crate::core::types::{ConfigSnapshot, Port, PortSet, SessionToken};
pub use crate::shutdown::ShutdownSignal;
pub use crate::supervisor::{Supervisor, SupervisorHandle};

//! Supervisor Loop
//!
//! A single task samples the backend every check interval and decides whether
//! the forwarding proxy needs a restart. Port-set changes go through the full
//! stabilize, readiness, restart pipeline; token and advertised-port changes
//! restart immediately; consecutive health failures restart last. At most one
//! restart runs per tick, and only this task ever restarts the proxy.

mod monitor;
mod status;


pub use monitor::{
    backoff_delay, classify_port_change, PortChange, Supervisor, SupervisorCommand,
    SupervisorHandle, TickOutcome,
};
pub use status::{
    RestartReason, RestartRecord, SharedStatus, SupervisorPhase, SupervisorStatus,
};

//! Process control for the supervised forwarding proxy
//!
//! The orchestrator only talks to these traits, so termination ordering and
//! escalation can be exercised against a recording fake in tests.

mod child;
pub mod table;

#[cfg(test)]
pub(crate) mod fake;

pub use child::{ChildProcess, CommandLauncher};
pub use table::{find_processes, terminate_processes, MatchedProcess, ProcessTable, TerminationMode};

use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::ProcessError;
use crate::core::types::Port;

/// Handle on one launched proxy instance
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// OS process id, if the process has not been reaped yet
    fn id(&self) -> Option<u32>;

    /// Ask the process to exit and wait up to `grace`; true once it has exited
    async fn terminate(&mut self, grace: Duration) -> bool;

    /// Kill the process and reap it
    async fn force_kill(&mut self);
}

/// Launches proxy instances and inspects their environment
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start a fresh instance with its output discarded
    async fn launch(&self) -> Result<Box<dyn ProcessHandle>, ProcessError>;

    /// Forcefully kill stray instances not owned by any handle; returns the count
    async fn sweep_orphans(&self) -> usize;

    /// Whether something accepts TCP connections on `port`
    async fn is_listening(&self, port: Port) -> bool;
}

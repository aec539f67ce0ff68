//! Process table queries
//!
//! Identity matching is a substring match on the full command line, the same
//! test `pkill -f` applies. The watchdog's own PID is never matched.

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};

/// A process whose command line matched an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedProcess {
    pub pid: u32,
    pub name: String,
    pub command_line: String,
}

/// Signal used when terminating matched processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationMode {
    /// SIGTERM; lets the process clean up
    Graceful,
    /// SIGKILL
    Forceful,
}

/// Snapshot of the OS process table
pub struct ProcessTable {
    system: System,
}

impl ProcessTable {
    /// Capture the current process table with command lines
    pub fn capture() -> Self {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );
        Self { system }
    }

    /// Processes whose command line contains `identity`
    pub fn matching(&self, identity: &str) -> Vec<MatchedProcess> {
        let own_pid = std::process::id();
        let mut matches: Vec<MatchedProcess> = self
            .system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != own_pid)
            .filter_map(|(pid, process)| {
                let command_line = process
                    .cmd()
                    .iter()
                    .map(|part| part.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(" ");
                let name = process.name().to_string_lossy().into_owned();
                if command_line.contains(identity) || (command_line.is_empty() && name.contains(identity)) {
                    Some(MatchedProcess {
                        pid: pid.as_u32(),
                        name,
                        command_line,
                    })
                } else {
                    None
                }
            })
            .collect();
        matches.sort_by_key(|m| m.pid);
        matches
    }

    /// Signal every process matching `identity`; returns how many were signalled
    pub fn terminate_matching(&self, identity: &str, mode: TerminationMode) -> usize {
        let signal = match mode {
            TerminationMode::Graceful => Signal::Term,
            TerminationMode::Forceful => Signal::Kill,
        };

        let mut signalled = 0;
        for matched in self.matching(identity) {
            let Some(process) = self.system.process(Pid::from_u32(matched.pid)) else {
                continue;
            };
            // kill_with returns None when the platform lacks the signal
            let sent = process
                .kill_with(signal)
                .unwrap_or_else(|| process.kill());
            if sent {
                tracing::debug!(pid = matched.pid, ?mode, "Signalled process '{}'", matched.name);
                signalled += 1;
            } else {
                tracing::warn!(pid = matched.pid, ?mode, "Failed to signal process '{}'", matched.name);
            }
        }
        signalled
    }
}

/// Capture the table off the async runtime and collect matching processes
pub async fn find_processes(identity: &str) -> Result<Vec<MatchedProcess>, tokio::task::JoinError> {
    let identity = identity.to_string();
    tokio::task::spawn_blocking(move || ProcessTable::capture().matching(&identity)).await
}

/// Capture the table off the async runtime and signal matching processes
pub async fn terminate_processes(
    identity: &str,
    mode: TerminationMode,
) -> Result<usize, tokio::task::JoinError> {
    let identity = identity.to_string();
    tokio::task::spawn_blocking(move || ProcessTable::capture().terminate_matching(&identity, mode))
        .await
}

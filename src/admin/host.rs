//! Host-side actions behind the admin endpoints

use async_trait::async_trait;
use serde::Serialize;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::process::Command;

use super::error::AdminError;
use crate::config::{AdminConfig, BackendConfig};
use crate::process::{terminate_processes, TerminationMode};

/// Whole-machine resource usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostStats {
    /// Percent across all cores
    pub cpu: u32,
    /// Used memory in MB
    pub ram: u64,
}

/// Side effects the admin server can trigger on the host
#[async_trait]
pub trait HostActions: Send + Sync {
    async fn stats(&self) -> Result<HostStats, AdminError>;

    /// Ask every backend process to exit; the IDE relaunches it. Returns the count signalled.
    async fn restart_backend(&self) -> Result<usize, AdminError>;

    /// Deliver the agent-mode keyboard gesture to the focused window
    async fn send_gesture(&self) -> Result<(), AdminError>;
}

/// Real host backed by sysinfo and external commands
pub struct SystemHost {
    backend_process: String,
    gesture_program: String,
    gesture_args: Vec<String>,
}

impl SystemHost {
    pub fn new(backend: &BackendConfig, admin: &AdminConfig) -> Self {
        Self {
            backend_process: backend.process_name.clone(),
            gesture_program: admin.gesture_program.clone(),
            gesture_args: admin.gesture_args.clone(),
        }
    }

    fn gesture_command(&self) -> String {
        std::iter::once(self.gesture_program.as_str())
            .chain(self.gesture_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl HostActions for SystemHost {
    async fn stats(&self) -> Result<HostStats, AdminError> {
        // CPU usage is a delta, so it needs two refreshes spaced apart
        let mut system = System::new();
        system.refresh_cpu_usage();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu = system.global_cpu_usage();
        if !cpu.is_finite() {
            return Err(AdminError::Stats {
                reason: "CPU usage not available".to_string(),
            });
        }

        Ok(HostStats {
            cpu: cpu.round().clamp(0.0, 100.0) as u32,
            ram: system.used_memory() / 1024 / 1024,
        })
    }

    async fn restart_backend(&self) -> Result<usize, AdminError> {
        terminate_processes(&self.backend_process, TerminationMode::Graceful)
            .await
            .map_err(|e| AdminError::Internal {
                reason: e.to_string(),
            })
    }

    async fn send_gesture(&self) -> Result<(), AdminError> {
        let command = self.gesture_command();
        let output = Command::new(&self.gesture_program)
            .args(&self.gesture_args)
            .output()
            .await
            .map_err(|e| AdminError::CommandFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            tracing::debug!(%command, "Gesture delivered");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(AdminError::CommandFailed {
                command,
                reason: if stderr.is_empty() {
                    output.status.to_string()
                } else {
                    stderr
                },
            })
        }
    }
}

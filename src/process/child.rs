//! Real process handle and launcher backed by `tokio::process`

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use super::table::{terminate_processes, TerminationMode};
use super::{ProcessHandle, ProcessLauncher};
use crate::config::ProxyConfig;
use crate::core::error::ProcessError;
use crate::core::types::Port;

/// Timeout for a single TCP connect when checking a port
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// A launched child process
pub struct ChildProcess {
    child: Child,
    program: String,
}

impl ChildProcess {
    pub fn new(child: Child, program: impl Into<String>) -> Self {
        Self {
            child,
            program: program.into(),
        }
    }

    /// Non-blocking exit check
    fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    #[cfg(unix)]
    fn send_terminate(&mut self) -> Result<(), ProcessError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(ProcessError::SignalFailed {
                pid,
                reason: e.to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&mut self) -> Result<(), ProcessError> {
        // No graceful signal outside unix; fall back to an immediate kill
        let pid = self.child.id().unwrap_or_default();
        self.child.start_kill().map_err(|e| ProcessError::SignalFailed {
            pid,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self, grace: Duration) -> bool {
        if self.has_exited() {
            return true;
        }

        if let Err(e) = self.send_terminate() {
            tracing::warn!("Graceful stop of '{}' failed: {}", self.program, e);
            return false;
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("'{}' exited with {}", self.program, status);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("{}", ProcessError::WaitFailed(e));
                false
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "'{}' ignored SIGTERM",
                    self.program
                );
                false
            }
        }
    }

    async fn force_kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to kill '{}': {}", self.program, e);
        }
    }
}

/// Launches the forwarding proxy as configured
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    identity: String,
    connect_timeout: Duration,
}

impl CommandLauncher {
    pub fn new(proxy: &ProxyConfig) -> Self {
        Self {
            program: proxy.program.clone(),
            args: proxy.args.clone(),
            working_dir: proxy.working_dir.clone(),
            identity: proxy.identity.clone(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn launch(&self) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| ProcessError::LaunchFailed {
            program: self.program.clone(),
            reason: e.to_string(),
        })?;

        tracing::info!(pid = ?child.id(), "Launched '{} {}'", self.program, self.args.join(" "));
        Ok(Box::new(ChildProcess::new(child, self.program.clone())))
    }

    async fn sweep_orphans(&self) -> usize {
        match terminate_processes(&self.identity, TerminationMode::Forceful).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Orphan sweep for '{}' failed: {}", self.identity, e);
                0
            }
        }
    }

    async fn is_listening(&self, port: Port) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        matches!(
            tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn launcher(program: &str, args: &[&str]) -> CommandLauncher {
        let proxy = ProxyConfig {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            identity: "hayat-test-never-matches-4c1d".to_string(),
            ..ProxyConfig::default()
        };
        CommandLauncher::new(&proxy)
    }

    #[tokio::test]
    async fn terminate_stops_cooperative_process() {
        let mut handle = launcher("sleep", &["30"]).launch().await.unwrap();
        assert!(handle.id().is_some());
        assert!(handle.terminate(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn launch_of_missing_program_fails() {
        let result = launcher("/nonexistent/hayat-proxy", &[]).launch().await;
        assert!(matches!(result, Err(ProcessError::LaunchFailed { .. })));
    }

    #[tokio::test]
    async fn force_kill_reaps_process() {
        let mut handle = launcher("sleep", &["30"]).launch().await.unwrap();
        handle.force_kill().await;
        assert!(handle.id().is_none());
    }

    #[tokio::test]
    async fn is_listening_detects_bound_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let launcher = launcher("true", &[]);

        assert!(launcher.is_listening(port).await);
        drop(listener);
        assert!(!launcher.is_listening(port).await);
    }
}

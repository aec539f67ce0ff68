//! Restart Orchestrator
//!
//! Owns the supervised proxy handle exclusively. A restart always stops the
//! old instance and sweeps strays before launching, so two instances are
//! never alive at once.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{ProxyConfig, TimingConfig};
use crate::core::error::Result;
use crate::core::types::{ConfigSnapshot, Port};
use crate::probe::EnvironmentProbe;
use crate::process::{ProcessHandle, ProcessLauncher};
use crate::shutdown::ShutdownSignal;

/// The currently running proxy instance, if any
#[derive(Default)]
pub struct SupervisedProcess {
    handle: Option<Box<dyn ProcessHandle>>,
    started_at: Option<DateTime<Utc>>,
}

impl SupervisedProcess {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().and_then(|h| h.id()).is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(|h| h.id())
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
}

pub struct RestartOrchestrator {
    launcher: Arc<dyn ProcessLauncher>,
    probe: Arc<dyn EnvironmentProbe>,
    timing: TimingConfig,
    primary_port: Port,
    proxy_ports: [Port; 3],
    process: SupervisedProcess,
    last_known_good: Option<ConfigSnapshot>,
}

impl RestartOrchestrator {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        probe: Arc<dyn EnvironmentProbe>,
        timing: TimingConfig,
        proxy: &ProxyConfig,
    ) -> Self {
        Self {
            launcher,
            probe,
            timing,
            primary_port: proxy.primary_port(),
            proxy_ports: proxy.ports(),
            process: SupervisedProcess::default(),
            last_known_good: None,
        }
    }

    pub fn process(&self) -> &SupervisedProcess {
        &self.process
    }

    /// Configuration observed right after the last launch
    pub fn last_known_good(&self) -> Option<&ConfigSnapshot> {
        self.last_known_good.as_ref()
    }

    /// Proxy ports nothing is accepting connections on
    pub async fn unbound_ports(&self) -> Vec<Port> {
        let mut unbound = Vec::new();
        for port in self.proxy_ports {
            if !self.launcher.is_listening(port).await {
                unbound.push(port);
            }
        }
        unbound
    }

    /// Stop, sweep, relaunch and verify the proxy.
    ///
    /// Returns `Ok(true)` once the new instance accepts connections on the
    /// primary port. A failed launch is `Ok(false)`; retry policy belongs to
    /// the caller. Only a shutdown request produces `Err`.
    pub async fn restart(&mut self, reason: &str, shutdown: &ShutdownSignal) -> Result<bool> {
        tracing::info!(reason, "Restarting proxy");

        self.stop_current().await;

        let swept = self.launcher.sweep_orphans().await;
        if swept > 0 {
            tracing::info!(count = swept, "Killed orphaned proxy instances");
        }

        shutdown.sleep(self.timing.restart_cooldown()).await?;

        let handle = match self.launcher.launch().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(reason, "Proxy launch failed: {}", e);
                return Ok(false);
            }
        };
        self.process = SupervisedProcess {
            handle: Some(handle),
            started_at: Some(Utc::now()),
        };

        shutdown.sleep(self.timing.startup_grace()).await?;

        let snapshot = self.probe.snapshot().await;
        tracing::info!(
            token = ?snapshot.auth_token,
            advertised = ?snapshot.advertised_port,
            ports = snapshot.bound_ports.len(),
            "Refreshed last-known-good configuration"
        );
        self.last_known_good = Some(snapshot);

        let unbound = self.unbound_ports().await;
        let listening = !unbound.contains(&self.primary_port);
        if !listening {
            tracing::error!(port = self.primary_port, "Proxy is not listening after restart");
        } else if unbound.is_empty() {
            tracing::info!(port = self.primary_port, pid = ?self.process.pid(), "Proxy is listening");
        } else {
            tracing::warn!(
                port = self.primary_port,
                unbound = ?unbound,
                "Proxy is listening on its primary port only"
            );
        }
        Ok(listening)
    }

    /// Stop the supervised instance, escalating to a kill after the grace period
    pub async fn shutdown(&mut self) {
        if self.process.handle.is_some() {
            tracing::info!(pid = ?self.process.pid(), "Stopping proxy");
        }
        self.stop_current().await;
    }

    async fn stop_current(&mut self) {
        let Some(mut handle) = self.process.handle.take() else {
            return;
        };
        self.process.started_at = None;

        if !handle.terminate(self.timing.grace_period()).await {
            tracing::warn!(pid = ?handle.id(), "Proxy did not exit in time, killing");
            handle.force_kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::WatchdogError;
    use crate::probe::fake::FakeProbe;
    use crate::process::fake::{Event, FakeLauncher};
    use std::time::Duration;

    fn orchestrator(launcher: &FakeLauncher, probe: Arc<FakeProbe>) -> RestartOrchestrator {
        RestartOrchestrator::new(
            Arc::new(launcher.clone()),
            probe,
            TimingConfig::default(),
            &ProxyConfig::default(),
        )
    }

    fn steady_probe() -> Arc<FakeProbe> {
        let probe = FakeProbe::new();
        probe.set_steady(&[100, 101], Some("abcd-01"), Some(100));
        Arc::new(probe)
    }

    #[tokio::test(start_paused = true)]
    async fn first_restart_sweeps_then_launches() {
        let launcher = FakeLauncher::new();
        let mut orch = orchestrator(&launcher, steady_probe());

        let start = tokio::time::Instant::now();
        assert!(orch.restart("initial start", &ShutdownSignal::new()).await.unwrap());

        assert_eq!(launcher.events(), vec![Event::Sweep, Event::Launch(1001)]);
        // cooldown + startup grace
        assert_eq!(start.elapsed(), Duration::from_secs(8));
        assert!(orch.process().is_running());

        let lkg = orch.last_known_good().unwrap();
        assert_eq!(lkg.advertised_port, Some(100));
        assert_eq!(lkg.auth_token.as_ref().map(|t| t.as_str()), Some("abcd-01"));
    }

    #[tokio::test(start_paused = true)]
    async fn kill_always_precedes_launch() {
        let launcher = FakeLauncher::new();
        let mut orch = orchestrator(&launcher, steady_probe());
        let shutdown = ShutdownSignal::new();

        for _ in 0..4 {
            orch.restart("test", &shutdown).await.unwrap();
            assert_eq!(launcher.alive(), 1);
        }
        assert!(!launcher.overlapped());

        let events = launcher.events();
        for (i, event) in events.iter().enumerate() {
            if let Event::Launch(id) = event {
                // The previous instance was stopped before this launch
                let previous = events[..i].iter().rev().find_map(|e| match e {
                    Event::Launch(prev) => Some(*prev),
                    _ => None,
                });
                if let Some(prev) = previous {
                    let stopped = events[..i]
                        .iter()
                        .any(|e| *e == Event::Terminate(prev) || *e == Event::ForceKill(prev));
                    assert!(stopped, "instance {} still alive when {} launched", prev, id);
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn escalates_to_force_kill() {
        let launcher = FakeLauncher::new().ignoring_sigterm();
        let mut orch = orchestrator(&launcher, steady_probe());
        let shutdown = ShutdownSignal::new();

        orch.restart("first", &shutdown).await.unwrap();
        orch.restart("second", &shutdown).await.unwrap();

        assert_eq!(
            launcher.events(),
            vec![
                Event::Sweep,
                Event::Launch(1001),
                Event::Terminate(1001),
                Event::ForceKill(1001),
                Event::Sweep,
                Event::Launch(1002),
            ]
        );
        assert!(!launcher.overlapped());
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_returns_false() {
        let launcher = FakeLauncher::new().failing_launches(1);
        let mut orch = orchestrator(&launcher, steady_probe());

        assert!(!orch.restart("test", &ShutdownSignal::new()).await.unwrap());
        assert!(!orch.process().is_running());
        assert!(orch.last_known_good().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn not_listening_returns_false() {
        let launcher = FakeLauncher::new();
        launcher.set_listening(false);
        let mut orch = orchestrator(&launcher, steady_probe());

        assert!(!orch.restart("test", &ShutdownSignal::new()).await.unwrap());
        // The instance still runs; the supervisor decides what to do next
        assert!(orch.process().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn secondary_port_down_still_succeeds() {
        let launcher = FakeLauncher::new();
        launcher.close_port(8890);
        let mut orch = orchestrator(&launcher, steady_probe());

        assert!(orch.restart("test", &ShutdownSignal::new()).await.unwrap());
        assert_eq!(orch.unbound_ports().await, vec![8890]);
    }

    #[tokio::test(start_paused = true)]
    async fn primary_port_decides_success() {
        let launcher = FakeLauncher::new();
        launcher.close_port(8892);
        let mut orch = orchestrator(&launcher, steady_probe());

        assert!(!orch.restart("test", &ShutdownSignal::new()).await.unwrap());
        assert_eq!(orch.unbound_ports().await, vec![8892]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_cooldown_aborts_before_launch() {
        let launcher = FakeLauncher::new();
        let mut orch = orchestrator(&launcher, steady_probe());
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = orch.restart("test", &shutdown).await;
        assert!(matches!(result, Err(WatchdogError::ShutdownRequested)));
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_running_instance() {
        let launcher = FakeLauncher::new();
        let mut orch = orchestrator(&launcher, steady_probe());
        orch.restart("test", &ShutdownSignal::new()).await.unwrap();

        orch.shutdown().await;
        assert_eq!(launcher.alive(), 0);
        assert!(!orch.process().is_running());
        assert_eq!(launcher.events().last(), Some(&Event::Terminate(1001)));
    }
}

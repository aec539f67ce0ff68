//! The supervisor task and its command handle

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::status::{
    RestartReason, RestartRecord, SharedStatus, SupervisorPhase, SupervisorStatus,
};
use crate::config::{TimingConfig, WatchdogConfig};
use crate::core::error::{Result, WatchdogError};
use crate::core::types::{format_ports, ConfigSnapshot, PortSet};
use crate::health::{HealthCheck, HealthMonitor, HealthVerdict};
use crate::orchestrator::RestartOrchestrator;
use crate::probe::EnvironmentProbe;
use crate::process::ProcessLauncher;
use crate::readiness::wait_for_valid_advertisement;
use crate::shutdown::ShutdownSignal;
use crate::stability::wait_for_stable_ports;

/// Pending requests beyond this are rejected rather than queued
const COMMAND_QUEUE_DEPTH: usize = 1;

/// Requests from outside the supervisor task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCommand {
    RestartProxy { reason: String },
}

/// Cloneable handle for the admin server
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<SupervisorCommand>,
    status: SharedStatus,
}

impl SupervisorHandle {
    pub fn status(&self) -> SupervisorStatus {
        self.status.read().clone()
    }

    /// Queue a proxy restart; the supervisor task runs it between ticks
    pub fn request_restart(&self, reason: impl Into<String>) -> Result<()> {
        let command = SupervisorCommand::RestartProxy {
            reason: reason.into(),
        };
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => WatchdogError::Admin("a restart is already pending".to_string()),
            TrySendError::Closed(_) => WatchdogError::Admin("supervisor is not running".to_string()),
        })
    }
}

/// How the backend's bound ports moved since the last tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortChange {
    Unchanged,
    /// A port not in the previous set showed up
    Appeared,
    /// Ports only went away; some remain
    Shrunk,
    Disappeared,
}

pub fn classify_port_change(last: &PortSet, current: &PortSet) -> PortChange {
    if current == last {
        PortChange::Unchanged
    } else if current.is_empty() {
        PortChange::Disappeared
    } else if !current.is_subset(last) {
        PortChange::Appeared
    } else {
        PortChange::Shrunk
    }
}

/// Extra delay after `failures` consecutive failed restarts
pub fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32 << (failures - 1).min(16);
    base.saturating_mul(factor).min(max)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Healthy,
    HealthDegraded { failures: u32 },
    PortsDisappeared,
    Restarted { reason: RestartReason, success: bool },
}

pub struct Supervisor {
    timing: TimingConfig,
    probe: Arc<dyn EnvironmentProbe>,
    orchestrator: RestartOrchestrator,
    health: HealthMonitor,
    last_ports: PortSet,
    failed_restarts: u32,
    commands: mpsc::Receiver<SupervisorCommand>,
    status: SharedStatus,
    shutdown: ShutdownSignal,
}

impl Supervisor {
    pub fn new(
        config: &WatchdogConfig,
        probe: Arc<dyn EnvironmentProbe>,
        launcher: Arc<dyn ProcessLauncher>,
        health_check: Box<dyn HealthCheck>,
        shutdown: ShutdownSignal,
    ) -> (Self, SupervisorHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let status: SharedStatus = Arc::new(RwLock::new(SupervisorStatus::default()));

        let orchestrator = RestartOrchestrator::new(
            launcher,
            Arc::clone(&probe),
            config.timing.clone(),
            &config.proxy,
        );

        let supervisor = Self {
            timing: config.timing.clone(),
            probe,
            orchestrator,
            health: HealthMonitor::new(health_check, config.timing.health_threshold),
            last_ports: PortSet::new(),
            failed_restarts: 0,
            commands: rx,
            status: Arc::clone(&status),
            shutdown,
        };
        let handle = SupervisorHandle {
            commands: tx,
            status,
        };
        (supervisor, handle)
    }

    pub fn last_ports(&self) -> &PortSet {
        &self.last_ports
    }

    pub fn failed_restarts(&self) -> u32 {
        self.failed_restarts
    }

    pub fn orchestrator(&self) -> &RestartOrchestrator {
        &self.orchestrator
    }

    pub fn consecutive_health_failures(&self) -> u32 {
        self.health.consecutive_failures()
    }

    /// Run until shutdown is requested, then stop the proxy.
    ///
    /// Returns `Ok` on a requested shutdown; only unrecoverable errors escape.
    pub async fn run(mut self) -> Result<()> {
        let result = self.run_until_shutdown().await;

        self.set_phase(SupervisorPhase::ShuttingDown);
        self.orchestrator.shutdown().await;
        self.publish();

        match result {
            Ok(()) | Err(WatchdogError::ShutdownRequested) => {
                tracing::info!("Supervisor stopped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn run_until_shutdown(&mut self) -> Result<()> {
        self.start().await?;
        self.publish();

        loop {
            // A handled command restarts the interval
            if let Some(command) = self.wait_for_next_tick().await? {
                self.handle_command(command).await?;
                self.publish();
                continue;
            }

            match self.tick().await {
                Ok(outcome) => tracing::debug!(?outcome, "Tick complete"),
                Err(e) if e.is_recoverable() => {
                    tracing::error!("Supervisor tick failed: {}", e);
                    self.shutdown.sleep(self.timing.error_cooldown()).await?;
                }
                Err(e) => return Err(e),
            }
            self.publish();
        }
    }

    /// Log the starting configuration and bring the proxy up, retrying once
    pub async fn start(&mut self) -> Result<()> {
        self.set_phase(SupervisorPhase::Starting);

        let initial = self.probe.snapshot().await;
        log_initial_validation(&initial);
        self.last_ports = initial.bound_ports.clone();

        if self.restart(RestartReason::Initial).await? {
            return Ok(());
        }

        tracing::warn!(
            retry_in_secs = self.timing.restart_cooldown().as_secs(),
            "Initial proxy start failed, retrying once"
        );
        self.shutdown.sleep(self.timing.restart_cooldown()).await?;
        if !self.restart(RestartReason::Initial).await? {
            tracing::error!("Proxy failed to start; continuing to monitor");
        }
        Ok(())
    }

    /// One sampling round. Triggers at most one restart.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        self.shutdown.check()?;
        self.set_phase(SupervisorPhase::Monitoring);

        match self.probe.probe_ports().await {
            Ok(current) => match classify_port_change(&self.last_ports, &current) {
                PortChange::Unchanged => {}
                PortChange::Disappeared => {
                    tracing::warn!(
                        previous = %format_ports(&self.last_ports),
                        "All backend ports disappeared, waiting for the backend to return"
                    );
                    self.last_ports = current;
                    return Ok(TickOutcome::PortsDisappeared);
                }
                PortChange::Shrunk => {
                    tracing::info!(
                        previous = %format_ports(&self.last_ports),
                        current = %format_ports(&current),
                        "Backend ports shrank"
                    );
                    self.last_ports = current;
                }
                PortChange::Appeared => return self.handle_port_change(current).await,
            },
            Err(e) => tracing::warn!("Port probe failed, skipping port comparison: {}", e),
        }

        let token = self.probe.probe_token().await;
        let advertised = self.probe.probe_advertised().await.map(|route| route.port);
        let change = self
            .orchestrator
            .last_known_good()
            .and_then(|lkg| lkg.config_change(token.as_ref(), advertised));

        if let Some(change) = change {
            tracing::info!(%change, "Backend configuration changed");
            let reason = RestartReason::ConfigChanged(change);
            let success = self.restart(reason.clone()).await?;
            return Ok(TickOutcome::Restarted { reason, success });
        }

        match self.health.check_health().await {
            HealthVerdict::ThresholdReached { failures } => {
                let reason = RestartReason::HealthFailures { failures };
                let success = self.restart(reason.clone()).await?;
                Ok(TickOutcome::Restarted { reason, success })
            }
            HealthVerdict::Failing { failures } => Ok(TickOutcome::HealthDegraded { failures }),
            HealthVerdict::Healthy | HealthVerdict::Restored { .. } => Ok(TickOutcome::Healthy),
        }
    }

    /// Stabilize, wait for the descriptor, then restart
    async fn handle_port_change(&mut self, current: PortSet) -> Result<TickOutcome> {
        tracing::info!(
            previous = %format_ports(&self.last_ports),
            current = %format_ports(&current),
            "Backend port set changed"
        );

        self.set_phase(SupervisorPhase::Stabilizing);
        let stabilized =
            wait_for_stable_ports(self.probe.as_ref(), current, &self.timing, &self.shutdown).await?;

        self.set_phase(SupervisorPhase::WaitingForDescriptor);
        let readiness = wait_for_valid_advertisement(
            self.probe.as_ref(),
            &stabilized.ports,
            self.timing.readiness_timeout(),
            self.timing.readiness_interval(),
            &self.shutdown,
        )
        .await?;
        if !readiness.ok {
            tracing::warn!(
                advertised = ?readiness.observed_port,
                "Restarting with a stale descriptor"
            );
        }

        self.last_ports = stabilized.ports;
        let reason = RestartReason::PortSetChanged;
        let success = self.restart(reason.clone()).await?;
        Ok(TickOutcome::Restarted { reason, success })
    }

    async fn restart(&mut self, reason: RestartReason) -> Result<bool> {
        self.set_phase(SupervisorPhase::Restarting);
        let label = reason.to_string();

        let success = self.orchestrator.restart(&label, &self.shutdown).await?;
        self.health.reset();

        if success {
            if self.failed_restarts > 0 {
                tracing::info!(failed = self.failed_restarts, "Proxy recovered after failed restarts");
            }
            self.failed_restarts = 0;
            tracing::info!(reason = %label, "Proxy restarted");
        } else {
            self.failed_restarts += 1;
            tracing::error!(
                reason = %label,
                attempt = self.failed_restarts,
                backoff_secs = self.backoff().as_secs(),
                "Proxy restart failed"
            );
        }

        {
            let mut status = self.status.write();
            status.restart_count += 1;
            status.last_restart = Some(RestartRecord {
                reason: label,
                success,
                at: Utc::now(),
            });
        }
        self.publish();
        self.set_phase(SupervisorPhase::Monitoring);
        Ok(success)
    }

    async fn handle_command(&mut self, command: SupervisorCommand) -> Result<()> {
        match command {
            SupervisorCommand::RestartProxy { reason } => {
                tracing::info!(%reason, "Manual restart requested");
                self.restart(RestartReason::Manual(reason)).await?;
            }
        }
        Ok(())
    }

    /// Sleep one check interval plus any backoff; wakes early for commands
    async fn wait_for_next_tick(&mut self) -> Result<Option<SupervisorCommand>> {
        let delay = self.timing.check_interval() + self.backoff();
        tokio::select! {
            _ = self.shutdown.triggered() => Err(WatchdogError::ShutdownRequested),
            _ = tokio::time::sleep(delay) => Ok(None),
            Some(command) = self.commands.recv() => Ok(Some(command)),
        }
    }

    fn backoff(&self) -> Duration {
        backoff_delay(
            self.failed_restarts,
            self.timing.restart_cooldown(),
            self.timing.backoff_max(),
        )
    }

    fn set_phase(&self, phase: SupervisorPhase) {
        self.status.write().phase = phase;
    }

    fn publish(&self) {
        let mut status = self.status.write();
        status.backend_ports = self.last_ports.clone();
        status.consecutive_health_failures = self.health.consecutive_failures();
        status.consecutive_failed_restarts = self.failed_restarts;
        status.proxy_pid = self.orchestrator.process().pid();
        status.proxy_started_at = self.orchestrator.process().started_at();
        if let Some(lkg) = self.orchestrator.last_known_good() {
            status.apply_snapshot(lkg);
        }
    }
}

fn log_initial_validation(snapshot: &ConfigSnapshot) {
    let ports = format_ports(&snapshot.bound_ports);
    match snapshot.advertised_port {
        Some(port) if snapshot.advertisement_is_current() => {
            tracing::info!(port, ports = %ports, "Advertised port matches a bound backend port");
        }
        Some(port) => {
            tracing::warn!(port, ports = %ports, "Advertised port is stale");
        }
        None => {
            tracing::warn!(ports = %ports, "Advertised descriptor unavailable at startup");
        }
    }
    if snapshot.auth_token.is_none() {
        tracing::warn!("No backend session token found at startup");
    }
}

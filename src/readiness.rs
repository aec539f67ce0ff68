//! Readiness Poller
//!
//! A backend can rebind its sockets before it rewrites the descriptor that
//! downstream consumers read. Once the ports are stable, this polls the
//! advertised descriptor until it points at one of them, bounded by a timeout.

use std::time::Duration;

use tokio::time::Instant;

use crate::core::error::Result;
use crate::core::types::{format_ports, Port, PortSet};
use crate::probe::EnvironmentProbe;
use crate::shutdown::ShutdownSignal;

/// Result of waiting for the descriptor to catch up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessOutcome {
    /// True when the advertised port is one of the valid ports
    pub ok: bool,
    /// Last advertised port seen, for diagnostics when `ok` is false
    pub observed_port: Option<Port>,
    pub elapsed: Duration,
}

/// Poll the advertised port every `interval` until it is in `valid_ports`.
///
/// On timeout one final probe reports the stale value and the outcome is a
/// failure; callers proceed regardless.
pub async fn wait_for_valid_advertisement(
    probe: &dyn EnvironmentProbe,
    valid_ports: &PortSet,
    timeout: Duration,
    interval: Duration,
    shutdown: &ShutdownSignal,
) -> Result<ReadinessOutcome> {
    tracing::info!(valid = %format_ports(valid_ports), "Waiting for advertised descriptor to update");
    let start = Instant::now();
    let mut last_seen = None;

    while start.elapsed() < timeout {
        shutdown.check()?;

        if let Some(route) = probe.probe_advertised().await {
            last_seen = Some(route.port);
            if valid_ports.contains(&route.port) {
                tracing::info!(port = route.port, "Advertised port is valid");
                return Ok(ReadinessOutcome {
                    ok: true,
                    observed_port: Some(route.port),
                    elapsed: start.elapsed(),
                });
            }
            tracing::info!(
                port = route.port,
                elapsed_secs = start.elapsed().as_secs(),
                "Advertised port still stale"
            );
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        shutdown.sleep(interval.min(remaining)).await?;
    }

    let observed_port = probe
        .probe_advertised()
        .await
        .map(|route| route.port)
        .or(last_seen);

    tracing::warn!(
        timeout_secs = timeout.as_secs(),
        port = ?observed_port,
        "Advertised descriptor did not update in time"
    );
    Ok(ReadinessOutcome {
        ok: false,
        observed_port,
        elapsed: start.elapsed(),
    })
}

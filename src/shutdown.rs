//! Shutdown coordination
//!
//! Every sleep in the watchdog goes through [`ShutdownSignal::sleep`] so an
//! interrupt or terminate signal cuts the wait short instead of waiting for
//! the current interval to elapse.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::error::{Result, WatchdogError};

/// Cloneable handle on the process-wide shutdown request
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown; idempotent
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }

    /// Sleep for `duration`, returning `ShutdownRequested` if interrupted
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        if self.is_triggered() {
            return Err(WatchdogError::ShutdownRequested);
        }
        tokio::select! {
            _ = self.token.cancelled() => Err(WatchdogError::ShutdownRequested),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Fail fast if shutdown was already requested
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            Err(WatchdogError::ShutdownRequested)
        } else {
            Ok(())
        }
    }
}

/// Spawn a task that triggers `shutdown` on SIGINT or SIGTERM
pub fn spawn_signal_listener(shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = wait_for_signal().await;
        tracing::info!(signal = name, "Received signal, shutting down");
        shutdown.trigger();
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for SIGINT either: {}", e);
                std::future::pending::<()>().await;
            }
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = term.recv() => "SIGTERM",
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!("SIGINT listener failed: {}", e);
                term.recv().await;
                return "SIGTERM";
            }
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    "CTRL_C"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_shutdown() {
        let shutdown = ShutdownSignal::new();
        assert!(shutdown.sleep(Duration::from_secs(30)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_trigger() {
        let shutdown = ShutdownSignal::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        });

        let start = tokio::time::Instant::now();
        let result = shutdown.sleep(Duration::from_secs(3600)).await;
        assert!(matches!(result, Err(WatchdogError::ShutdownRequested)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn triggered_signal_fails_fast() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert!(shutdown.check().is_err());
        assert!(shutdown.sleep(Duration::from_secs(1)).await.is_err());
    }
}

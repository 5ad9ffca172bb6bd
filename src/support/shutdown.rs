//! Graceful shutdown handling
//!
//! A single `watch` flag flips once; the sweeper, the notification logger
//! and the runner each hold a receiver and stop when it does.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

/// Cloneable trigger and observer of the shutdown flag
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn trigger(&self) {
        if !self.sender.send_replace(true) {
            info!("Shutdown signal triggered");
        }
    }

    pub async fn wait(&self) {
        self.notified().wait().await;
    }

    /// Observer taken now and awaited later, typically inside a spawned
    /// task's `select!`. A trigger in between is still seen.
    pub fn notified(&self) -> ShutdownNotified {
        ShutdownNotified {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownNotified {
    receiver: watch::Receiver<bool>,
}

impl ShutdownNotified {
    pub async fn wait(mut self) {
        // the sender lives in ShutdownSignal, so Err only means nobody can trigger anymore
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }
}

/// Trigger `shutdown` on Ctrl+C or SIGTERM
pub async fn listen_for_shutdown_signals(shutdown: ShutdownSignal) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C listener unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM listener unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
    shutdown.trigger();
}

/// Owns the signal and bounds how long cleanup may take
pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            signal: ShutdownSignal::new(),
            timeout_secs,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    pub fn start_signal_listener(&self) {
        let signal = self.signal.clone();
        tokio::spawn(async move {
            listen_for_shutdown_signals(signal).await;
        });
    }

    /// Wait for the signal, then give `cleanup` at most `timeout_secs` to finish.
    pub async fn shutdown_with_cleanup<F, Fut>(&self, cleanup: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        self.signal.wait().await;
        info!(timeout_secs = self.timeout_secs, "Starting graceful shutdown");

        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), cleanup()).await {
            Ok(()) => {
                info!("Graceful shutdown completed");
                true
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout_secs, "Graceful shutdown timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notified_resolves_after_trigger() {
        let signal = ShutdownSignal::new();
        let notified = signal.notified();
        signal.trigger();
        tokio::time::timeout(std::time::Duration::from_millis(100), notified.wait())
            .await
            .expect("shutdown not observed");
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn trigger_is_idempotent_and_seen_by_late_waiters() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        signal.trigger();
        signal.trigger();
        tokio::time::timeout(std::time::Duration::from_millis(100), signal.wait())
            .await
            .expect("late waiter missed the trigger");
    }

    #[tokio::test]
    async fn cleanup_past_timeout_reports_incomplete() {
        let coordinator = ShutdownCoordinator::new(0);
        coordinator.signal().trigger();
        let completed = coordinator
            .shutdown_with_cleanup(|| std::future::pending::<()>())
            .await;
        assert!(!completed);
    }

    #[tokio::test]
    async fn cleanup_runs_once_triggered() {
        let coordinator = ShutdownCoordinator::new(1);
        coordinator.signal().trigger();
        let completed = coordinator.shutdown_with_cleanup(|| async {}).await;
        assert!(completed);
    }
}

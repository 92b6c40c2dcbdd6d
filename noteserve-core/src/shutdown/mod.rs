//! Graceful shutdown coordinator

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
}

/// Fans a single shutdown request out to every waiter.
///
/// Built on a `watch` channel, so a waiter that subscribes after the
/// shutdown was triggered still observes it.
pub struct ShutdownCoordinator {
    state_tx: watch::Sender<ShutdownState>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(drain_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ShutdownState::Running);
        Self {
            state_tx,
            drain_timeout,
        }
    }

    /// How long in-flight requests get once shutdown starts
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Request shutdown. Repeated calls are ignored.
    pub fn trigger(&self) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::ShuttingDown;
                true
            } else {
                false
            }
        });

        if changed {
            info!("Initiating graceful shutdown");
        } else {
            warn!("Shutdown already in progress");
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state_tx.borrow()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() == ShutdownState::ShuttingDown
    }

    /// Resolve once shutdown has been triggered
    pub async fn wait(&self) {
        let mut rx = self.state_tx.subscribe();
        if rx.wait_for(|state| *state == ShutdownState::ShuttingDown).await.is_err() {
            error!("Shutdown channel closed");
        }
    }
}

/// Trigger `coordinator` on SIGINT or SIGTERM
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        coordinator.trigger();
    });
}

/// Trigger `coordinator` on Ctrl+C
#[cfg(windows)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C");
                coordinator.trigger();
            }
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    });
}

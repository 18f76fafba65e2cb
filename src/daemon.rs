//! Periodic scan loop.
//!
//! ```text
//! Idle ──tick──▶ Running ──pass done──▶ Waiting ──interval──▶ Running ...
//!                                          │
//!                                     stop flag
//!                                          ▼
//!                                       Stopped
//! ```
//!
//! The wait is a series of short sleeps with a stop-flag check after each,
//! so a shutdown request is honoured within one step. A pass that is
//! already running is never interrupted; the loop notices the flag once the
//! pass returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::orchestrator::ScanOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Idle,
    Running,
    Waiting,
    Stopped,
}

/// Cooperative stop request shared between the loop and signal handlers.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    stopped: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Sets the flag on Ctrl-C or SIGTERM.
    pub fn stop_on_signal(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown requested");
            flag.stop();
        });
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

pub struct Daemon {
    orchestrator: Arc<ScanOrchestrator>,
    interval: Duration,
    step: Duration,
    stop: StopFlag,
    state: Mutex<DaemonState>,
}

impl Daemon {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            step: Duration::from_secs(1),
            stop: StopFlag::new(),
            state: Mutex::new(DaemonState::Idle),
        }
    }

    /// Overrides the wait increment (one second by default).
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step.max(Duration::from_millis(1));
        self
    }

    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn state(&self) -> DaemonState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: DaemonState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Runs passes until the stop flag is set. Returns the number of ticks.
    pub async fn run(&self) -> usize {
        tracing::info!(interval_secs = self.interval.as_secs(), "daemon started");
        let mut ticks = 0;

        while !self.stop.is_stopped() {
            self.set_state(DaemonState::Running);
            ticks += 1;
            match self.orchestrator.run_pass().await {
                Ok(report) => {
                    tracing::info!(tick = ticks, summary = %report.summary(), "pass finished");
                }
                Err(busy) => {
                    tracing::info!(tick = ticks, progress = %busy.status.progress, "another scan is running, skipping tick");
                }
            }

            if self.stop.is_stopped() {
                break;
            }
            self.set_state(DaemonState::Waiting);
            self.wait().await;
        }

        self.set_state(DaemonState::Stopped);
        tracing::info!(ticks, "daemon stopped");
        ticks
    }

    async fn wait(&self) {
        let mut waited = Duration::ZERO;
        while waited < self.interval {
            if self.stop.is_stopped() {
                return;
            }
            let nap = self.step.min(self.interval - waited);
            tokio::time::sleep(nap).await;
            waited += nap;
        }
    }
}

//! Single-flight scan gate and live [`ScanStatus`].
//!
//! One [`ScanGate`] is created per process and shared by the daemon loop and
//! the control surface. Holding a [`ScanPermit`] is the only way to run a
//! scan body or to change the status, so at most one scan is in flight and
//! the status has exactly one writer. Acquisition never blocks: a second
//! caller is told the gate is busy and gets the current status back.
//!
//! Status reads go through a separate short-lived lock and never wait for
//! the scan itself.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

use crate::models::ScanStatus;

/// Returned when a scan is requested while another one holds the gate.
#[derive(Debug, Error)]
#[error("scan already in progress")]
pub struct ScanBusy {
    pub status: ScanStatus,
}

pub struct ScanGate {
    lock: Arc<tokio::sync::Mutex<()>>,
    status: Arc<RwLock<ScanStatus>>,
    workers_started: AtomicUsize,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Proof of holding the gate. Dropping it releases the gate.
pub struct ScanPermit {
    _guard: OwnedMutexGuard<()>,
    status: Arc<RwLock<ScanStatus>>,
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        // A scan body that unwound without finalising must not leave
        // `scanning: true` behind.
        let mut status = write_lock(&self.status);
        if status.scanning {
            *status = ScanStatus::failed("scan ended before completing");
        }
    }
}

impl Default for ScanGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanGate {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            status: Arc::new(RwLock::new(ScanStatus::default())),
            workers_started: AtomicUsize::new(0),
            worker: Mutex::new(None),
        }
    }

    /// Takes the gate if nobody holds it.
    pub fn try_acquire(&self) -> Result<ScanPermit, ScanBusy> {
        match self.lock.clone().try_lock_owned() {
            Ok(guard) => Ok(ScanPermit {
                _guard: guard,
                status: self.status.clone(),
            }),
            Err(_) => Err(ScanBusy {
                status: self.status(),
            }),
        }
    }

    /// Snapshot of the live status.
    pub fn status(&self) -> ScanStatus {
        read_lock(&self.status).clone()
    }

    pub fn is_scanning(&self) -> bool {
        read_lock(&self.status).scanning
    }

    pub fn set_status(&self, _permit: &ScanPermit, status: ScanStatus) {
        *write_lock(&self.status) = status;
    }

    pub fn set_progress(&self, _permit: &ScanPermit, progress: impl Into<String>) {
        write_lock(&self.status).progress = progress.into();
    }

    /// Runs `work` on a background task. The caller moves its permit into
    /// `work`, so the gate stays held until the task finishes.
    pub fn spawn_worker<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.workers_started.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(work);
        let mut slot = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(handle);
    }

    /// Number of background workers started since construction.
    pub fn workers_started(&self) -> usize {
        self.workers_started.load(Ordering::SeqCst)
    }

    /// Awaits the last spawned worker for up to `grace`.
    ///
    /// Returns `true` when no worker is left running.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let handle = {
            let mut slot = self.worker.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        let Some(handle) = handle else {
            return true;
        };
        if handle.is_finished() {
            return true;
        }
        tracing::info!(grace_secs = grace.as_secs(), "waiting for in-flight scan");
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "scan worker failed");
                true
            }
            Err(_) => {
                tracing::warn!("scan still running after grace period, exiting anyway");
                false
            }
        }
    }
}

fn read_lock(lock: &RwLock<ScanStatus>) -> std::sync::RwLockReadGuard<'_, ScanStatus> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock(lock: &RwLock<ScanStatus>) -> std::sync::RwLockWriteGuard<'_, ScanStatus> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

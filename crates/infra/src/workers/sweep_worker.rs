use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use lotkeeper_core::TenantId;

use crate::services::ClassificationService;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SweepStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// A sweep already in progress finishes first.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> SweepStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }
}

/// Totals across every sweep run so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub runs: u64,
    pub examined: u64,
    pub changed: u64,
    pub failed: u64,
}

/// Periodic classification sweep.
///
/// Sweeps every tenant once immediately, then once per `interval`, until
/// shut down. Lots are processed sequentially.
#[derive(Debug)]
pub struct SweepWorker;

impl SweepWorker {
    pub fn spawn(
        name: &'static str,
        service: ClassificationService,
        tenants: Vec<TenantId>,
        interval: Duration,
    ) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SweepStats::default()));
        let worker_stats = Arc::clone(&stats);

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, &service, &tenants, interval, &shutdown_rx, &worker_stats))?;

        info!(worker = name, interval_secs = interval.as_secs(), "sweep worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn worker_loop(
    name: &'static str,
    service: &ClassificationService,
    tenants: &[TenantId],
    interval: Duration,
    shutdown_rx: &mpsc::Receiver<()>,
    stats: &Mutex<SweepStats>,
) {
    loop {
        for &tenant_id in tenants {
            match service.sweep(tenant_id) {
                Ok(report) => {
                    if let Ok(mut s) = stats.lock() {
                        s.examined += report.examined as u64;
                        s.changed += report.changed as u64;
                        s.failed += report.failed as u64;
                    }
                }
                Err(err) => {
                    error!(worker = name, tenant_id = %tenant_id, error = %err, "sweep failed");
                }
            }
        }
        if let Ok(mut s) = stats.lock() {
            s.runs += 1;
        }

        match shutdown_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = name, "sweep worker stopped");
}

//! Periodic task maintenance: fail overdue tasks and drop expired records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::TaskOrchestrator;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

/// Handle for the sweeper task. Dropping it requests shutdown.
pub struct SweeperHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Request shutdown and wait for the current sweep to finish.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn start_sweeper(
    orchestrator: Arc<TaskOrchestrator>,
    interval: Duration,
    retention: Duration,
) -> SweeperHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Task sweeper started");
        sweeper_loop(&orchestrator, interval, retention, &flag).await;
        tracing::info!("Task sweeper shutting down");
    });

    SweeperHandle {
        shutdown,
        handle: Some(handle),
    }
}

async fn sweeper_loop(
    orchestrator: &TaskOrchestrator,
    interval: Duration,
    retention: Duration,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let mut slept = Duration::ZERO;
        while slept < interval {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            let step = SLEEP_GRANULARITY.min(interval - slept);
            tokio::time::sleep(step).await;
            slept += step;
        }

        sweep_once(orchestrator, retention).await;
    }
}

pub async fn sweep_once(orchestrator: &TaskOrchestrator, retention: Duration) {
    if let Err(e) = orchestrator.expire_overdue().await {
        tracing::warn!(error = %e, "Overdue task sweep failed");
    }
    if let Err(e) = orchestrator.cleanup(retention).await {
        tracing::warn!(error = %e, "Task cleanup failed");
    }
}

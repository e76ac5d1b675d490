//! Periodic scan driver with explicit start/stop

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::{RegistryError, RegistryResult};
use crate::scanner::{ScanReport, ScriptScanner};

/// Work the scheduler triggers on every tick
#[async_trait]
pub trait ScanTask: Send + Sync + 'static {
    async fn run_scan(&self) -> RegistryResult<ScanReport>;
}

#[async_trait]
impl ScanTask for ScriptScanner {
    async fn run_scan(&self) -> RegistryResult<ScanReport> {
        self.scan_once().await
    }
}

/// Runs a scan immediately on start and then once per interval until
/// stopped
///
/// Runs under the tokio clock, so tests drive it with paused time
/// instead of real sleeps.
pub struct ScanScheduler {
    interval: Duration,
    task: Arc<dyn ScanTask>,
    shutdown: Mutex<Option<broadcast::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScanScheduler {
    pub fn new(interval: Duration, task: Arc<dyn ScanTask>) -> Self {
        Self {
            interval,
            task,
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> RegistryResult<()> {
        let mut shutdown = self.shutdown.lock().await;
        if shutdown.is_some() {
            return Err(RegistryError::SchedulerRunning);
        }
        let (tx, mut rx) = broadcast::channel(1);
        *shutdown = Some(tx);

        info!(interval_secs = self.interval.as_secs(), "starting scan scheduler");
        let task = self.task.clone();
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match task.run_scan().await {
                            Ok(report) => {
                                debug!(
                                    loaded = report.loaded,
                                    failed = report.failed,
                                    unchanged = report.unchanged,
                                    "scheduled scan complete"
                                );
                            }
                            Err(err) => error!(error = %err, "scheduled scan failed"),
                        }
                    }
                    _ = rx.recv() => break,
                }
            }
            debug!("scan scheduler loop exited");
        });
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Signal the loop and wait for it to exit; a stopped scheduler
    /// can be started again
    pub async fn stop(&self) {
        let sender = self.shutdown.lock().await.take();
        if let Some(sender) = sender {
            info!("stopping scan scheduler");
            let _ = sender.send(());
        }
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.shutdown.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTask {
        runs: AtomicUsize,
    }

    impl CountingTask {
        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScanTask for CountingTask {
        async fn run_scan(&self) -> RegistryResult<ScanReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(ScanReport::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_immediately_then_once_per_interval() {
        let task = Arc::new(CountingTask::default());
        let scheduler = ScanScheduler::new(Duration::from_secs(5), task.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(task.runs(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(task.runs(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(task.runs(), 4);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_future_scans() {
        let task = Arc::new(CountingTask::default());
        let scheduler = ScanScheduler::new(Duration::from_secs(5), task.clone());
        scheduler.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        let after_stop = task.runs();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(task.runs(), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_rejected_until_stopped() {
        let task = Arc::new(CountingTask::default());
        let scheduler = ScanScheduler::new(Duration::from_secs(5), task);
        scheduler.start().await.unwrap();

        assert!(matches!(
            scheduler.start().await,
            Err(RegistryError::SchedulerRunning)
        ));

        scheduler.stop().await;
        scheduler.start().await.unwrap();
        scheduler.stop().await;
    }
}

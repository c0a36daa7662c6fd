//! Drives the periodic sync cycle. A single background task computes the
//! next run time, waits on either the interval elapsing or a manual
//! trigger, then runs one cycle, catching and logging whatever it returns
//! so one bad cycle never kills the loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> anyhow::Result<()>;
}

/// Adapts a plain async closure to [`CycleRunner`], for tests that don't
/// want to stand up a full orchestrator.
pub struct FnCycleRunner<F>(pub F);

#[async_trait]
impl<F> CycleRunner for FnCycleRunner<F>
where
    F: Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync,
{
    async fn run_cycle(&self) -> anyhow::Result<()> {
        (self.0)().await
    }
}

struct Inner {
    next_run: RwLock<Option<DateTime<Utc>>>,
    is_running: AtomicBool,
    stopping: AtomicBool,
    trigger: Notify,
}

pub struct Scheduler {
    interval: Duration,
    runner: Arc<dyn CycleRunner>,
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(interval: Duration, runner: Arc<dyn CycleRunner>) -> Self {
        Self {
            interval,
            runner,
            inner: Arc::new(Inner {
                next_run: RwLock::new(None),
                is_running: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                trigger: Notify::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Concurrent calls are no-ops: if a loop is already running, this
    /// returns immediately without spawning a second one.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("scheduler already running");
            return;
        }

        self.inner.stopping.store(false, Ordering::SeqCst);
        let inner = self.inner.clone();
        let runner = self.runner.clone();
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            run_loop(inner, runner, interval).await;
        }));

        info!(interval_secs = self.interval.as_secs(), "scheduler started");
    }

    /// Signals the loop to stop, wakes it if waiting, and joins with a
    /// deadline. If the deadline expires, logs a warning and returns
    /// without forcibly aborting the in-flight cycle.
    pub async fn stop(&self, timeout: Duration) {
        info!("stopping scheduler");
        self.inner.stopping.store(true, Ordering::SeqCst);
        self.inner.trigger.notify_one();

        let handle = self.task.lock().await.take();
        let Some(handle) = handle else { return };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!("scheduler stopped"),
            Ok(Err(e)) => error!(error = %e, "scheduler task panicked"),
            Err(_) => warn!(timeout_secs = timeout.as_secs(), "scheduler did not stop within timeout"),
        }
    }

    /// Idempotent: an already-pending trigger simply runs once.
    pub fn trigger_now(&self) {
        info!("manual sync trigger requested");
        self.inner.trigger.notify_one();
    }

    pub async fn next_run(&self) -> Option<DateTime<Utc>> {
        *self.inner.next_run.read().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }
}

async fn run_loop(inner: Arc<Inner>, runner: Arc<dyn CycleRunner>, interval: Duration) {
    info!("scheduler loop started");

    loop {
        if inner.stopping.load(Ordering::SeqCst) {
            break;
        }

        let next = Utc::now() + chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero());
        *inner.next_run.write().await = Some(next);

        let triggered = tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            _ = inner.trigger.notified() => true,
        };

        if inner.stopping.load(Ordering::SeqCst) {
            break;
        }

        if triggered {
            info!("running sync cycle (manually triggered)");
        } else {
            info!("running sync cycle (scheduled)");
        }

        inner.is_running.store(true, Ordering::SeqCst);
        if let Err(e) = runner.run_cycle().await {
            error!(error = %e, "sync cycle failed");
        }
        inner.is_running.store(false, Ordering::SeqCst);
    }

    info!("scheduler loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingRunner(Arc<AtomicU32>);

    #[async_trait]
    impl CycleRunner for CountingRunner {
        async fn run_cycle(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn trigger_now_runs_a_cycle_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let scheduler = Scheduler::new(
            Duration::from_secs(3600),
            Arc::new(CountingRunner(count.clone())),
        );

        scheduler.start().await;
        scheduler.trigger_now();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(count.load(Ordering::SeqCst) >= 1);
        scheduler.stop(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn stop_joins_the_loop() {
        let count = Arc::new(AtomicU32::new(0));
        let scheduler = Scheduler::new(
            Duration::from_secs(3600),
            Arc::new(CountingRunner(count.clone())),
        );

        scheduler.start().await;
        scheduler.stop(Duration::from_secs(5)).await;

        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let count = Arc::new(AtomicU32::new(0));
        let scheduler = Scheduler::new(
            Duration::from_secs(3600),
            Arc::new(CountingRunner(count.clone())),
        );

        scheduler.start().await;
        scheduler.start().await;
        scheduler.stop(Duration::from_secs(5)).await;
    }
}

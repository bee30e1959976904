//! Fixed-interval task runner.
//!
//! A [`PeriodicExecutor`] launches a [`Tickable`] task's `tick` on its own
//! tokio task at a fixed cadence. Boundaries are computed as the previous
//! boundary plus the interval, so slow ticks do not shift the schedule. A tick
//! that exceeds its timeout budget is reported through `on_timeout` and left
//! running.
//!
//! Two cancellation sources stop the loop: the process-wide [`ShutdownToken`]
//! and the executor's own stop token, which is a child of it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};

/// Work run by a [`PeriodicExecutor`] on every tick.
pub trait Tickable: Send + Sync + 'static {
    /// Name used in log fields
    fn name(&self) -> &str;

    fn tick(self: Arc<Self>) -> impl Future<Output = Result<()>> + Send + 'static;

    /// Called when a tick is still running after the executor's timeout.
    /// The tick is not cancelled.
    fn on_timeout(&self, _budget: Duration) {}

    /// Called with the error returned by a tick, or with a panic converted
    /// into an error.
    fn on_tick_error(&self, err: &AppError) {
        error!(worker = self.name(), error = %err, "Tick failed");
    }
}

/// What to do when a tick boundary arrives while the previous tick still runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Launch anyway; ticks may run concurrently
    #[default]
    Allow,
    /// Skip this boundary
    SkipWhileRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub start_delay: Duration,
    pub overlap: OverlapPolicy,
}

impl ExecutorSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            start_delay: Duration::ZERO,
            overlap: OverlapPolicy::Allow,
        }
    }

    pub fn with_start_delay(mut self, start_delay: Duration) -> Self {
        self.start_delay = start_delay;
        self
    }

    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }
}

/// Process-wide stop signal. Once triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(CancellationToken);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn triggered(&self) {
        self.0.cancelled().await;
    }

    fn child(&self) -> CancellationToken {
        self.0.child_token()
    }
}

pub struct PeriodicExecutor {
    settings: ExecutorSettings,
    shutdown: ShutdownToken,
    stop: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicExecutor {
    pub fn new(settings: ExecutorSettings, shutdown: &ShutdownToken) -> Self {
        Self {
            settings,
            shutdown: shutdown.clone(),
            stop: shutdown.child(),
            worker: Mutex::new(None),
        }
    }

    /// Runs the tick loop in the calling task until a stop is requested.
    pub async fn run<T: Tickable>(&self, task: Arc<T>) {
        run_loop(self.settings, self.shutdown.clone(), self.stop.clone(), task).await;
    }

    /// Runs the tick loop on a spawned task; pair with [`request_stop`](Self::request_stop).
    pub fn run_detached<T: Tickable>(&self, task: Arc<T>) {
        let handle = tokio::spawn(run_loop(
            self.settings,
            self.shutdown.clone(),
            self.stop.clone(),
            task,
        ));

        let previous = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if previous.is_some() {
            warn!("run_detached called twice, the earlier loop keeps running until stop");
        }
    }

    /// Stops this executor and waits for a detached loop, including any
    /// in-flight ticks, to finish.
    pub async fn request_stop(&self) {
        self.stop.cancel();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Executor loop ended abnormally: {}", e);
            }
        }
    }
}

async fn run_loop<T: Tickable>(
    settings: ExecutorSettings,
    shutdown: ShutdownToken,
    stop: CancellationToken,
    task: Arc<T>,
) {
    let name = task.name().to_string();
    info!(
        worker = %name,
        interval_ms = settings.interval.as_millis() as u64,
        timeout_ms = settings.timeout.as_millis() as u64,
        start_delay_ms = settings.start_delay.as_millis() as u64,
        "Starting periodic executor"
    );

    if !settings.start_delay.is_zero() {
        tokio::select! {
            _ = stop.cancelled() => {
                info!(worker = %name, "Stopped before first tick");
                return;
            }
            _ = sleep(settings.start_delay) => {}
        }
    }

    let running = Arc::new(AtomicBool::new(false));
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
    let mut next_tick = Instant::now();
    let mut iteration = 0u64;

    loop {
        in_flight.retain(|handle| !handle.is_finished());
        iteration += 1;

        if settings.overlap == OverlapPolicy::SkipWhileRunning && running.load(Ordering::SeqCst) {
            debug!(worker = %name, iteration, "Previous tick still running, skipping");
        } else {
            let mut handle = launch_tick(Arc::clone(&task), Arc::clone(&running));

            match timeout(settings.timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(worker = %name, iteration, "Tick wrapper failed: {}", e),
                Err(_) => {
                    task.on_timeout(settings.timeout);
                    in_flight.push(handle);
                }
            }
        }

        if shutdown.is_triggered() || stop.is_cancelled() {
            break;
        }

        next_tick += settings.interval;
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = sleep_until(next_tick) => {}
        }
    }

    if !in_flight.is_empty() {
        info!(worker = %name, pending = in_flight.len(), "Waiting for in-flight ticks");
    }
    for handle in in_flight {
        if let Err(e) = handle.await {
            error!(worker = %name, "Tick wrapper failed: {}", e);
        }
    }

    info!(worker = %name, iterations = iteration, "Periodic executor stopped");
}

/// Spawns one tick. The outer task observes the tick's result, including a
/// panic, and clears `running` when it is done.
fn launch_tick<T: Tickable>(task: Arc<T>, running: Arc<AtomicBool>) -> JoinHandle<()> {
    running.store(true, Ordering::SeqCst);

    tokio::spawn(async move {
        let _guard = RunningGuard(running);

        match tokio::spawn(Arc::clone(&task).tick()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => task.on_tick_error(&e),
            Err(join_error) => {
                task.on_tick_error(&AppError::Other(format!("tick panicked: {}", join_error)));
            }
        }
    })
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Sleeps for `work` on every tick and records when each tick started.
    struct Recorder {
        work: Duration,
        fail: bool,
        panic: bool,
        starts: Mutex<Vec<Instant>>,
        completions: AtomicUsize,
        timeouts: AtomicUsize,
        errors: AtomicUsize,
    }

    impl Recorder {
        fn new(work: Duration) -> Self {
            Self {
                work,
                fail: false,
                panic: false,
                starts: Mutex::new(Vec::new()),
                completions: AtomicUsize::new(0),
                timeouts: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
            }
        }

        fn starts(&self) -> Vec<Instant> {
            self.starts.lock().unwrap().clone()
        }
    }

    impl Tickable for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn tick(self: Arc<Self>) -> Result<()> {
            self.starts.lock().unwrap().push(Instant::now());
            sleep(self.work).await;
            self.completions.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("boom");
            }
            if self.fail {
                return Err(AppError::Other("tick failed".to_string()));
            }
            Ok(())
        }

        fn on_timeout(&self, _budget: Duration) {
            self.timeouts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_tick_error(&self, _err: &AppError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn settings(interval_ms: u64, timeout_ms: u64) -> ExecutorSettings {
        ExecutorSettings::new(Duration::from_millis(interval_ms), Duration::from_millis(timeout_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_does_not_drift() {
        let shutdown = ShutdownToken::new();
        let executor = PeriodicExecutor::new(settings(1000, 500), &shutdown);
        let task = Arc::new(Recorder::new(Duration::from_millis(50)));

        executor.run_detached(Arc::clone(&task));
        sleep(Duration::from_millis(9_500)).await;
        executor.request_stop().await;

        let starts = task.starts();
        assert!(starts.len() >= 10, "only {} ticks", starts.len());
        let tenth = starts[9].duration_since(starts[0]);
        assert!(tenth >= Duration::from_millis(9_000));
        assert!(tenth < Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_and_panics_do_not_stop_the_loop() {
        let shutdown = ShutdownToken::new();

        let failing = Arc::new(Recorder { fail: true, ..Recorder::new(Duration::from_millis(10)) });
        let panicking = Arc::new(Recorder { panic: true, ..Recorder::new(Duration::from_millis(10)) });

        let a = PeriodicExecutor::new(settings(100, 50), &shutdown);
        let b = PeriodicExecutor::new(settings(100, 50), &shutdown);
        a.run_detached(Arc::clone(&failing));
        b.run_detached(Arc::clone(&panicking));

        sleep(Duration::from_millis(450)).await;
        a.request_stop().await;
        b.request_stop().await;

        assert!(failing.starts().len() >= 4);
        assert_eq!(failing.errors.load(Ordering::SeqCst), failing.starts().len());
        assert!(panicking.starts().len() >= 4);
        assert_eq!(panicking.errors.load(Ordering::SeqCst), panicking.starts().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reported_without_cancelling_tick() {
        let shutdown = ShutdownToken::new();
        let executor = PeriodicExecutor::new(settings(1000, 100), &shutdown);
        let task = Arc::new(Recorder::new(Duration::from_millis(300)));

        executor.run_detached(Arc::clone(&task));
        sleep(Duration::from_millis(500)).await;

        assert_eq!(task.timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(task.completions.load(Ordering::SeqCst), 1);
        executor.request_stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_while_running_prevents_overlap() {
        let shutdown = ShutdownToken::new();
        let work = Duration::from_millis(2_500);

        let skipping = Arc::new(Recorder::new(work));
        let overlapping = Arc::new(Recorder::new(work));

        let a = PeriodicExecutor::new(
            settings(1000, 100).with_overlap(OverlapPolicy::SkipWhileRunning),
            &shutdown,
        );
        let b = PeriodicExecutor::new(settings(1000, 100), &shutdown);
        a.run_detached(Arc::clone(&skipping));
        b.run_detached(Arc::clone(&overlapping));

        sleep(Duration::from_millis(4_800)).await;
        assert_eq!(skipping.starts().len(), 2);
        assert_eq!(overlapping.starts().len(), 5);

        a.request_stop().await;
        b.request_stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_in_flight_tick() {
        let shutdown = ShutdownToken::new();
        let executor = PeriodicExecutor::new(settings(10_000, 100), &shutdown);
        let task = Arc::new(Recorder::new(Duration::from_millis(3_000)));

        executor.run_detached(Arc::clone(&task));
        sleep(Duration::from_millis(500)).await;
        assert_eq!(task.completions.load(Ordering::SeqCst), 0);

        executor.request_stop().await;
        assert_eq!(task.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_start_delay_runs_nothing() {
        let shutdown = ShutdownToken::new();
        let executor = PeriodicExecutor::new(
            settings(1000, 100).with_start_delay(Duration::from_secs(60)),
            &shutdown,
        );
        let task = Arc::new(Recorder::new(Duration::from_millis(10)));

        executor.run_detached(Arc::clone(&task));
        sleep(Duration::from_secs(1)).await;
        executor.request_stop().await;

        assert!(task.starts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_blocking_run() {
        let shutdown = ShutdownToken::new();
        let executor = PeriodicExecutor::new(settings(1000, 100), &shutdown);
        let task = Arc::new(Recorder::new(Duration::from_millis(10)));

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2_500)).await;
            trigger.trigger();
        });

        executor.run(Arc::clone(&task)).await;

        assert!(shutdown.is_triggered());
        assert_eq!(task.starts().len(), 3);
    }
}

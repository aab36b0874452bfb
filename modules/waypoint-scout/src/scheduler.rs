// Periodic scrape timer.
//
// At most one cycle runs at a time. A tick that fires while a cycle is
// still running is dropped, not queued. The interval comes from the stored
// settings and can be reloaded at runtime; `<= 0` disables the timer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::cycle::{CycleReport, ScrapeJob};

/// Longest period the timer is armed with. Larger intervals are clamped.
pub const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Where the scrape interval comes from.
#[async_trait]
pub trait IntervalSource: Send + Sync {
    async fn interval_minutes(&self) -> anyhow::Result<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Disabled,
    Idle,
    Running,
}

#[derive(Debug)]
pub enum RunNow {
    Completed(CycleReport),
    Failed(anyhow::Error),
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct Counters {
    cycles_started: AtomicU64,
    ticks_dropped: AtomicU64,
}

struct Timer {
    period: Duration,
    task: JoinHandle<()>,
}

pub struct ScrapeScheduler {
    job: Arc<dyn ScrapeJob>,
    intervals: Arc<dyn IntervalSource>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    timer: Mutex<Option<Timer>>,
}

impl ScrapeScheduler {
    pub fn new(job: Arc<dyn ScrapeJob>, intervals: Arc<dyn IntervalSource>) -> Self {
        Self {
            job,
            intervals,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            timer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else if self.lock_timer().is_some() {
            SchedulerState::Idle
        } else {
            SchedulerState::Disabled
        }
    }

    /// Current timer period, `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        self.lock_timer().as_ref().map(|t| t.period)
    }

    pub fn cycles_started(&self) -> u64 {
        self.counters.cycles_started.load(Ordering::Relaxed)
    }

    pub fn ticks_dropped(&self) -> u64 {
        self.counters.ticks_dropped.load(Ordering::Relaxed)
    }

    /// Arm the timer from the stored interval. No-op when already armed.
    pub async fn start(&self) -> SchedulerState {
        if self.lock_timer().is_some() {
            return self.state();
        }
        self.reload().await
    }

    /// Re-read the interval and re-arm. On a read failure the current
    /// timer is left as it is.
    pub async fn reload(&self) -> SchedulerState {
        match self.intervals.interval_minutes().await {
            Ok(minutes) => self.reconfigure(minutes),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to read scrape interval, keeping current timer");
                self.state()
            }
        }
    }

    /// Cancel the current timer and arm a new one every `minutes`.
    /// `minutes <= 0` leaves the scheduler disabled. A cycle already in
    /// flight is not interrupted.
    pub fn reconfigure(&self, minutes: i64) -> SchedulerState {
        {
            let mut timer = self.lock_timer();
            if let Some(old) = timer.take() {
                old.task.abort();
            }

            if minutes <= 0 {
                info!(minutes, "Scrape interval disabled");
            } else {
                let period = period_for(minutes);
                let task = tokio::spawn(tick_loop(
                    Instant::now() + period,
                    period,
                    self.job.clone(),
                    self.running.clone(),
                    self.counters.clone(),
                ));
                *timer = Some(Timer { period, task });
                info!(minutes, "Scrape interval armed");
            }
        }
        self.state()
    }

    /// Disarm the timer. A running cycle finishes on its own.
    pub fn stop(&self) {
        if let Some(old) = self.lock_timer().take() {
            old.task.abort();
            info!("Scrape scheduler stopped");
        }
    }

    /// Run a cycle now, outside the timer, unless one is already running.
    pub async fn run_now(&self) -> RunNow {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            info!("Scrape cycle already running, skipping manual run");
            return RunNow::AlreadyRunning;
        };
        self.counters.cycles_started.fetch_add(1, Ordering::Relaxed);
        match self.job.run_cycle().await {
            Ok(report) => {
                info!(%report, "Manual scrape cycle finished");
                RunNow::Completed(report)
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Manual scrape cycle failed");
                RunNow::Failed(e)
            }
        }
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<Timer>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ScrapeScheduler {
    fn drop(&mut self) {
        if let Some(old) = self.lock_timer().take() {
            old.task.abort();
        }
    }
}

async fn tick_loop(
    first_tick: Instant,
    period: Duration,
    job: Arc<dyn ScrapeJob>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
) {
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(guard) = RunningGuard::acquire(&running) else {
            counters.ticks_dropped.fetch_add(1, Ordering::Relaxed);
            info!("Scrape interval: already running, skipping");
            continue;
        };

        counters.cycles_started.fetch_add(1, Ordering::Relaxed);
        let job = job.clone();
        // Own task so re-arming the timer never cancels a cycle mid-write.
        tokio::spawn(async move {
            let _guard = guard;
            match job.run_cycle().await {
                Ok(report) => info!(%report, "Scrape cycle finished"),
                Err(e) => error!(error = %format!("{e:#}"), "Scrape cycle failed"),
            }
        });
    }
}

/// Holds the running flag; clears it on drop, including on panic.
fn period_for(minutes: i64) -> Duration {
    match minutes.unsigned_abs().checked_mul(60).map(Duration::from_secs) {
        Some(period) if period <= MAX_PERIOD => period,
        _ => {
            warn!(minutes, max_secs = MAX_PERIOD.as_secs(), "Scrape interval too long, clamping");
            MAX_PERIOD
        }
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

//! Fixed-cadence tick scheduler for utylink.
//!
//! The game exposes nothing but files, so every local change is found by
//! polling. Each poller (the item/location watcher, the peer-position
//! relay) owns a [`TickScheduler`] and awaits it inside the engine's
//! `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* server message, operator flag */ }
//!         _ = watcher.wait_for_tick() => {
//!             engine.watcher_tick();
//!             watcher.record_tick_end();
//!         }
//!     }
//! }
//! ```
//!
//! A paused scheduler pends forever, which is how the engine stalls while
//! there is no server session. A rate of 0 disables the poller entirely.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// What to do when a tick fires late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Forget the missed ticks and schedule the next one a full period
    /// from now. Polling has no use for a burst of stale scans.
    #[default]
    Skip,
    /// Keep the original cadence; the next deadline is the missed one
    /// plus one period, which may already be due.
    Drop,
}

/// Configuration for a [`TickScheduler`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz. 0 disables ticking.
    pub tick_rate_hz: u32,
    /// Late-tick handling.
    pub policy: TickPolicy,
    /// Fraction of the period (0.0–1.0) a tick body may use before a
    /// warning is logged. Filesystem scans that eat most of the period
    /// usually mean the interface directory is on a slow disk.
    pub budget_warn_threshold: f64,
    /// Random delay (0–max µs) before the first tick so that pollers
    /// created together don't hit the directory in lockstep.
    pub initial_jitter_us: u64,
    /// Start paused; the first tick waits for [`TickScheduler::resume`].
    pub start_paused: bool,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 10,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.8,
            initial_jitter_us: 5_000,
            start_paused: false,
        }
    }
}

impl TickConfig {
    /// Highest accepted rate. Polling faster than this only burns IO.
    pub const MAX_TICK_RATE_HZ: u32 = 100;

    /// A config for the given rate with default everything else.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick rate above maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// The tick period, or `None` when ticking is disabled.
    pub fn period(&self) -> Option<Duration> {
        (self.tick_rate_hz > 0).then(|| Duration::from_secs_f64(1.0 / self.tick_rate_hz as f64))
    }
}

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// `true` if the scheduler woke more than 10% of a period late.
    pub late: bool,
    /// Whole periods that were skipped because of lateness.
    pub skipped: u64,
}

/// Counters kept by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub late_ticks: u64,
    pub skipped_ticks: u64,
    /// Longest tick body measured by [`TickScheduler::record_tick_end`].
    pub max_tick_time: Duration,
}

/// Fixed-cadence scheduler for one poller.
pub struct TickScheduler {
    name: &'static str,
    config: TickConfig,
    period: Option<Duration>,
    next_deadline: Option<TokioInstant>,
    body_started: Option<Instant>,
    tick_count: u64,
    paused: bool,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// Creates a scheduler. `name` labels its log lines.
    pub fn new(name: &'static str, config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.period();
        let jitter = match config.initial_jitter_us {
            0 => Duration::ZERO,
            max => Duration::from_micros(rand::rng().random_range(0..max)),
        };
        let next_deadline = period.map(|p| TokioInstant::now() + p + jitter);

        debug!(
            poller = name,
            rate_hz = config.tick_rate_hz,
            paused = config.start_paused,
            "tick scheduler created"
        );

        Self {
            name,
            paused: config.start_paused,
            config,
            period,
            next_deadline,
            body_started: None,
            tick_count: 0,
            metrics: TickMetrics::default(),
        }
    }

    /// Waits for the next tick.
    ///
    /// Pends forever while paused or disabled; `select!` keeps serving its
    /// other branches in the meantime.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (deadline, period) = match (self.next_deadline, self.period) {
            (Some(deadline), Some(period)) if !self.paused => (deadline, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(deadline).await;

        let now = TokioInstant::now();
        let late_by = now.saturating_duration_since(deadline);
        let late = late_by > period / 10;
        let skipped = if late {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };

        self.next_deadline = Some(match self.config.policy {
            TickPolicy::Skip => now + period,
            TickPolicy::Drop => deadline + period,
        });
        if skipped > 0 {
            warn!(
                poller = self.name,
                tick = self.tick_count + 1,
                skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "poller fell behind"
            );
        }

        self.tick_count += 1;
        self.body_started = Some(Instant::now());
        self.metrics.total_ticks += 1;
        self.metrics.late_ticks += u64::from(late);
        self.metrics.skipped_ticks += skipped;
        trace!(poller = self.name, tick = self.tick_count, late, "tick");

        TickInfo {
            tick: self.tick_count,
            late,
            skipped,
        }
    }

    /// Marks the end of the current tick body for budget tracking.
    pub fn record_tick_end(&mut self) {
        let (Some(started), Some(period)) = (self.body_started.take(), self.period) else {
            return;
        };
        let elapsed = started.elapsed();
        self.metrics.max_tick_time = self.metrics.max_tick_time.max(elapsed);

        let used = elapsed.as_secs_f64() / period.as_secs_f64();
        if used >= self.config.budget_warn_threshold {
            warn!(
                poller = self.name,
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = period.as_secs_f64() * 1000.0,
                "tick body close to its period"
            );
        }
    }

    /// Stops ticking until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(poller = self.name, tick = self.tick_count, "poller paused");
        }
    }

    /// Resumes ticking; the next tick is one full period from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.next_deadline = self.period.map(|p| TokioInstant::now() + p);
            debug!(poller = self.name, tick = self.tick_count, "poller resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// `true` if the rate is 0 and the scheduler never fires.
    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

//! Recurring and manual invocation of dispatch cycles.
//!
//! One `SchedulerHandle` is built at startup and cloned into whatever needs
//! it. Enabling spawns a tick task that sleeps for the interval captured at
//! enable time, runs the cycle on its own task, then re-arms. Disabling
//! signals the tick task through a `watch` channel; a cycle already running
//! is allowed to finish and its result is simply recorded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::DispatchError;
use crate::models::event::DispatchEvent;
use crate::models::schedule::{CycleSummary, DispatchTrigger, ScheduleStatus, SchedulerState};
use crate::observability::metrics::Metrics;

pub type CycleFuture = BoxFuture<'static, Result<CycleSummary, DispatchError>>;

/// A full dispatch cycle, invoked once per tick or manual trigger.
pub type CycleFn = Arc<dyn Fn(DispatchTrigger) -> CycleFuture + Send + Sync>;

#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    core: Mutex<ScheduleCore>,
    dispatch_count: AtomicU64,
    missed_cycles: AtomicU64,
    events_tx: broadcast::Sender<DispatchEvent>,
    metrics: Metrics,
}

struct ScheduleCore {
    state: SchedulerState,
    interval_seconds: u64,
    /// Interval the running tick loop was enabled with.
    active_interval_seconds: Option<u64>,
    generation: u64,
    cancel_tx: Option<watch::Sender<bool>>,
    last_summary: Option<CycleSummary>,
}

impl SchedulerHandle {
    pub fn new(
        interval_seconds: u64,
        events_tx: broadcast::Sender<DispatchEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                core: Mutex::new(ScheduleCore {
                    state: SchedulerState::Disabled,
                    interval_seconds: interval_seconds.max(1),
                    active_interval_seconds: None,
                    generation: 0,
                    cancel_tx: None,
                    last_summary: None,
                }),
                dispatch_count: AtomicU64::new(0),
                missed_cycles: AtomicU64::new(0),
                events_tx,
                metrics,
            }),
        }
    }

    /// Arms the schedule. Returns `false` if it was already enabled.
    pub fn enable(&self, cycle_fn: CycleFn) -> bool {
        let (generation, interval) = {
            let mut core = self.inner.core.lock();
            if core.cancel_tx.is_some() {
                return false;
            }

            let (cancel_tx, cancel_rx) = watch::channel(false);
            core.generation += 1;
            core.cancel_tx = Some(cancel_tx);
            core.active_interval_seconds = Some(core.interval_seconds);
            let interval = Duration::from_secs(core.interval_seconds);
            core.state = SchedulerState::Armed {
                next_run_at: next_run_after(Utc::now(), core.interval_seconds),
            };

            tokio::spawn(self.clone().tick_loop(cycle_fn, core.generation, interval, cancel_rx));
            (core.generation, interval)
        };

        self.inner.metrics.auto_dispatch_enabled.set(1);
        info!(generation, interval_secs = interval.as_secs(), "auto dispatch enabled");
        true
    }

    /// Stops future ticks. Safe to call in any state, any number of times.
    pub fn disable(&self) {
        let was_enabled = {
            let mut core = self.inner.core.lock();
            core.state = SchedulerState::Disabled;
            core.active_interval_seconds = None;
            match core.cancel_tx.take() {
                Some(cancel_tx) => {
                    let _ = cancel_tx.send(true);
                    true
                }
                None => false,
            }
        };

        self.inner.metrics.auto_dispatch_enabled.set(0);
        if was_enabled {
            info!("auto dispatch disabled");
        }
    }

    /// Runs a cycle now. The scheduled tick, if any, is left untouched and
    /// may overlap with this run.
    pub async fn trigger_manual(&self, cycle_fn: CycleFn) -> Result<CycleSummary, DispatchError> {
        info!("manual dispatch triggered");
        self.run_guarded(cycle_fn, DispatchTrigger::Manual).await
    }

    /// New interval; applies from the next `enable`. Until then `status`
    /// reports it as pending.
    pub fn set_interval(&self, seconds: u64) -> Result<(), DispatchError> {
        if seconds == 0 {
            return Err(DispatchError::InvalidInterval(seconds));
        }

        let mut core = self.inner.core.lock();
        core.interval_seconds = seconds;
        if core.cancel_tx.is_some() {
            info!(interval_secs = seconds, "interval stored; re-enable to apply");
        }
        Ok(())
    }

    pub fn record_dispatch(&self) {
        self.inner.dispatch_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn cumulative_dispatch_count(&self) -> u64 {
        self.inner.dispatch_count.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.core.lock().cancel_tx.is_some()
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.core.lock().state
    }

    /// Countdown is derived from `now`; it is for display only.
    pub fn status(&self, now: DateTime<Utc>) -> ScheduleStatus {
        let core = self.inner.core.lock();
        let next_run_at = match core.state {
            SchedulerState::Armed { next_run_at } => Some(next_run_at),
            _ => None,
        };

        ScheduleStatus {
            state: core.state,
            enabled: core.cancel_tx.is_some(),
            interval_seconds: core.active_interval_seconds.unwrap_or(core.interval_seconds),
            pending_interval_seconds: core
                .active_interval_seconds
                .filter(|active| *active != core.interval_seconds)
                .map(|_| core.interval_seconds),
            next_run_at,
            countdown_seconds: next_run_at.map(|next| (next - now).num_seconds().max(0)),
            cumulative_dispatch_count: self.inner.dispatch_count.load(Ordering::SeqCst),
            missed_cycles: self.inner.missed_cycles.load(Ordering::SeqCst),
            last_cycle_summary: core.last_summary.clone(),
        }
    }

    async fn tick_loop(
        self,
        cycle_fn: CycleFn,
        generation: u64,
        interval: Duration,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = sleep(interval) => {}
                _ = cancel_rx.changed() => break,
            }

            if !self.begin_tick(generation) {
                break;
            }

            let _ = self
                .run_guarded(cycle_fn.clone(), DispatchTrigger::Scheduled)
                .await;

            if !self.rearm(generation, interval) {
                break;
            }
        }

        info!(generation, "dispatch tick loop stopped");
    }

    fn begin_tick(&self, generation: u64) -> bool {
        let mut core = self.inner.core.lock();
        if core.generation != generation || core.cancel_tx.is_none() {
            return false;
        }
        core.state = SchedulerState::Running;
        true
    }

    /// Re-arms with the interval the loop was enabled with.
    fn rearm(&self, generation: u64, interval: Duration) -> bool {
        let mut core = self.inner.core.lock();
        if core.generation != generation || core.cancel_tx.is_none() {
            return false;
        }
        core.state = SchedulerState::Armed {
            next_run_at: next_run_after(Utc::now(), interval.as_secs()),
        };
        true
    }

    /// Runs the cycle on its own task so a panic inside it becomes a missed
    /// cycle instead of taking the tick loop down.
    async fn run_guarded(
        &self,
        cycle_fn: CycleFn,
        trigger: DispatchTrigger,
    ) -> Result<CycleSummary, DispatchError> {
        let outcome = tokio::spawn(async move { cycle_fn(trigger).await }).await;

        match outcome {
            Ok(Ok(summary)) => {
                self.inner.core.lock().last_summary = Some(summary.clone());
                Ok(summary)
            }
            Ok(Err(err)) => {
                self.inner.missed_cycles.fetch_add(1, Ordering::SeqCst);
                warn!(trigger = ?trigger, error = %err, "dispatch cycle missed");
                Err(err)
            }
            Err(join_err) => {
                self.inner.missed_cycles.fetch_add(1, Ordering::SeqCst);
                self.inner
                    .metrics
                    .dispatch_cycles_total
                    .with_label_values(&["missed"])
                    .inc();
                error!(trigger = ?trigger, error = %join_err, "dispatch cycle panicked");
                let message = format!("cycle task failed: {join_err}");
                let _ = self.inner.events_tx.send(DispatchEvent::CycleMissed {
                    trigger,
                    error: message.clone(),
                });
                Err(DispatchError::CycleAborted(message))
            }
        }
    }
}

fn next_run_after(now: DateTime<Utc>, interval_seconds: u64) -> DateTime<Utc> {
    now + chrono::Duration::seconds(interval_seconds as i64)
}

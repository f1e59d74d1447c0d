//! Scheduler loop: finds due senders every tick and fires them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::broadcast::error::SchedulerError;
use crate::broadcast::fire::{Broadcaster, FireReport};
use crate::broadcast::registry::SharedRegistry;
use crate::broadcast::sender::SenderKey;

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_CONCURRENT_FIRES: usize = 4;
pub const DEFAULT_FIRE_TIMEOUT: Duration = Duration::from_secs(180);

/// Drives every `PeriodicSender` in the registry.
///
/// Due senders are claimed under the registry lock, then each fire runs as
/// its own task, at most `max_concurrent` at a time. A fire that panics or
/// outlives `fire_timeout` is still closed out, so its sender keeps a future
/// due time.
#[derive(Clone)]
pub struct Scheduler {
    registry: SharedRegistry,
    broadcaster: Arc<Broadcaster>,
    workers: Arc<Semaphore>,
    tick: Duration,
    retry_delay: Duration,
    fire_timeout: Duration,
}

impl Scheduler {
    pub fn new(registry: SharedRegistry, broadcaster: Arc<Broadcaster>, max_concurrent: usize) -> Self {
        Self {
            registry,
            broadcaster,
            workers: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tick: DEFAULT_TICK,
            retry_delay: DEFAULT_RETRY_DELAY,
            fire_timeout: DEFAULT_FIRE_TIMEOUT,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Longest a fire may run, not counting the wait for a worker.
    pub fn with_fire_timeout(mut self, fire_timeout: Duration) -> Self {
        self.fire_timeout = fire_timeout;
        self
    }

    /// Stop accepting fires. `run` returns on its next tick.
    pub fn close(&self) {
        self.workers.close();
    }

    /// Claim every sender due at `now` and start its fire.
    ///
    /// Does not wait for workers: each fire task waits for its own permit.
    /// The returned handles resolve once the fire is done and the sender has
    /// been rescheduled; `None` means the fire panicked, timed out, or never
    /// got a worker because the pool was closed.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<Vec<JoinHandle<Option<FireReport>>>, SchedulerError> {
        if self.workers.is_closed() {
            return Err(SchedulerError::PoolClosed);
        }
        let due = self.registry.lock().await.take_due(now);

        let handles = due
            .into_iter()
            .map(|key| {
                let registry = self.registry.clone();
                let broadcaster = self.broadcaster.clone();
                let workers = self.workers.clone();
                let fire_timeout = self.fire_timeout;
                tokio::spawn(async move {
                    let report = match workers.acquire_owned().await {
                        Ok(_permit) => run_fire(broadcaster, key, fire_timeout).await,
                        Err(_) => {
                            debug!("Worker pool closed before {} could fire", key);
                            None
                        }
                    };
                    let finished_at = now.max(Utc::now());
                    match registry.lock().await.finish_fire(key, finished_at) {
                        Some(next) => debug!("Sender {} next due at {}", key, next),
                        None => info!("Sender {} was stopped during its fire", key),
                    }
                    report
                })
            })
            .collect();

        Ok(handles)
    }

    /// Tick forever. Each iteration runs in its own task so that a panic is
    /// logged and followed by `retry_delay` instead of ending the loop.
    pub async fn run(self) {
        info!("Scheduler running (tick {:?})", self.tick);
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let this = self.clone();
            let iteration = tokio::spawn(async move { this.dispatch_due(Utc::now()).await });

            match iteration.await {
                Ok(Ok(handles)) => {
                    if !handles.is_empty() {
                        info!("Firing {} due sender(s)", handles.len());
                    }
                }
                Ok(Err(SchedulerError::PoolClosed)) => {
                    info!("Scheduler stopped");
                    return;
                }
                Err(e) => {
                    error!("Error in scheduler tick: {}", e);
                    sleep(self.retry_delay).await;
                }
            }
        }
    }
}

/// Run one fire in its own task so a panic surfaces as a `JoinError`, and
/// abort it once `fire_timeout` has passed.
async fn run_fire(broadcaster: Arc<Broadcaster>, key: SenderKey, fire_timeout: Duration) -> Option<FireReport> {
    let mut fire = tokio::spawn(async move { broadcaster.fire(key).await });
    match timeout(fire_timeout, &mut fire).await {
        Ok(Ok(report)) => {
            if !report.is_success() {
                warn!("Fire for {} finished with errors", key);
            }
            Some(report)
        }
        Ok(Err(e)) => {
            error!("Fire for {} aborted: {}", key, e);
            None
        }
        Err(_) => {
            fire.abort();
            error!("Fire for {} timed out after {:?}", key, fire_timeout);
            None
        }
    }
}

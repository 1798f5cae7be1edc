//! Sync scheduler - the periodic refresh timer and the keep-alive timer
//!
//! Timers are named tokio tasks. Arming a timer that already exists replaces
//! it under the same lock, so there is never more than one task per name.
//! A failed tick is logged and the timer keeps running. Every tick also
//! re-reads the stored interval, so a change made by another activation
//! reaches a running monitor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::domain::result::{Error, Result};
use crate::domain::RefreshSchedule;
use crate::ports::{keys, KeyValueStore};
use crate::services::BalanceService;

pub const REFRESH_TIMER: &str = "autoRefresh";
pub const KEEP_ALIVE_TIMER: &str = "keepAlive";

struct Timer {
    period: Duration,
    handle: JoinHandle<()>,
}

/// A live timer, as reported by [`SyncScheduler::armed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmedTimer {
    pub name: &'static str,
    pub period_secs: u64,
}

pub struct SyncScheduler {
    inner: Arc<Timers>,
}

/// State shared with the timer tasks (they hold it weakly)
struct Timers {
    balance: Arc<BalanceService>,
    store: Arc<dyn KeyValueStore>,
    keep_alive_period: Duration,
    live: Mutex<HashMap<&'static str, Timer>>,
}

impl SyncScheduler {
    pub fn new(
        balance: Arc<BalanceService>,
        store: Arc<dyn KeyValueStore>,
        keep_alive_period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Timers {
                balance,
                store,
                keep_alive_period,
                live: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Arm the refresh timer; the first tick is one full period from now
    ///
    /// A live timer with the same period is left running so repeated
    /// activations do not keep pushing the next tick back.
    pub fn arm(&self, schedule: RefreshSchedule) -> Result<()> {
        self.inner.arm(schedule)
    }

    /// Arm the keep-alive timer, which only reads the store
    pub fn arm_keep_alive(&self) -> Result<()> {
        self.inner.arm_keep_alive()
    }

    /// Cancel the refresh timer
    pub fn disarm(&self) {
        if let Some(timer) = self.inner.timers().remove(REFRESH_TIMER) {
            timer.handle.abort();
            tracing::info!("refresh timer cancelled");
        }
    }

    /// Cancel every timer
    pub fn disarm_all(&self) {
        for (name, timer) in self.inner.timers().drain() {
            timer.handle.abort();
            tracing::debug!(timer = name, "timer cancelled");
        }
    }

    /// Timers that are currently live, sorted by name
    pub fn armed(&self) -> Vec<ArmedTimer> {
        let mut armed: Vec<ArmedTimer> = self
            .inner
            .timers()
            .iter()
            .filter(|(_, timer)| !timer.handle.is_finished())
            .map(|(name, timer)| ArmedTimer {
                name: *name,
                period_secs: timer.period.as_secs(),
            })
            .collect();
        armed.sort_by_key(|t| t.name);
        armed
    }

    /// Period of the live refresh timer
    pub fn refresh_period(&self) -> Option<Duration> {
        self.inner.refresh_period()
    }
}

impl Timers {
    fn arm(self: &Arc<Self>, schedule: RefreshSchedule) -> Result<()> {
        let timers = Arc::downgrade(self);
        self.install(REFRESH_TIMER, schedule.period(), move || {
            let timers = timers.clone();
            async move {
                let Some(timers) = timers.upgrade() else {
                    return;
                };
                if let Err(e) = timers.balance.fetch_balance().await {
                    tracing::warn!(error = %e, "scheduled refresh failed");
                }
                timers.follow_stored_schedule().await;
            }
        })?;
        tracing::info!(minutes = schedule.interval_minutes, "refresh timer armed");
        Ok(())
    }

    fn arm_keep_alive(self: &Arc<Self>) -> Result<()> {
        let timers = Arc::downgrade(self);
        self.install(KEEP_ALIVE_TIMER, self.keep_alive_period, move || {
            let timers: Weak<Timers> = timers.clone();
            async move {
                let Some(timers) = timers.upgrade() else {
                    return;
                };
                match timers.store.touch().await {
                    Ok(()) => tracing::trace!("keep-alive"),
                    Err(e) => tracing::warn!(error = %e, "keep-alive read failed"),
                }
                timers.follow_stored_schedule().await;
            }
        })
    }

    /// Re-arm the refresh timer when the stored interval no longer matches it
    ///
    /// Nothing happens while the refresh timer is disarmed or no interval
    /// is stored.
    async fn follow_stored_schedule(self: &Arc<Self>) {
        let Some(current) = self.refresh_period() else {
            return;
        };
        let stored = match self.store.get_one(keys::REFRESH_INTERVAL).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "could not read the refresh interval");
                return;
            }
        };

        let schedule = RefreshSchedule::from_stored(Some(&stored));
        if schedule.period() != current {
            tracing::info!(
                minutes = schedule.interval_minutes,
                "stored refresh interval changed"
            );
            if let Err(e) = self.arm(schedule) {
                tracing::warn!(error = %e, "could not re-arm the refresh timer");
            }
        }
    }

    fn refresh_period(&self) -> Option<Duration> {
        self.timers()
            .get(REFRESH_TIMER)
            .filter(|timer| !timer.handle.is_finished())
            .map(|timer| timer.period)
    }

    fn install<F, Fut>(&self, name: &'static str, period: Duration, tick: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("timers need a tokio runtime: {}", e)))?;

        let mut timers = self.timers();
        if let Some(existing) = timers.get(name) {
            if existing.period == period && !existing.handle.is_finished() {
                tracing::debug!(timer = name, "timer already armed with this period");
                return Ok(());
            }
        }

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tick().await;
            }
        });

        // Replacing a timer from its own tick aborts the running task at its
        // next await, after the new timer is already in place
        if let Some(previous) = timers.insert(name, Timer { period, handle }) {
            previous.handle.abort();
        }
        Ok(())
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<&'static str, Timer>> {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.disarm_all();
    }
}

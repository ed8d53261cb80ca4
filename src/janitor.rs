//! Periodic sweep of expired cache entries and rate-limit windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::rate_limiter::{RateLimiter, RateLimiters};

/// Anything holding state that expires without being read again.
pub trait Sweep: Send + Sync {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    /// Remove expired state, returning how much was removed.
    fn sweep(&self) -> usize;
}

impl<V: Clone + Send> Sweep for TtlCache<V> {
    fn name(&self) -> &str {
        TtlCache::name(self)
    }

    fn len(&self) -> usize {
        TtlCache::len(self)
    }

    fn sweep(&self) -> usize {
        self.cleanup()
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &str {
        RateLimiter::name(self)
    }

    fn len(&self) -> usize {
        self.tracked_identifiers()
    }

    fn sweep(&self) -> usize {
        self.cleanup_expired()
    }
}

impl Sweep for RateLimiters {
    fn name(&self) -> &str {
        "rate_limiters"
    }

    fn len(&self) -> usize {
        self.api.tracked_identifiers()
            + self.search.tracked_identifiers()
            + self.auth.tracked_identifiers()
    }

    fn sweep(&self) -> usize {
        self.api.cleanup_expired() + self.search.cleanup_expired() + self.auth.cleanup_expired()
    }
}

/// One pass over every target.
pub fn sweep_all(targets: &[Arc<dyn Sweep>]) -> usize {
    targets
        .iter()
        .map(|target| {
            let removed = target.sweep();
            if removed > 0 {
                debug!(store = target.name(), removed, remaining = target.len(), "Swept expired entries");
            }
            removed
        })
        .sum()
}

/// Running janitor task. Aborted on drop; use [`JanitorHandle::stop`] for a clean stop.
pub struct JanitorHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl JanitorHandle {
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for JanitorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Sweep `targets` every `every`, starting one interval from now.
///
/// A zero interval is treated as one second.
pub fn spawn_janitor(targets: Vec<Arc<dyn Sweep>>, every: Duration) -> JanitorHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let every = if every.is_zero() {
        Duration::from_secs(1)
    } else {
        every
    };

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = sweep_all(&targets);
                    if removed > 0 {
                        info!(removed, "Janitor removed expired entries");
                    }
                }
                _ = &mut stop_rx => {
                    debug!("Janitor stopped");
                    break;
                }
            }
        }
    });

    JanitorHandle {
        stop_tx: Some(stop_tx),
        task: Some(task),
    }
}

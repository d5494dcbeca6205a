//! Cancellable retention timers clearing buffers after a fixed period.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

/// Something a retention timer can clear.
pub trait Evictable: Send + Sync {
    /// Clears retained contents and marks them stale.
    fn evict(&self);
}

/// Converts a configured retention in seconds into a period; `-1` (or any
/// non-positive value) disables eviction.
#[must_use]
pub fn retention_period(seconds: i64) -> Option<Duration> {
    u64::try_from(seconds)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Handle to an armed retention timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct RetentionHandle {
    period: Duration,
    task: JoinHandle<()>,
}

impl RetentionHandle {
    /// Arms a timer on the current tokio runtime that evicts `target` once
    /// per `period`, first firing one full period from now.
    ///
    /// The timer holds a weak reference and stops once the target is gone.
    pub fn spawn<T>(target: &Arc<T>, period: Duration) -> Result<Self>
    where
        T: Evictable + 'static,
    {
        let runtime = Handle::try_current().context("retention timer needs a tokio runtime")?;
        let weak: Weak<T> = Arc::downgrade(target);
        let task = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(target) = weak.upgrade() else {
                    break;
                };
                target.evict();
            }
        });
        Ok(Self { period, task })
    }

    /// Configured period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Stops the timer; no eviction happens after this returns.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// True until the timer is cancelled or its target is dropped.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RetentionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl Evictable for Counter {
        fn evict(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn negative_or_zero_disables() {
        assert_eq!(retention_period(-1), None);
        assert_eq!(retention_period(0), None);
        assert_eq!(retention_period(2), Some(Duration::from_secs(2)));
    }

    #[test]
    fn spawn_outside_runtime_fails() {
        let counter = Arc::new(Counter::default());
        assert!(RetentionHandle::spawn(&counter, Duration::from_millis(5)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_each_period_until_cancelled() {
        let counter = Arc::new(Counter::default());
        let handle = RetentionHandle::spawn(&counter, Duration::from_millis(50)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        handle.cancel();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let counter = Arc::new(Counter::default());
        let handle = RetentionHandle::spawn(&counter, Duration::from_millis(10)).unwrap();
        drop(handle);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}

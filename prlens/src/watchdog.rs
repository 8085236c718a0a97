//! Inactivity watchdog for one phase stream.
//!
//! The orchestrator touches the watchdog on every executor event; a
//! background poll task checks elapsed idle time on every tick and signals
//! once when the window is exceeded. Tracking uses an atomic millisecond
//! counter relative to spawn time, so `touch` is lock-free and callable from
//! the hot event loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

pub struct Watchdog {
    started: Instant,
    last_activity_ms: Arc<AtomicU64>,
    fired: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    poll_task: JoinHandle<()>,
}

impl Watchdog {
    /// Starts the poll task. The idle clock begins at spawn, so a stream
    /// that never produces a single event still times out.
    pub fn spawn(timeout: Duration, poll_every: Duration) -> Self {
        let started = Instant::now();
        let last_activity_ms = Arc::new(AtomicU64::new(0));
        let fired = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));

        let poll_task = tokio::spawn({
            let last_activity_ms = Arc::clone(&last_activity_ms);
            let fired = Arc::clone(&fired);
            let cancelled = Arc::clone(&cancelled);
            async move {
                let mut ticker = interval(poll_every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await; // first tick completes immediately
                loop {
                    ticker.tick().await;
                    if cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    let now_ms = started.elapsed().as_millis() as u64;
                    let idle_ms = now_ms.saturating_sub(last_activity_ms.load(Ordering::Acquire));
                    if idle_ms >= timeout.as_millis() as u64 {
                        // notify_one stores a permit, so a listener that
                        // subscribes after the fact still observes it.
                        fired.notify_one();
                        return;
                    }
                }
            }
        });

        Watchdog {
            started,
            last_activity_ms,
            fired,
            cancelled,
            poll_task,
        }
    }

    /// Records activity; resets the idle window.
    pub fn touch(&self) {
        let now_ms = self.started.elapsed().as_millis() as u64;
        self.last_activity_ms.store(now_ms, Ordering::Release);
    }

    /// Resolves once the idle window has been exceeded. Never resolves on a
    /// watchdog that was cancelled first.
    pub async fn timed_out(&self) {
        self.fired.notified().await;
    }

    /// Stops the poll task. Idempotent: safe to call on both the success
    /// and the error path, and again after either.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.poll_task.abort();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_idle_window() {
        let wd = Watchdog::spawn(Duration::from_millis(100), Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(1), wd.timed_out())
            .await
            .expect("watchdog should fire");
    }

    #[tokio::test(start_paused = true)]
    async fn touch_defers_firing() {
        let wd = Watchdog::spawn(Duration::from_millis(100), Duration::from_millis(10));
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            wd.touch();
        }
        // 250ms elapsed with touches every 50ms: must not have fired yet.
        let early = tokio::time::timeout(Duration::from_millis(1), wd.timed_out()).await;
        assert!(early.is_err());
        tokio::time::timeout(Duration::from_secs(1), wd.timed_out())
            .await
            .expect("fires once touches stop");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_suppresses_firing() {
        let wd = Watchdog::spawn(Duration::from_millis(50), Duration::from_millis(10));
        wd.cancel();
        wd.cancel();
        let fired = tokio::time::timeout(Duration::from_millis(500), wd.timed_out()).await;
        assert!(fired.is_err());
    }
}

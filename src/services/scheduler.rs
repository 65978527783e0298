//! Periodic trigger for the backup job.

use std::{future::Future, time::Duration};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Fires a task once after `initial_delay`, then every `interval`.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Scheduler {
    pub fn new(initial_delay: Duration, interval: Duration) -> Self {
        Self {
            initial_delay,
            interval,
        }
    }

    /// Drive `task` until `shutdown` resolves. Returns how many times the
    /// task ran.
    ///
    /// A tick that comes due while the task is still running is delayed,
    /// never queued up. Shutdown does not interrupt a running task.
    pub async fn run<S, F, Fut>(&self, shutdown: S, mut task: F) -> usize
    where
        S: Future<Output = ()>,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = time::interval_at(Instant::now() + self.initial_delay, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            initial_delay_secs = self.initial_delay.as_secs(),
            interval_secs = self.interval.as_secs(),
            "scheduler started"
        );

        let mut runs = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    runs += 1;
                    debug!(run = runs, "scheduled run firing");
                    task().await;
                }
            }
        }

        info!(runs, "scheduler stopped");
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn scheduler() -> Scheduler {
        Scheduler::new(Duration::from_secs(60), Duration::from_secs(30 * 60))
    }

    #[tokio::test(start_paused = true)]
    async fn runs_after_initial_delay_then_on_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let shutdown = time::sleep(Duration::from_secs(60 + 2 * 30 * 60 + 1));

        let runs = scheduler()
            .run(shutdown, move || {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(runs, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_first_tick_runs_nothing() {
        let shutdown = time::sleep(Duration::from_secs(59));

        let runs = scheduler().run(shutdown, || async {}).await;

        assert_eq!(runs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_run_delays_rather_than_bursts() {
        let shutdown = time::sleep(Duration::from_secs(60 + 95 * 60));

        // Each run takes 45 minutes against a 30 minute interval.
        let runs = scheduler()
            .run(shutdown, || time::sleep(Duration::from_secs(45 * 60)))
            .await;

        // Runs start at 1m, 46m, 91m; the one due at 136m is past shutdown.
        assert_eq!(runs, 3);
    }
}

//! Per-connector polling cadence and the daily backup trigger (C12).
//!
//! Each connector gets its own `tokio::time::interval` loop; a `Mutex<()>` per
//! connector name enforces `max_instances=1` so a slow run is never overlapped by the
//! next tick rather than queued behind it, matching the Python scheduler's
//! `max_instances` semantics without pulling in an external cron crate.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{interval, Duration};

use crate::config::SchedulerConfig;

#[async_trait::async_trait]
pub trait ConnectorRun: Send + Sync {
    async fn run_once(&self, connector_name: &str) -> anyhow::Result<()>;
}

pub struct Scheduler<R: ConnectorRun> {
    config: SchedulerConfig,
    runner: Arc<R>,
    locks: HashMap<String, Arc<Mutex<()>>>,
}

impl<R: ConnectorRun + 'static> Scheduler<R> {
    pub fn new(config: SchedulerConfig, runner: Arc<R>) -> Self {
        Self {
            config,
            runner,
            locks: HashMap::new(),
        }
    }

    fn interval_for(&self, connector_name: &str) -> Duration {
        let secs = *self
            .config
            .connector_intervals_secs
            .get(connector_name)
            .unwrap_or(&self.config.default_interval_secs);
        Duration::from_secs(secs.max(1))
    }

    /// Spawns one interval-driven task per connector. Returns the join handles so the
    /// caller can await them (they run until cancelled).
    pub fn spawn_connectors(&mut self, connector_names: &[String]) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        for name in connector_names {
            let lock = self
                .locks
                .entry(name.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let period = self.interval_for(name);
            let runner = self.runner.clone();
            let name = name.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                loop {
                    ticker.tick().await;
                    let Ok(_guard) = lock.try_lock() else {
                        tracing::warn!(connector = %name, "previous run still in flight; skipping tick");
                        continue;
                    };
                    if let Err(e) = runner.run_once(&name).await {
                        tracing::error!(connector = %name, error = %e, "scheduled connector run failed");
                    }
                }
            }));
        }
        handles
    }

    /// Spawns the daily backup trigger at `backup_hour_utc`. The caller supplies the
    /// backup action; this crate treats backup/restore itself as out of scope (§1).
    pub fn spawn_daily_backup<F, Fut>(&self, action: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
    {
        let backup_hour = self.config.backup_hour_utc;
        tokio::spawn(async move {
            loop {
                let now = chrono::Utc::now();
                let next_run = next_occurrence_of_hour(now, backup_hour);
                let wait = (next_run - now).to_std().unwrap_or(Duration::from_secs(60));
                tokio::time::sleep(wait).await;
                if let Err(e) = action().await {
                    tracing::error!(error = %e, "daily backup trigger failed");
                }
            }
        })
    }
}

fn next_occurrence_of_hour(now: chrono::DateTime<chrono::Utc>, hour: u32) -> chrono::DateTime<chrono::Utc> {
    use chrono::Timelike;
    let today_at_hour = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .unwrap()
        .and_utc();
    if now.hour() < hour || (now.hour() == hour && now.minute() == 0 && now.second() == 0) {
        today_at_hour
    } else {
        today_at_hour + chrono::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ConnectorRun for CountingRunner {
        async fn run_once(&self, _connector_name: &str) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow_when_hour_passed() {
        let now: chrono::DateTime<chrono::Utc> = "2026-07-26T12:00:00Z".parse().unwrap();
        let next = next_occurrence_of_hour(now, 3);
        assert_eq!(next.date_naive(), now.date_naive() + chrono::Duration::days(1));
    }

    #[test]
    fn next_occurrence_stays_today_when_hour_not_reached() {
        let now: chrono::DateTime<chrono::Utc> = "2026-07-26T01:00:00Z".parse().unwrap();
        let next = next_occurrence_of_hour(now, 3);
        assert_eq!(next.date_naive(), now.date_naive());
    }

    #[tokio::test]
    async fn single_instance_guard_skips_concurrent_attempt() {
        let count = Arc::new(AtomicUsize::new(0));
        let runner = Arc::new(CountingRunner { count: count.clone() });
        let lock = Arc::new(Mutex::new(()));

        let lock_a = lock.clone();
        let runner_a = runner.clone();
        let first = tokio::spawn(async move {
            let _guard = lock_a.lock().await;
            runner_a.run_once("filesystem").await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A concurrent attempt while the first run holds the lock must be skipped,
        // not queued behind it.
        assert!(lock.try_lock().is_err());

        first.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

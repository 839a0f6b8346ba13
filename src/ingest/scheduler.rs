// src/ingest/scheduler.rs
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ingest::aggregator::Aggregator;
use crate::ingest::types::Category;

pub const ENV_SCHEDULE_SECS: &str = "SCHOLARSHIP_SCHEDULE_SECS";
pub const ENV_SCHEDULER_ENABLED: &str = "SCHOLARSHIP_SCHEDULER_ENABLED";
pub const ENV_RUN_ON_START: &str = "SCHOLARSHIP_RUN_ON_START";
pub const ENV_OVERLAP_POLICY: &str = "SCHOLARSHIP_OVERLAP_POLICY";

/// Six hours.
pub const DEFAULT_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// What a tick does while the previous run is still going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlapPolicy {
    Skip,
    Allow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestSchedulerCfg {
    pub interval_secs: u64,
    pub run_on_start: bool,
    pub policy: OverlapPolicy,
}

impl Default for IngestSchedulerCfg {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            run_on_start: false,
            policy: OverlapPolicy::Skip,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Whether main should spawn the scheduler at all (default on).
pub fn scheduler_enabled_from_env() -> bool {
    env_flag(ENV_SCHEDULER_ENABLED, true)
}

impl IngestSchedulerCfg {
    pub fn from_env() -> Self {
        let d = Self::default();
        let interval_secs = std::env::var(ENV_SCHEDULE_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(d.interval_secs);
        let policy = match std::env::var(ENV_OVERLAP_POLICY)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "allow" => OverlapPolicy::Allow,
            _ => OverlapPolicy::Skip,
        };
        Self {
            interval_secs,
            run_on_start: env_flag(ENV_RUN_ON_START, d.run_on_start),
            policy,
        }
    }
}

/// Periodically run a full aggregation over every registered source.
/// A failed run is logged and the next tick proceeds as usual.
pub fn spawn_scheduler(aggregator: Arc<Aggregator>, cfg: IngestSchedulerCfg) -> JoinHandle<()> {
    tokio::spawn(async move {
        let running = Arc::new(Mutex::new(()));
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // interval() fires immediately; swallow that tick unless asked to run now.
        if !cfg.run_on_start {
            ticker.tick().await;
        }

        tracing::info!(
            target: "scheduler",
            interval_secs = cfg.interval_secs,
            policy = ?cfg.policy,
            "scheduler started"
        );

        loop {
            ticker.tick().await;
            let guard = match cfg.policy {
                OverlapPolicy::Allow => None,
                OverlapPolicy::Skip => match running.clone().try_lock_owned() {
                    Ok(g) => Some(g),
                    Err(_) => {
                        counter!("ingest_runs_skipped_total").increment(1);
                        tracing::info!(target: "scheduler", "previous run still active, skipping tick");
                        continue;
                    }
                },
            };
            tokio::spawn(scheduled_run(aggregator.clone(), guard));
        }
    })
}

async fn scheduled_run(aggregator: Arc<Aggregator>, guard: Option<OwnedMutexGuard<()>>) {
    let started = Instant::now();
    let run = tokio::spawn(async move { aggregator.run_all(Category::All).await });
    match run.await {
        Ok(batch) => {
            counter!("ingest_runs_total").increment(1);
            let failed = batch.sources.iter().filter(|s| s.error.is_some()).count();
            tracing::info!(
                target: "scheduler",
                count = batch.count,
                sources = batch.sources.len(),
                failed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "scheduled run finished"
            );
        }
        Err(e) => {
            tracing::error!(target: "scheduler", error = %e, "scheduled run aborted");
        }
    }
    drop(guard);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::config::SourceRegistry;
    use crate::ingest::error::FetchError;
    use crate::ingest::fetcher::{Fetch, FetchRequest};
    use crate::ingest::types::{Mechanism, SourceDescriptor};
    use crate::relevance::RelevanceHandle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowFetcher {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Fetch for SlowFetcher {
        async fn fetch(&self, req: &FetchRequest) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Err(FetchError::Status {
                endpoint: req.endpoint.clone(),
                status: 500,
            })
        }
    }

    fn aggregator(delay_secs: u64) -> (Arc<Aggregator>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(SlowFetcher {
            delay: Duration::from_secs(delay_secs),
            calls: calls.clone(),
        });
        let registry = SourceRegistry::new(vec![SourceDescriptor::new(
            "feed",
            "https://feed.test/rss",
            Mechanism::Feed,
        )])
        .unwrap();
        let agg = Aggregator::new(registry, fetcher, RelevanceHandle::default());
        (Arc::new(agg), calls)
    }

    fn cfg(run_on_start: bool, policy: OverlapPolicy) -> IngestSchedulerCfg {
        IngestSchedulerCfg {
            interval_secs: 10,
            run_on_start,
            policy,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_waits_one_interval_by_default() {
        let (agg, calls) = aggregator(0);
        let h = spawn_scheduler(agg, cfg(false, OverlapPolicy::Skip));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        h.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_skipped() {
        // Each run takes 25s against a 10s interval: runs start at 0 and 30.
        let (agg, calls) = aggregator(25);
        let h = spawn_scheduler(agg, cfg(true, OverlapPolicy::Skip));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        h.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn allow_policy_starts_concurrent_runs() {
        let (agg, calls) = aggregator(25);
        let h = spawn_scheduler(agg, cfg(true, OverlapPolicy::Allow));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        h.abort();
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_defaults() {
        std::env::set_var(ENV_SCHEDULE_SECS, "60");
        std::env::set_var(ENV_RUN_ON_START, "true");
        std::env::set_var(ENV_OVERLAP_POLICY, "Allow");
        let c = IngestSchedulerCfg::from_env();
        assert_eq!(
            c,
            IngestSchedulerCfg {
                interval_secs: 60,
                run_on_start: true,
                policy: OverlapPolicy::Allow,
            }
        );

        std::env::set_var(ENV_SCHEDULE_SECS, "0");
        std::env::remove_var(ENV_RUN_ON_START);
        std::env::remove_var(ENV_OVERLAP_POLICY);
        assert_eq!(IngestSchedulerCfg::from_env(), IngestSchedulerCfg::default());
        std::env::remove_var(ENV_SCHEDULE_SECS);
    }
}

//! Refresh-and-cache pipeline.
//!
//! [`RefreshPipeline::refresh`] pulls the four sub-fetches from the metric
//! source, assembles a snapshot and writes it to the cache. It never fails past
//! its own boundary: every error is logged and folded into a
//! [`RefreshOutcome`], so a bad cycle cannot take down the scheduler.
//!
//! [`RefreshPipeline::get_cached_snapshot`] is the only read path the
//! presentation layer uses. It reads the cache tiers and only touches the
//! metric source on a cold start, when both tiers are empty.

pub mod scheduler;

pub use scheduler::RefreshScheduler;

use crate::cache::{CacheStore, PutReport};
use crate::snapshot::{self, Snapshot};
use crate::source::{MetricSource, SourceError, SubFetch, SummaryRow};
use crate::utils::{age_of, fmt_duration};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, watch};
use tracing::{error, info, instrument, warn};
use ts_rs::TS;

/// What a refresh does when every sub-fetch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalFailurePolicy {
    /// Write an all-empty snapshot so the dashboard shows zeros.
    #[default]
    WriteEmpty,
    /// Leave the current snapshot in place. With nothing cached yet, an empty
    /// snapshot is written as under `WriteEmpty`.
    KeepPrevious,
}

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Upper bound on each sub-fetch.
    pub fetch_timeout: Duration,
    /// Country names left out of the map query.
    pub excluded_countries: Vec<String>,
    pub on_total_failure: TotalFailurePolicy,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            excluded_countries: crate::source::DEFAULT_EXCLUDED_COUNTRIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            on_total_failure: TotalFailurePolicy::default(),
        }
    }
}

/// Where the pipeline currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RefreshPhase {
    Idle,
    Fetching,
    WritingCache,
}

/// Result of one refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A snapshot was written. `degraded` lists sub-fetches that fell back to empty.
    Refreshed {
        last_refreshed: DateTime<Utc>,
        degraded: Vec<SubFetch>,
        tiers: PutReport,
    },
    /// Every sub-fetch failed and an empty snapshot was written.
    FailedOpen {
        last_refreshed: DateTime<Utc>,
        tiers: PutReport,
    },
    /// Every sub-fetch failed and the previous snapshot was kept.
    Retained,
    /// Neither cache tier accepted the snapshot.
    NotWritten { degraded: Vec<SubFetch> },
}

impl RefreshOutcome {
    /// True when fresh upstream data reached the cache.
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefreshOutcome::Refreshed { degraded, .. } if degraded.is_empty() => "refreshed",
            RefreshOutcome::Refreshed { .. } => "degraded",
            RefreshOutcome::FailedOpen { .. } => "failed_open",
            RefreshOutcome::Retained => "retained",
            RefreshOutcome::NotWritten { .. } => "not_written",
        }
    }
}

/// Bookkeeping behind the "last refresh succeeded within N minutes" signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshHealth {
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl RefreshHealth {
    /// Whether the last successful refresh finished within `window` of `now`.
    pub fn is_healthy(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.last_success
            .is_some_and(|at| age_of(at, now) <= window)
    }
}

/// Resets the published phase to `Idle` when a cycle ends, including when the
/// future running it is dropped mid-cycle.
struct PhaseGuard<'a>(&'a watch::Sender<RefreshPhase>);

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a watch::Sender<RefreshPhase>) -> Self {
        phase.send_replace(RefreshPhase::Fetching);
        Self(phase)
    }

    fn set(&self, phase: RefreshPhase) {
        self.0.send_replace(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(RefreshPhase::Idle);
    }
}

/// Anything the metric source hands back that can be "empty".
trait FetchResult {
    fn is_empty(&self) -> bool;
}

impl<T> FetchResult for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl FetchResult for Option<SummaryRow> {
    fn is_empty(&self) -> bool {
        self.as_ref().is_none_or(SummaryRow::is_empty)
    }
}

/// Owns the metric source and cache store; constructed once at startup.
pub struct RefreshPipeline {
    source: Arc<dyn MetricSource>,
    store: CacheStore,
    settings: RefreshSettings,
    /// Held for the duration of a refresh so cycles never overlap.
    refresh_lock: Mutex<()>,
    phase: watch::Sender<RefreshPhase>,
    health: watch::Sender<RefreshHealth>,
}

impl RefreshPipeline {
    pub fn new(source: Arc<dyn MetricSource>, store: CacheStore, settings: RefreshSettings) -> Self {
        let (phase, _) = watch::channel(RefreshPhase::Idle);
        let (health, _) = watch::channel(RefreshHealth::default());
        Self {
            source,
            store,
            settings,
            refresh_lock: Mutex::new(()),
            phase,
            health,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn phase(&self) -> RefreshPhase {
        *self.phase.borrow()
    }

    pub fn health(&self) -> RefreshHealth {
        *self.health.borrow()
    }

    /// Run one refresh cycle. Waits for any refresh already in flight.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> RefreshOutcome {
        let _guard = self.refresh_lock.lock().await;
        self.run_cycle().await.0
    }

    /// The current snapshot for the presentation layer.
    ///
    /// Serves the fast tier, then the durable tier. When both miss, runs one
    /// synchronous refresh (shared by concurrent callers) and reads again.
    /// Always returns a well-formed snapshot, empty as a last resort.
    pub async fn get_cached_snapshot(&self) -> Arc<Snapshot> {
        if let Some(hit) = self.store.lookup().await {
            return hit.snapshot;
        }

        let produced = {
            let _guard = self.refresh_lock.lock().await;
            // Another caller may have filled the cache while we waited.
            if let Some(hit) = self.store.lookup().await {
                return hit.snapshot;
            }
            info!("No cached snapshot, refreshing on demand");
            self.run_cycle().await.1
        };

        if let Some(hit) = self.store.lookup().await {
            return hit.snapshot;
        }
        match produced {
            Some(snapshot) => {
                warn!("Cache tiers rejected the on-demand snapshot, serving it uncached");
                snapshot
            }
            None => {
                warn!("Cache still empty after on-demand refresh, serving empty snapshot");
                Arc::new(Snapshot::empty(Utc::now()))
            }
        }
    }

    /// One full cycle. Caller must hold `refresh_lock`.
    async fn run_cycle(&self) -> (RefreshOutcome, Option<Arc<Snapshot>>) {
        let start = Instant::now();
        let phase = PhaseGuard::enter(&self.phase);

        let source = self.source.as_ref();
        let excluded = self.settings.excluded_countries.as_slice();
        let (kpis, grid, map, summary) = tokio::join!(
            self.sub_fetch(SubFetch::Kpis, source.fetch_kpis()),
            self.sub_fetch(SubFetch::Grid, source.fetch_grid()),
            self.sub_fetch(SubFetch::Map, source.fetch_map(excluded)),
            self.sub_fetch(SubFetch::Summary, source.fetch_bidder_summary()),
        );

        let degraded: Vec<SubFetch> = [
            (SubFetch::Kpis, kpis.is_none()),
            (SubFetch::Grid, grid.is_none()),
            (SubFetch::Map, map.is_none()),
            (SubFetch::Summary, summary.is_none()),
        ]
        .into_iter()
        .filter_map(|(which, failed)| failed.then_some(which))
        .collect();
        let total_failure = degraded.len() == SubFetch::ALL.len();

        if total_failure && self.settings.on_total_failure == TotalFailurePolicy::KeepPrevious {
            if self.store.lookup().await.is_some() {
                warn!("Every sub-fetch failed, keeping the previous snapshot");
                self.record(false);
                return (RefreshOutcome::Retained, None);
            }
            warn!("Every sub-fetch failed and no snapshot is cached, writing an empty one");
        }

        let snapshot = Arc::new(snapshot::assemble(
            kpis,
            grid,
            map,
            summary.flatten(),
            Utc::now(),
        ));
        let last_refreshed = snapshot.last_refreshed;

        phase.set(RefreshPhase::WritingCache);
        let tiers = self.store.put(snapshot.clone()).await;
        drop(phase);

        let outcome = if !tiers.any_written() {
            error!(?degraded, "Snapshot could not be written to any cache tier");
            RefreshOutcome::NotWritten { degraded }
        } else if total_failure {
            warn!(%last_refreshed, "Every sub-fetch failed, wrote empty snapshot");
            RefreshOutcome::FailedOpen {
                last_refreshed,
                tiers,
            }
        } else {
            info!(
                %last_refreshed,
                kpis = snapshot.kpis.len(),
                map_rows = snapshot.map_rows.len(),
                degraded = ?degraded,
                fast = tiers.fast,
                durable = tiers.durable,
                duration = fmt_duration(start.elapsed()),
                "Snapshot refreshed"
            );
            RefreshOutcome::Refreshed {
                last_refreshed,
                degraded,
                tiers,
            }
        };

        self.record(outcome.is_success());
        (outcome, Some(snapshot))
    }

    /// Run one sub-fetch under the timeout, folding every failure into `None`.
    async fn sub_fetch<T, F>(&self, which: SubFetch, fetch: F) -> Option<T>
    where
        T: FetchResult,
        F: Future<Output = Result<T, SourceError>>,
    {
        let timeout = self.settings.fetch_timeout;
        let result = match tokio::time::timeout(timeout, AssertUnwindSafe(fetch).catch_unwind())
            .await
        {
            Ok(Ok(Ok(rows))) if rows.is_empty() => Err(SourceError::Empty),
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(SourceError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(SourceError::Timeout(timeout)),
        };

        match result {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(sub_fetch = %which, error = ?e, "Sub-fetch failed, using empty default");
                None
            }
        }
    }

    fn record(&self, success: bool) {
        let now = Utc::now();
        self.health.send_modify(|health| {
            health.last_attempt = Some(now);
            if success {
                health.last_success = Some(now);
                health.consecutive_failures = 0;
            } else {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
            }
        });
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn health_requires_recent_success() {
        let window = Duration::from_secs(15 * 60);
        let never = RefreshHealth::default();
        assert!(!never.is_healthy(window, at(1_000)));

        let recent = RefreshHealth {
            last_attempt: Some(at(1_000)),
            last_success: Some(at(1_000)),
            consecutive_failures: 0,
        };
        assert!(recent.is_healthy(window, at(1_000 + 15 * 60)));
        assert!(!recent.is_healthy(window, at(1_001 + 15 * 60)));
    }

    #[test]
    fn outcome_success_only_for_fresh_data() {
        let tiers = PutReport {
            fast: true,
            durable: true,
        };
        assert!(
            RefreshOutcome::Refreshed {
                last_refreshed: at(0),
                degraded: vec![SubFetch::Map],
                tiers,
            }
            .is_success()
        );
        assert!(
            !RefreshOutcome::FailedOpen {
                last_refreshed: at(0),
                tiers,
            }
            .is_success()
        );
        assert!(!RefreshOutcome::Retained.is_success());
    }

    #[test]
    fn empty_summary_counts_as_empty() {
        assert!(FetchResult::is_empty(&None::<SummaryRow>));
        assert!(FetchResult::is_empty(&Some(SummaryRow {
            bidders: None,
            last_updated: None,
        })));
        assert!(!FetchResult::is_empty(&Some(SummaryRow {
            bidders: Some(3.0),
            last_updated: None,
        })));
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}

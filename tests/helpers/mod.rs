#![allow(dead_code)]

use async_trait::async_trait;
use auction_pulse::cache::{CacheError, CacheStore, FastTier, FileTier, MemoryTier};
use auction_pulse::refresh::{RefreshPipeline, RefreshSettings};
use auction_pulse::snapshot::Snapshot;
use auction_pulse::source::{CountryRow, MetricRow, MetricSource, SourceError, SubFetch, SummaryRow};
use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// How every sub-fetch of a [`FakeSource`] behaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Healthy,
    /// Every call fails as if the warehouse were unreachable.
    Down,
    /// Every call sleeps this long before answering.
    Slow(Duration),
    Panicking,
}

/// In-memory metric source with switchable failure modes and call counters.
pub struct FakeSource {
    mode: Mutex<Mode>,
    broken: Mutex<Vec<SubFetch>>,
    kpi_calls: AtomicUsize,
    map_exclusions: Mutex<Vec<String>>,
    /// Added to the bidder counts of every row, so each cycle's data is distinct.
    generation: AtomicU64,
}

impl FakeSource {
    pub fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            broken: Mutex::new(Vec::new()),
            kpi_calls: AtomicUsize::new(0),
            map_exclusions: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        })
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Make only `which` fail, leaving the other sub-fetches healthy.
    pub fn break_sub_fetch(&self, which: SubFetch) {
        self.broken.lock().unwrap().push(which);
    }

    /// Offset the bidder counts of all later fetches by `generation`.
    pub fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::SeqCst);
    }

    fn bidders(&self) -> f64 {
        1532.0 + self.generation.load(Ordering::SeqCst) as f64
    }

    fn metric_rows(&self) -> Vec<MetricRow> {
        let mut rows = metric_rows();
        rows[0].value_today = Some(self.bidders());
        rows
    }

    /// Number of refresh cycles that reached the source.
    pub fn cycles(&self) -> usize {
        self.kpi_calls.load(Ordering::SeqCst)
    }

    /// Exclusion list passed to the most recent map fetch.
    pub fn last_exclusions(&self) -> Vec<String> {
        self.map_exclusions.lock().unwrap().clone()
    }

    async fn gate<T>(&self, which: SubFetch, healthy: T) -> Result<T, SourceError> {
        let mode = *self.mode.lock().unwrap();
        if self.broken.lock().unwrap().contains(&which) {
            return Err(SourceError::Query(sqlx::Error::RowNotFound));
        }
        match mode {
            Mode::Healthy => Ok(healthy),
            Mode::Down => Err(SourceError::Unavailable(sqlx::Error::PoolTimedOut)),
            Mode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(healthy)
            }
            Mode::Panicking => panic!("{which} fetch blew up"),
        }
    }
}

pub fn metric_rows() -> Vec<MetricRow> {
    vec![
        MetricRow {
            metric: "UNIQUE BIDDERS".to_string(),
            value_today: Some(1532.0),
            value_ly: Some(900_000.0),
        },
        MetricRow {
            metric: "LOTS SOLD".to_string(),
            value_today: Some(18_250.0),
            value_ly: Some(3_400_000.0),
        },
        MetricRow {
            metric: "DOLLARS BID".to_string(),
            value_today: None,
            value_ly: Some(12_500_000.5),
        },
    ]
}

pub fn canada() -> CountryRow {
    CountryRow {
        country: "Canada".to_string(),
        lat: Some(56.1),
        long: Some(-106.3),
        bid_counts: Some(40.0),
        unique_bidders: Some(12.0),
        dollars_bid: Some(45000.0),
        highest_bid_placed: Some(900.0),
    }
}

pub fn summary_row() -> SummaryRow {
    SummaryRow {
        bidders: Some(1532.0),
        last_updated: Some(Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 0).unwrap()),
    }
}

#[async_trait]
impl MetricSource for FakeSource {
    async fn fetch_kpis(&self) -> Result<Vec<MetricRow>, SourceError> {
        self.kpi_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(SubFetch::Kpis, self.metric_rows()).await
    }

    async fn fetch_grid(&self) -> Result<Vec<MetricRow>, SourceError> {
        self.gate(SubFetch::Grid, self.metric_rows()).await
    }

    async fn fetch_map(&self, excluded: &[String]) -> Result<Vec<CountryRow>, SourceError> {
        *self.map_exclusions.lock().unwrap() = excluded.to_vec();
        let mut row = canada();
        row.unique_bidders = Some(self.bidders() - 1520.0);
        self.gate(SubFetch::Map, vec![row]).await
    }

    async fn fetch_bidder_summary(&self) -> Result<Option<SummaryRow>, SourceError> {
        let mut row = summary_row();
        row.bidders = Some(self.bidders());
        self.gate(SubFetch::Summary, Some(row)).await
    }
}

/// Fast tier that fails every operation.
pub struct BrokenFastTier;

#[async_trait]
impl FastTier for BrokenFastTier {
    fn backend(&self) -> &'static str {
        "broken"
    }

    async fn load(&self) -> Result<Option<Arc<Snapshot>>, CacheError> {
        Err(CacheError::Corrupt("fast tier offline".to_string()))
    }

    async fn store(&self, _: Arc<Snapshot>, _: &str, _: Duration) -> Result<bool, CacheError> {
        Err(CacheError::Corrupt("fast tier offline".to_string()))
    }
}

/// A pipeline over a fresh temp directory. Keep the `TempDir` alive for the test.
pub struct Harness {
    pub source: Arc<FakeSource>,
    pub pipeline: Arc<RefreshPipeline>,
    pub cache_file: PathBuf,
    pub dir: TempDir,
}

pub fn settings() -> RefreshSettings {
    RefreshSettings {
        fetch_timeout: Duration::from_secs(2),
        ..RefreshSettings::default()
    }
}

pub fn harness(mode: Mode) -> Harness {
    harness_with(mode, Arc::new(MemoryTier::new()), settings())
}

pub fn harness_with(mode: Mode, fast: Arc<dyn FastTier>, settings: RefreshSettings) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let cache_file = dir.path().join("cache").join("auction_data.json");
    let store = CacheStore::new(
        fast,
        FileTier::new(cache_file.clone()),
        Duration::from_secs(420),
    );
    let source = FakeSource::new(mode);
    let pipeline = Arc::new(RefreshPipeline::new(source.clone(), store, settings));
    Harness {
        source,
        pipeline,
        cache_file,
        dir,
    }
}

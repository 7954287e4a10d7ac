//! The analytics warehouse the dashboard metrics come from.
//!
//! The refresh pipeline only sees the [`MetricSource`] trait; the production
//! implementation is [`WarehouseSource`]. Rows are fixed-schema records decoded
//! at this boundary, with every numeric column cast to `float8` in SQL so no
//! fixed-point decimal type ever reaches the snapshot.

pub mod warehouse;

pub use warehouse::WarehouseSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Country names suppressed from the map by default.
pub const DEFAULT_EXCLUDED_COUNTRIES: &[&str] = &[
    "-",
    "Afghanistan",
    "Pakistan",
    "Russian Federation",
    "Iraq",
    "Palestine, State of",
    "Iran",
    "China",
    "North Korea",
    "Saudi Arabia",
    "Myanmar",
    "Syria",
    "Yemen",
    "Somalia",
    "Libya",
    "Belarus",
    "Venezuela",
    "Cuba",
    "Mali",
    "Eritrea",
];

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("metric source unavailable")]
    Unavailable(#[source] sqlx::Error),
    #[error("metric query failed")]
    Query(#[source] sqlx::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("returned no rows")]
    Empty,
    #[error("panicked: {0}")]
    Panicked(String),
}

impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => SourceError::Unavailable(err),
            other => SourceError::Query(other),
        }
    }
}

/// The four independent queries composing a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubFetch {
    Kpis,
    Grid,
    Map,
    Summary,
}

impl SubFetch {
    pub const ALL: [SubFetch; 4] = [
        SubFetch::Kpis,
        SubFetch::Grid,
        SubFetch::Map,
        SubFetch::Summary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubFetch::Kpis => "kpis",
            SubFetch::Grid => "grid",
            SubFetch::Map => "map",
            SubFetch::Summary => "summary",
        }
    }
}

impl fmt::Display for SubFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the stats table: a labelled metric with today / last-12-month values.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MetricRow {
    pub metric: String,
    pub value_today: Option<f64>,
    pub value_ly: Option<f64>,
}

/// One row of the per-country table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CountryRow {
    pub country: String,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub bid_counts: Option<f64>,
    pub unique_bidders: Option<f64>,
    pub dollars_bid: Option<f64>,
    pub highest_bid_placed: Option<f64>,
}

/// The aggregate bidder count and its upstream freshness.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SummaryRow {
    pub bidders: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl SummaryRow {
    /// An aggregate over zero rows comes back as a single all-NULL row.
    pub fn is_empty(&self) -> bool {
        self.bidders.is_none() && self.last_updated.is_none()
    }
}

/// Read-only access to the warehouse.
///
/// Implementations should not apply their own retries; the pipeline bounds each
/// call with a timeout and degrades the affected portion on any error.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Per-metric rows used to build the KPI map.
    async fn fetch_kpis(&self) -> Result<Vec<MetricRow>, SourceError>;

    /// The same metric rows, kept verbatim for the grid.
    async fn fetch_grid(&self) -> Result<Vec<MetricRow>, SourceError>;

    /// Per-country aggregates, skipping the `excluded` country names.
    async fn fetch_map(&self, excluded: &[String]) -> Result<Vec<CountryRow>, SourceError>;

    /// The unique-bidder rollup, or `None` when the table has no such metric.
    async fn fetch_bidder_summary(&self) -> Result<Option<SummaryRow>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_classify_as_unavailable() {
        assert!(matches!(
            SourceError::from(sqlx::Error::PoolTimedOut),
            SourceError::Unavailable(_)
        ));
        assert!(matches!(
            SourceError::from(sqlx::Error::RowNotFound),
            SourceError::Query(_)
        ));
    }

    #[test]
    fn all_null_summary_is_empty() {
        let row = SummaryRow {
            bidders: None,
            last_updated: None,
        };
        assert!(row.is_empty());
        let row = SummaryRow {
            bidders: Some(0.0),
            last_updated: None,
        };
        assert!(!row.is_empty());
    }
}

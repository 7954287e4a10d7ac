//! Warehouse-backed metric source speaking the Postgres wire protocol.

use crate::source::{CountryRow, MetricRow, MetricSource, SourceError, SummaryRow};
use crate::utils::log_if_slow;
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::debug;

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_secs(5);

/// Queries the stats and per-country tables through a shared pool.
///
/// Table names are interpolated into SQL, so they must already have passed
/// [`crate::config::validate_table_name`].
#[derive(Clone)]
pub struct WarehouseSource {
    pool: PgPool,
    stats_table: String,
    country_table: String,
}

impl WarehouseSource {
    pub fn new(pool: PgPool, stats_table: String, country_table: String) -> Self {
        Self {
            pool,
            stats_table,
            country_table,
        }
    }

    fn metric_rows_query(&self) -> String {
        format!(
            "SELECT metric, value_today::float8 AS value_today, value_ly::float8 AS value_ly \
             FROM {}",
            self.stats_table
        )
    }

    fn map_query(&self) -> String {
        format!(
            r#"SELECT
                country_long_name AS country,
                lat::float8 AS lat,
                "long"::float8 AS "long",
                bid_counts::float8 AS bid_counts,
                unique_bidders::float8 AS unique_bidders,
                dollars_bid::float8 AS dollars_bid,
                highest_bid_placed::float8 AS highest_bid_placed
            FROM {}
            WHERE country_long_name IS NOT NULL
              AND NOT (country_long_name = ANY($1))"#,
            self.country_table
        )
    }

    fn summary_query(&self) -> String {
        format!(
            "SELECT SUM(value_today)::float8 AS bidders, \
                    MAX(last_updated_dt)::timestamptz AS last_updated \
             FROM {} \
             WHERE metric = 'UNIQUE BIDDERS'",
            self.stats_table
        )
    }

    async fn metric_rows(&self, label: &str) -> Result<Vec<MetricRow>, SourceError> {
        let start = Instant::now();
        let rows = sqlx::query_as::<_, MetricRow>(&self.metric_rows_query())
            .fetch_all(&self.pool)
            .await?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, label);
        debug!(count = rows.len(), "Fetched {label}");
        Ok(rows)
    }
}

#[async_trait]
impl MetricSource for WarehouseSource {
    async fn fetch_kpis(&self) -> Result<Vec<MetricRow>, SourceError> {
        self.metric_rows("kpi rows").await
    }

    async fn fetch_grid(&self) -> Result<Vec<MetricRow>, SourceError> {
        self.metric_rows("grid rows").await
    }

    async fn fetch_map(&self, excluded: &[String]) -> Result<Vec<CountryRow>, SourceError> {
        let start = Instant::now();
        let rows = sqlx::query_as::<_, CountryRow>(&self.map_query())
            .bind(excluded)
            .fetch_all(&self.pool)
            .await?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, "map rows");
        debug!(count = rows.len(), excluded = excluded.len(), "Fetched map rows");
        Ok(rows)
    }

    async fn fetch_bidder_summary(&self) -> Result<Option<SummaryRow>, SourceError> {
        let start = Instant::now();
        let row = sqlx::query_as::<_, SummaryRow>(&self.summary_query())
            .fetch_optional(&self.pool)
            .await?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, "bidder summary");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn source() -> WarehouseSource {
        // Lazy pools never connect until a query runs.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/warehouse")
            .unwrap();
        WarehouseSource::new(
            pool,
            "usmart.auction_stats".into(),
            "usmart.auction_stats_cntry".into(),
        )
    }

    #[tokio::test]
    async fn queries_target_configured_tables() {
        let source = source();
        assert!(
            source
                .metric_rows_query()
                .ends_with("FROM usmart.auction_stats")
        );
        assert!(source.map_query().contains("FROM usmart.auction_stats_cntry"));
        assert!(source.map_query().contains("= ANY($1)"));
        assert!(source.summary_query().contains("metric = 'UNIQUE BIDDERS'"));
    }
}

//! Coercion of raw warehouse rows into snapshot portions.
//!
//! Values that are NULL become zero quietly, matching how the warehouse
//! reports "nothing yet today". Values that are present but not finite are
//! malformed: they also become zero, with a warning naming the row.

use crate::snapshot::{BidderSummary, GridRow, KpiValue, MapRow, Metric, Snapshot};
use crate::source::{CountryRow, MetricRow, SummaryRow};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Coerce an optional upstream number to a finite `f64`.
pub fn coerce_number(value: Option<f64>, field: &'static str, row: &str) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        Some(v) => {
            warn!(row, field, value = %v, "Non-finite value coerced to zero");
            0.0
        }
        None => 0.0,
    }
}

/// Coerce an optional upstream number to an integer count.
///
/// Fractional values are rounded; values beyond `i64` saturate.
pub fn coerce_count(value: Option<f64>, field: &'static str, row: &str) -> i64 {
    // `as` saturates for out-of-range floats.
    coerce_number(value, field, row).round() as i64
}

fn kpis_from_rows(rows: Vec<MetricRow>) -> BTreeMap<Metric, KpiValue> {
    let mut kpis = BTreeMap::new();
    for row in rows {
        let Some(metric) = Metric::from_label(&row.metric) else {
            debug!(label = %row.metric, "Skipping unknown metric label");
            continue;
        };
        kpis.insert(
            metric,
            KpiValue {
                today: coerce_number(row.value_today, "value_today", &row.metric),
                last_12_months: coerce_number(row.value_ly, "value_ly", &row.metric),
            },
        );
    }
    kpis
}

fn grid_from_rows(rows: Vec<MetricRow>) -> Vec<GridRow> {
    rows.into_iter()
        .map(|row| GridRow {
            value_today: coerce_number(row.value_today, "value_today", &row.metric),
            value_ly: coerce_number(row.value_ly, "value_ly", &row.metric),
            metric: row.metric,
        })
        .collect()
}

fn map_from_rows(rows: Vec<CountryRow>) -> Vec<MapRow> {
    rows.into_iter()
        .map(|row| {
            let name = row.country.as_str();
            MapRow {
                lat: coerce_number(row.lat, "lat", name),
                long: coerce_number(row.long, "long", name),
                bid_counts: coerce_count(row.bid_counts, "bid_counts", name),
                unique_bidders: coerce_count(row.unique_bidders, "unique_bidders", name),
                dollars_bid: coerce_number(row.dollars_bid, "dollars_bid", name),
                highest_bid_placed: coerce_number(
                    row.highest_bid_placed,
                    "highest_bid_placed",
                    name,
                ),
                country: row.country,
            }
        })
        .collect()
}

fn summary_from_row(row: SummaryRow) -> BidderSummary {
    BidderSummary {
        bidders: coerce_count(row.bidders, "bidders", "UNIQUE BIDDERS"),
        last_updated: row.last_updated,
    }
}

/// Build a snapshot from whichever sub-fetches succeeded.
///
/// A `None` portion (failed, timed out or empty) becomes its empty default.
pub fn assemble(
    kpis: Option<Vec<MetricRow>>,
    grid: Option<Vec<MetricRow>>,
    map: Option<Vec<CountryRow>>,
    summary: Option<SummaryRow>,
    last_refreshed: DateTime<Utc>,
) -> Snapshot {
    Snapshot {
        kpis: kpis.map(kpis_from_rows).unwrap_or_default(),
        grid: grid.map(grid_from_rows).unwrap_or_default(),
        map_rows: map.map(map_from_rows).unwrap_or_default(),
        summary: summary.map(summary_from_row).unwrap_or_default(),
        last_refreshed,
    }
}

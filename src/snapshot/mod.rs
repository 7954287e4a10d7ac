//! The cached dashboard snapshot and its fixed metric schema.
//!
//! A [`Snapshot`] is produced by the refresh pipeline, shared as an
//! `Arc<Snapshot>`, and never mutated after it is written. Every field carries
//! a serde default so a document written by an older build (or with a portion
//! missing) still decodes into a well-formed value.

mod normalize;

pub use normalize::{assemble, coerce_count, coerce_number};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

/// Sentinel written in place of an unknown upstream timestamp.
pub const UNKNOWN_TIMESTAMP: &str = "N/A";

/// KPI metrics published by the warehouse stats table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Metric {
    LotsSold,
    AuctionEventsRun,
    BidderCountries,
    GrossValueSold,
    NetValueSold,
    UniqueBidders,
    BidsReceived,
    HighestBidPlaced,
    DollarsBid,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::LotsSold,
        Metric::AuctionEventsRun,
        Metric::BidderCountries,
        Metric::GrossValueSold,
        Metric::NetValueSold,
        Metric::UniqueBidders,
        Metric::BidsReceived,
        Metric::HighestBidPlaced,
        Metric::DollarsBid,
    ];

    /// Resolve an upstream metric label (e.g. `"UNIQUE BIDDERS"`).
    ///
    /// Matching ignores case and surrounding whitespace. Unknown labels return
    /// `None` and are left out of the KPI map.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(label))
    }

    /// The label used by the warehouse.
    pub fn label(self) -> &'static str {
        match self {
            Metric::LotsSold => "LOTS SOLD",
            Metric::AuctionEventsRun => "AUCTION EVENTS RUN",
            Metric::BidderCountries => "BIDDER COUNTRIES",
            Metric::GrossValueSold => "GROSS VALUE SOLD",
            Metric::NetValueSold => "NET VALUE SOLD",
            Metric::UniqueBidders => "UNIQUE BIDDERS",
            Metric::BidsReceived => "BIDS RECEIVED",
            Metric::HighestBidPlaced => "HIGHEST BID PLACED",
            Metric::DollarsBid => "DOLLARS BID",
        }
    }

    /// The snake_case key used in the serialized KPI map.
    pub fn key(self) -> &'static str {
        match self {
            Metric::LotsSold => "lots_sold",
            Metric::AuctionEventsRun => "auction_events_run",
            Metric::BidderCountries => "bidder_countries",
            Metric::GrossValueSold => "gross_value_sold",
            Metric::NetValueSold => "net_value_sold",
            Metric::UniqueBidders => "unique_bidders",
            Metric::BidsReceived => "bids_received",
            Metric::HighestBidPlaced => "highest_bid_placed",
            Metric::DollarsBid => "dollars_bid",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Today and trailing-12-month values for one metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KpiValue {
    #[serde(default)]
    pub today: f64,
    #[serde(default, alias = "ly")]
    pub last_12_months: f64,
}

/// One raw metric row, kept for tabular display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GridRow {
    pub metric: String,
    #[serde(default)]
    pub value_today: f64,
    #[serde(default)]
    pub value_ly: f64,
}

/// Per-country bid aggregates for the map view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MapRow {
    pub country: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub long: f64,
    #[serde(default)]
    #[ts(type = "number")]
    pub bid_counts: i64,
    #[serde(default)]
    #[ts(type = "number")]
    pub unique_bidders: i64,
    #[serde(default)]
    pub dollars_bid: f64,
    #[serde(default)]
    pub highest_bid_placed: f64,
}

/// Scalar rollup behind the "active bidders" counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BidderSummary {
    #[serde(default)]
    #[ts(type = "number")]
    pub bidders: i64,
    /// Upstream freshness; serialized as RFC 3339 or `"N/A"`.
    #[serde(default, with = "sentinel_timestamp", alias = "last_up_date")]
    #[ts(type = "string")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// The single cached bundle of dashboard metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Snapshot {
    #[serde(default)]
    pub kpis: BTreeMap<Metric, KpiValue>,
    #[serde(default)]
    pub grid: Vec<GridRow>,
    #[serde(default, alias = "map")]
    pub map_rows: Vec<MapRow>,
    #[serde(default)]
    pub summary: BidderSummary,
    pub last_refreshed: DateTime<Utc>,
}

impl Snapshot {
    /// A snapshot with every portion at its empty default.
    pub fn empty(last_refreshed: DateTime<Utc>) -> Self {
        Self {
            kpis: BTreeMap::new(),
            grid: Vec::new(),
            map_rows: Vec::new(),
            summary: BidderSummary::default(),
            last_refreshed,
        }
    }

    /// KPI values for `metric`, zero when the metric was not reported.
    pub fn kpi(&self, metric: Metric) -> KpiValue {
        self.kpis.get(&metric).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.kpis.is_empty()
            && self.grid.is_empty()
            && self.map_rows.is_empty()
            && self.summary == BidderSummary::default()
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` using the `"N/A"` sentinel for `None`.
mod sentinel_timestamp {
    use super::UNKNOWN_TIMESTAMP;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_str(UNKNOWN_TIMESTAMP),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|s| {
            DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.to_utc())
        }))
    }
}

//! Static glossary of the dashboard's KPI terms.

use axum::response::Response;
use serde::Serialize;
use ts_rs::TS;

use crate::web::routes::{cache, with_cache_control};

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct GlossaryEntry {
    pub term: &'static str,
    pub definition: &'static str,
}

pub const GLOSSARY: &[GlossaryEntry] = &[
    GlossaryEntry {
        term: "Transaction Value",
        definition: "Sale price in auction without Copart Charges.",
    },
    GlossaryEntry {
        term: "Unique Bidders",
        definition: "Count of distinct bidders participating.",
    },
    GlossaryEntry {
        term: "Dollars Bid",
        definition: "Total dollar value of all bids submitted.",
    },
    GlossaryEntry {
        term: "Highest Bid Placed",
        definition: "Top single bid received today.",
    },
    GlossaryEntry {
        term: "Bids Received",
        definition: "Total number of bids placed today.",
    },
    GlossaryEntry {
        term: "Auction Events Run",
        definition: "Number of live auction events conducted today.",
    },
    GlossaryEntry {
        term: "Bidder Countries",
        definition: "Countries of bidders participating today.",
    },
    GlossaryEntry {
        term: "Total Dollars Bid",
        definition: "Total dollar value of all bids placed today.",
    },
];

/// `GET /api/glossary`
pub(super) async fn get_glossary() -> Response {
    with_cache_control(GLOSSARY, cache::REFERENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_are_unique() {
        let mut terms: Vec<_> = GLOSSARY.iter().map(|e| e.term).collect();
        terms.sort_unstable();
        terms.dedup();
        assert_eq!(terms.len(), GLOSSARY.len());
    }
}

//! Removal signals and aggregated removal events

use crate::{RecordId, VisitId};

/// Why a row was staged for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Expired by age or capacity pressure.
    Expired,
    /// An exotic visit (download, hidden single-visit, oversized url).
    Exotic,
}

impl RemovalReason {
    /// Stable name stored in the staging table.
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalReason::Expired => "expired",
            RemovalReason::Exotic => "exotic",
        }
    }

    /// Parse the stored name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "expired" => Some(RemovalReason::Expired),
            "exotic" => Some(RemovalReason::Exotic),
            _ => None,
        }
    }
}

/// Raw per-row trace of one deleted visit or record.
///
/// Produced by the store executor from the run-scoped staging table and
/// consumed by the notification aggregator; never outlives a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalSignal {
    /// The deleted visit, when a visit was removed.
    pub visit_id: Option<VisitId>,

    /// The deleted record, when the whole record was removed. At least one
    /// of `visit_id` / `record_id` is always set.
    pub record_id: Option<RecordId>,

    /// Url of the affected record.
    pub url: String,

    /// Guid of the affected record.
    pub guid: String,

    /// Visit timestamp (epoch millis) of the removed row, if dated.
    pub visit_at: Option<i64>,

    /// Dirtiness-inference hint: the requested limit of the size-gated
    /// finder that staged this row, or 0 when the row came from an
    /// unconditional operation.
    pub expected_results: i64,

    /// Why the row was staged.
    pub reason: RemovalReason,
}

/// Deduplicated removal notification, one per affected record key.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalEvent {
    /// Url of the affected record.
    pub url: String,

    /// Guid of the affected record.
    pub guid: String,

    /// Most recent visit timestamp among the removed rows, if any.
    pub visit_at: Option<i64>,

    /// Whether the whole record was removed from the store.
    pub whole_record: bool,

    /// Whether only some dated visits of a surviving record were removed.
    pub partial_removal: bool,
}

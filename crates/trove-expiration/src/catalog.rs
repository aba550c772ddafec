//! The ordered catalog of batched deletion operations.
//!
//! Each entry carries the trigger mask it runs under; a run executes the
//! matching entries in declared order inside one transaction. Order
//! matters: visits go first, then the records they orphan, then artifacts
//! scoped to staged records, then orphan artifacts, so foreign-key cleanup
//! always sees correct pre-state.

use trove_domain::{Action, MSECS_PER_DAY};

use crate::ExpirationConfig;

/// Exotic visits (downloads, hidden single-visit urls, oversized urls)
/// are expired once older than this many days.
pub const EXOTIC_VISIT_DAYS: i64 = 90;

/// Visits newer than this many days are never expired by capacity
/// pressure; protects users with thousands of pinned records from
/// constantly losing fresh history.
pub const PROTECTED_VISIT_DAYS: i64 = 7;

/// Icons are retained this many days past their deadline on records
/// without external references.
pub const ICON_RETENTION_DAYS: i64 = 180;

/// A named integer parameter of a catalog entry, resolved per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Per-step visit limit.
    LimitVisits,
    /// Per-step orphan-record limit.
    LimitRecords,
    /// Per-step annotation limit; scaled up since one record may own
    /// several annotations.
    LimitAnnotations,
    /// Per-step input-history limit.
    LimitInputHistory,
    /// Per-step interaction limit.
    LimitInteractions,
    /// The retention capacity; capacity-pressure finders stage nothing
    /// below it.
    MaxRecords,
    /// Oldest visit timestamp exempt from exotic expiration.
    ExoticCutoff,
    /// Oldest visit timestamp exempt from capacity-pressure expiration.
    ProtectedCutoff,
    /// Oldest icon deadline exempt from retention expiration.
    IconCutoff,
    /// Oldest interaction update exempt from retention expiration.
    InteractionCutoff,
}

impl Param {
    /// The `:name` placeholder this parameter binds to.
    pub fn placeholder(self) -> &'static str {
        match self {
            Param::LimitVisits => ":limit_visits",
            Param::LimitRecords => ":limit_records",
            Param::LimitAnnotations => ":limit_annotations",
            Param::LimitInputHistory => ":limit_input_history",
            Param::LimitInteractions => ":limit_interactions",
            Param::MaxRecords => ":max_records",
            Param::ExoticCutoff => ":exotic_cutoff",
            Param::ProtectedCutoff => ":protected_cutoff",
            Param::IconCutoff => ":icon_cutoff",
            Param::InteractionCutoff => ":interaction_cutoff",
        }
    }

    /// Days of retention behind `now` for the cutoff parameters, if this
    /// parameter is a cutoff.
    pub fn retention_days(self, config: &ExpirationConfig) -> Option<i64> {
        match self {
            Param::ExoticCutoff => Some(EXOTIC_VISIT_DAYS),
            Param::ProtectedCutoff => Some(PROTECTED_VISIT_DAYS),
            Param::IconCutoff => Some(ICON_RETENTION_DAYS),
            Param::InteractionCutoff => Some(config.interaction_retention_days as i64),
            _ => None,
        }
    }

    /// The cutoff timestamp for this parameter, if it is a cutoff.
    pub fn cutoff(self, config: &ExpirationConfig, now_ms: i64) -> Option<i64> {
        self.retention_days(config)
            .map(|days| now_ms - days * MSECS_PER_DAY)
    }
}

/// External configuration toggle that can disable an entry outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// The interaction-cleanup entry only runs when interactions are
    /// enabled by the host.
    Interactions,
}

/// One named batch operation of the expiration catalog.
#[derive(Debug)]
pub struct CatalogEntry {
    /// Stable name, used in logs.
    pub name: &'static str,

    /// The statement; placeholders must all be listed in `params`.
    pub sql: &'static str,

    /// Trigger mask gating execution of this entry.
    pub actions: Action,

    /// Parameters resolved per run.
    pub params: &'static [Param],

    /// Configuration toggle that disables this entry when off.
    pub disabled_by: Option<Toggle>,
}

const SIZE_GATED_ACTIONS: Action = Action::TIMED_OVERLIMIT
    .union(Action::IDLE_DIRTY)
    .union(Action::IDLE_DAILY)
    .union(Action::DEBUG);

const ALL_ACTIONS: Action = Action::TIMED
    .union(Action::TIMED_OVERLIMIT)
    .union(Action::SHUTDOWN_DIRTY)
    .union(Action::IDLE_DIRTY)
    .union(Action::IDLE_DAILY)
    .union(Action::DEBUG);

const IDLE_ACTIONS: Action = Action::IDLE_DIRTY
    .union(Action::IDLE_DAILY)
    .union(Action::DEBUG);

const CLEANUP_ACTIONS: Action = Action::TIMED_OVERLIMIT
    .union(Action::SHUTDOWN_DIRTY)
    .union(Action::IDLE_DIRTY)
    .union(Action::IDLE_DAILY)
    .union(Action::DEBUG);

static CATALOG: &[CatalogEntry] = &[
    // Some visits are less useful than others and can pollute host
    // completion results: downloads, hidden non-typed single-visit urls,
    // and single-visit urls over 255 chars. Redirect visits are never
    // staged here, they are needed to recognize redirect sources.
    CatalogEntry {
        name: "find_exotic_visits",
        sql: "INSERT INTO expiration_notify (visit_id, url, guid, visit_at, reason)
              WITH aged AS (
                  SELECT v.id AS id, r.url AS url, r.guid AS guid, v.kind AS kind,
                         v.visit_at AS visit_at, r.visit_count AS visit_count,
                         r.hidden AS hidden, r.typed AS typed
                  FROM visits v
                  JOIN records r ON r.id = v.record_id
                  WHERE v.visit_at < :exotic_cutoff
                    AND v.kind NOT IN (5, 6)
              )
              SELECT id, url, guid, visit_at, 'exotic'
              FROM aged
              WHERE (hidden = 1 AND typed = 0 AND visit_count <= 1) OR kind = 7
              UNION ALL
              SELECT id, url, guid, visit_at, 'exotic'
              FROM aged
              WHERE visit_count = 1 AND LENGTH(url) > 255
              ORDER BY visit_at ASC
              LIMIT :limit_visits",
        actions: SIZE_GATED_ACTIONS,
        params: &[Param::ExoticCutoff, Param::LimitVisits],
        disabled_by: None,
    },
    // Stages the oldest visits while the store is over its capacity
    // limit, protecting the most recent days. Stamps expected_results so
    // the run can infer dirtiness from its own yield.
    CatalogEntry {
        name: "find_visits_over_limit",
        sql: "INSERT INTO expiration_notify
                  (visit_id, url, guid, visit_at, expected_results)
              SELECT v.id, r.url, r.guid, v.visit_at, :limit_visits
              FROM visits v
              JOIN records r ON r.id = v.record_id
              WHERE (SELECT COUNT(*) FROM records) > :max_records
                AND v.visit_at < :protected_cutoff
              ORDER BY v.visit_at ASC
              LIMIT :limit_visits",
        actions: SIZE_GATED_ACTIONS,
        params: &[Param::LimitVisits, Param::MaxRecords, Param::ProtectedCutoff],
        disabled_by: None,
    },
    // Removes the staged visits.
    CatalogEntry {
        name: "delete_found_visits",
        sql: "DELETE FROM visits WHERE id IN (
                  SELECT visit_id FROM expiration_notify WHERE visit_id NOT NULL
              )",
        actions: SIZE_GATED_ACTIONS,
        params: &[],
        disabled_by: None,
    },
    // Stages records left with no visits and no external references.
    // Records with score -1 were inserted but not scored yet; skipping
    // them guards the async window between insertion and first visit.
    CatalogEntry {
        name: "find_orphan_records",
        sql: "INSERT INTO expiration_notify (record_id, url, guid, visit_at)
              SELECT r.id, r.url, r.guid, r.last_visit_at
              FROM records r
              LEFT JOIN visits v ON r.id = v.record_id
              WHERE r.last_visit_at IS NULL
                AND r.foreign_count = 0
                AND v.id IS NULL
                AND r.score <> -1
              LIMIT :limit_records",
        actions: ALL_ACTIONS,
        params: &[Param::LimitRecords],
        disabled_by: None,
    },
    // Removes staged records, re-checking eligibility at delete time.
    CatalogEntry {
        name: "delete_found_records",
        sql: "DELETE FROM records WHERE id IN (
                  SELECT record_id FROM expiration_notify WHERE record_id NOT NULL
              ) AND foreign_count = 0 AND last_visit_at IS NULL",
        actions: ALL_ACTIONS,
        params: &[],
        disabled_by: None,
    },
    // Icons past their retention deadline on records without external
    // references; bounded per run since it only matters at idle.
    CatalogEntry {
        name: "expire_old_icons",
        sql: "DELETE FROM icons WHERE id IN (
                  SELECT i.id
                  FROM icons i
                  JOIN records r ON r.id = i.record_id
                  WHERE i.expires_at < :icon_cutoff
                    AND r.foreign_count = 0
                  LIMIT 100
              )",
        actions: IDLE_ACTIONS,
        params: &[Param::IconCutoff],
        disabled_by: None,
    },
    // Icons whose record no longer exists; unconditional.
    CatalogEntry {
        name: "expire_orphan_icons",
        sql: "DELETE FROM icons WHERE record_id NOT IN (
                  SELECT id FROM records
              )",
        actions: CLEANUP_ACTIONS,
        params: &[],
        disabled_by: None,
    },
    // Annotations whose record no longer exists.
    CatalogEntry {
        name: "expire_orphan_annotations",
        sql: "DELETE FROM annotations WHERE id IN (
                  SELECT a.id
                  FROM annotations a
                  LEFT JOIN records r ON a.record_id = r.id
                  WHERE r.id IS NULL
                  LIMIT :limit_annotations
              )",
        actions: ALL_ACTIONS,
        params: &[Param::LimitAnnotations],
        disabled_by: None,
    },
    // Input history of records staged in this run and no longer present.
    CatalogEntry {
        name: "expire_orphan_input_history",
        sql: "DELETE FROM input_history
              WHERE record_id IN (SELECT record_id FROM expiration_notify)
                AND record_id IN (
                    SELECT i.record_id
                    FROM input_history i
                    LEFT JOIN records r ON r.id = i.record_id
                    WHERE r.id IS NULL
                    LIMIT :limit_input_history
                )",
        actions: ALL_ACTIONS,
        params: &[Param::LimitInputHistory],
        disabled_by: None,
    },
    // Interactions past their configured retention window.
    CatalogEntry {
        name: "expire_old_interactions",
        sql: "DELETE FROM interactions WHERE id IN (
                  SELECT id FROM interactions
                  WHERE updated_at < :interaction_cutoff
                  ORDER BY updated_at ASC
                  LIMIT :limit_interactions
              )",
        actions: CLEANUP_ACTIONS,
        params: &[Param::InteractionCutoff, Param::LimitInteractions],
        disabled_by: Some(Toggle::Interactions),
    },
];

/// The catalog, in execution order.
pub fn catalog() -> &'static [CatalogEntry] {
    CATALOG
}

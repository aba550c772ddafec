//! Trove Domain Layer
//!
//! Core types and trait seams for the trove history store and its adaptive
//! expiration controller. This crate stays close to zero dependencies and
//! defines the vocabulary all other layers share.
//!
//! ## Key Concepts
//!
//! - **Record**: a stored historical entry (url + guid), the unit of final
//!   deletion. A record is only ever deleted once it has no remaining
//!   visits and no external live references.
//! - **Visit**: a single dated occurrence belonging to a record.
//! - **Removal signal**: the raw per-row trace a deletion run leaves
//!   behind, aggregated into deduplicated removal events.
//! - **Status**: the feedback-derived estimate of whether the store is
//!   over its retention budget (clean / dirty / unknown).
//! - **Action**: a trigger bitmask identifying which scheduling source
//!   caused a run; it gates which catalog operations execute.
//!
//! Infrastructure implementations (SQLite, the controller, the CLI) live
//! in other crates; this crate only defines the trait boundaries.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod record;
pub mod removal;
pub mod status;
pub mod traits;
pub mod trigger;

// Re-exports for convenience
pub use record::{Guid, Record, RecordId, Visit, VisitId, VisitKind};
pub use removal::{RemovalEvent, RemovalReason, RemovalSignal};
pub use status::Status;
pub use traits::{BatchOp, MetricsSink, RemovalObserver, StoreExecutor, StoreStats};
pub use trigger::{Action, SizeClass};

/// Milliseconds in a day; timestamps in this crate are Unix epoch millis.
pub const MSECS_PER_DAY: i64 = 86_400_000;

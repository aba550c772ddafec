//! Trove Expiration
//!
//! Adaptive expiration controller for the trove history store. Keeps the
//! store near a target size budget by periodically deleting the least
//! valuable visits, the records they orphan, and the artifacts those
//! records leave behind.
//!
//! # Overview
//!
//! Expiration runs:
//! - On a repeating timer, in small chunks.
//! - At idle, once, with a large chunk; timed expiration is suspended
//!   while idle to preserve batteries on portable devices.
//! - Once per idle day, with a large chunk.
//! - At shutdown, only if the store is known dirty, as a single
//!   best-effort pass.
//! - On the manual/debug entry point, with an operator-supplied limit.
//!
//! The controller adapts its own aggressiveness to the status of the
//! store: a dirty (over-budget) store is stepped more often and in larger
//! chunks, a clean one more lazily.
//!
//! # Usage
//!
//! ## Background service
//!
//! ```no_run
//! use std::sync::Arc;
//! use trove_expiration::{ExpirationConfig, ExpirationService, LogMetrics};
//! use trove_store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::new("trove.db")?;
//!     let service = ExpirationService::start(
//!         store,
//!         ExpirationConfig::default(),
//!         Vec::new(),
//!         Arc::new(LogMetrics),
//!     );
//!
//!     // ... wire the host's idle and shutdown sources ...
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## One controlled pass
//!
//! ```no_run
//! use std::sync::Arc;
//! use trove_domain::{Action, SizeClass};
//! use trove_expiration::{Expiration, ExpirationConfig, NullMetrics};
//! use trove_store::SqliteStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::new("trove.db")?;
//! let mut expiration = Expiration::new(store, ExpirationConfig::default());
//! expiration.set_metrics(Arc::new(NullMetrics));
//! expiration.setup()?;
//! expiration.expire(Action::DEBUG, SizeClass::Unlimited)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod aggregate;
mod catalog;
mod config;
mod controller;
mod error;
mod limits;
mod metrics;
mod scheduler;
mod status;

pub use aggregate::{AggregateOutcome, NotificationAggregator};
pub use catalog::{
    catalog, CatalogEntry, Param, Toggle, EXOTIC_VISIT_DAYS, ICON_RETENTION_DAYS,
    PROTECTED_VISIT_DAYS,
};
pub use config::{ExpirationConfig, DEFAULT_INTERVAL_SECONDS};
pub use controller::{ConfigDelta, Expiration, RunOutcome};
pub use error::ExpirationError;
pub use limits::{step_limit, LimitPolicy, EXPIRE_LIMIT_PER_STEP};
pub use metrics::{LogMetrics, NullMetrics};
pub use scheduler::ExpirationService;
pub use status::StatusTracker;

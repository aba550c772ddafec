//! Trove Storage Layer
//!
//! Implements the [`StoreExecutor`] trait over SQLite. The store owns the
//! records/visits schema, the orphan-artifact tables, and the run-scoped
//! `expiration_notify` staging table the expiration controller drains
//! after each run.
//!
//! # Examples
//!
//! ```no_run
//! use trove_store::SqliteStore;
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! // Store is now ready for record and expiration operations
//! ```

#![warn(missing_docs)]

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use trove_domain::traits::{BatchOp, StoreExecutor, StoreStats};
use trove_domain::{
    Guid, Record, RecordId, RemovalReason, RemovalSignal, Visit, VisitId, VisitKind,
};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Parameters for inserting a new record.
///
/// Defaults to a visible, unranked record with no external references.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// The url/key string.
    pub url: String,
    /// Hidden records never show up in host UI surfaces.
    pub hidden: bool,
    /// Whether the url was ever typed.
    pub typed: bool,
    /// Ranking score; `-1` marks a record not yet scored.
    pub score: i64,
    /// Count of external live references.
    pub foreign_count: i64,
}

impl NewRecord {
    /// A visible, already-scored record for the given url.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hidden: false,
            typed: false,
            score: 0,
            foreign_count: 0,
        }
    }
}

/// SQLite-based implementation of [`StoreExecutor`].
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Each thread should have its own
/// `SqliteStore` instance; the expiration service owns one exclusively.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new store with the given database path.
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use trove_store::SqliteStore;
    ///
    /// let store = SqliteStore::new("trove.db").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<(), StoreError> {
        let schema = include_str!("schema.sql");
        self.conn.execute_batch(schema)?;
        Ok(())
    }

    /// Insert a record, generating a fresh guid for it.
    pub fn add_record(&mut self, record: &NewRecord) -> Result<RecordId, StoreError> {
        let guid = Guid::new();
        self.conn.execute(
            "INSERT INTO records (url, guid, hidden, typed, score, foreign_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &record.url,
                guid.as_str(),
                record.hidden as i64,
                record.typed as i64,
                record.score,
                record.foreign_count,
            ],
        )?;
        Ok(RecordId::new(self.conn.last_insert_rowid()))
    }

    /// Insert a visit; triggers update the owning record's denormalized
    /// visit columns.
    pub fn add_visit(
        &mut self,
        record_id: RecordId,
        visit_at: i64,
        kind: VisitKind,
    ) -> Result<VisitId, StoreError> {
        self.conn.execute(
            "INSERT INTO visits (record_id, visit_at, kind) VALUES (?1, ?2, ?3)",
            params![record_id.value(), visit_at, kind.as_i64()],
        )?;
        Ok(VisitId::new(self.conn.last_insert_rowid()))
    }

    /// Insert an icon artifact with the given retention deadline.
    pub fn add_icon(&mut self, record_id: RecordId, expires_at: i64) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO icons (record_id, expires_at) VALUES (?1, ?2)",
            params![record_id.value(), expires_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert an annotation artifact.
    pub fn add_annotation(
        &mut self,
        record_id: RecordId,
        content: &str,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO annotations (record_id, content) VALUES (?1, ?2)",
            params![record_id.value(), content],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert an input-history artifact.
    pub fn add_input_history(
        &mut self,
        record_id: RecordId,
        input: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO input_history (record_id, input) VALUES (?1, ?2)",
            params![record_id.value(), input],
        )?;
        Ok(())
    }

    /// Insert an interaction artifact last updated at the given time.
    pub fn add_interaction(
        &mut self,
        record_id: RecordId,
        updated_at: i64,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO interactions (record_id, updated_at) VALUES (?1, ?2)",
            params![record_id.value(), updated_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Set the external live-reference count of a record.
    pub fn set_foreign_count(&mut self, record_id: RecordId, count: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE records SET foreign_count = ?2 WHERE id = ?1",
            params![record_id.value(), count],
        )?;
        Ok(())
    }

    /// Get a record by id.
    pub fn get_record(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, url, guid, last_visit_at, visit_count, hidden, typed,
                        score, foreign_count
                 FROM records WHERE id = ?1",
                params![id.value()],
                |row| {
                    Ok(Record {
                        id: RecordId::new(row.get(0)?),
                        url: row.get(1)?,
                        guid: Guid::from_string(row.get::<_, String>(2)?),
                        last_visit_at: row.get(3)?,
                        visit_count: row.get(4)?,
                        hidden: row.get::<_, i64>(5)? != 0,
                        typed: row.get::<_, i64>(6)? != 0,
                        score: row.get(7)?,
                        foreign_count: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// All visits of a record, oldest first.
    pub fn get_visits(&self, record_id: RecordId) -> Result<Vec<Visit>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, record_id, visit_at, kind FROM visits
             WHERE record_id = ?1 ORDER BY visit_at ASC",
        )?;
        let visits = stmt
            .query_map(params![record_id.value()], |row| {
                let kind: i64 = row.get(3)?;
                Ok(Visit {
                    id: VisitId::new(row.get(0)?),
                    record_id: RecordId::new(row.get(1)?),
                    visit_at: row.get(2)?,
                    kind: VisitKind::from_i64(kind).unwrap_or(VisitKind::Link),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(visits)
    }

    /// Total number of visits across all records.
    pub fn visit_count(&self) -> Result<u64, StoreError> {
        self.count_table("visits")
    }

    /// Total number of icon artifacts.
    pub fn icon_count(&self) -> Result<u64, StoreError> {
        self.count_table("icons")
    }

    /// Total number of annotation artifacts.
    pub fn annotation_count(&self) -> Result<u64, StoreError> {
        self.count_table("annotations")
    }

    /// Total number of input-history artifacts.
    pub fn input_history_count(&self) -> Result<u64, StoreError> {
        self.count_table("input_history")
    }

    /// Total number of interaction artifacts.
    pub fn interaction_count(&self) -> Result<u64, StoreError> {
        self.count_table("interactions")
    }

    fn count_table(&self, table: &str) -> Result<u64, StoreError> {
        // Table names come from the fixed list above, never from input.
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn pragma_i64(&self, pragma: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT * FROM pragma_{pragma}()");
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

impl StoreExecutor for SqliteStore {
    type Error = StoreError;

    fn prepare_expiration(&mut self) -> Result<(), Self::Error> {
        self.conn.execute(
            "CREATE TEMP TABLE IF NOT EXISTS expiration_notify (
                id INTEGER PRIMARY KEY,
                visit_id INTEGER,
                record_id INTEGER,
                url TEXT NOT NULL,
                guid TEXT NOT NULL,
                visit_at INTEGER,
                expected_results INTEGER NOT NULL DEFAULT 0,
                reason TEXT NOT NULL DEFAULT 'expired'
            )",
            [],
        )?;
        Ok(())
    }

    fn execute_expiration(
        &mut self,
        ops: &[BatchOp],
    ) -> Result<Vec<RemovalSignal>, Self::Error> {
        let tx = self.conn.transaction()?;
        for op in ops {
            let mut stmt = tx.prepare_cached(op.sql)?;
            let bound: Vec<(&str, &dyn rusqlite::ToSql)> = op
                .params
                .iter()
                .map(|(name, value)| (*name, value as &dyn rusqlite::ToSql))
                .collect();
            stmt.execute(&*bound)?;
        }

        let mut signals = Vec::new();
        {
            let mut stmt = tx.prepare_cached(
                "SELECT visit_id, record_id, url, guid, visit_at, expected_results, reason
                 FROM expiration_notify ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let reason: String = row.get(6)?;
                let reason = RemovalReason::parse(&reason).ok_or_else(|| {
                    StoreError::InvalidData(format!("unknown removal reason: {reason}"))
                })?;
                signals.push(RemovalSignal {
                    visit_id: row.get::<_, Option<i64>>(0)?.map(VisitId::new),
                    record_id: row.get::<_, Option<i64>>(1)?.map(RecordId::new),
                    url: row.get(2)?,
                    guid: row.get(3)?,
                    visit_at: row.get(4)?,
                    expected_results: row.get(5)?,
                    reason,
                });
            }
        }
        tx.execute("DELETE FROM expiration_notify", [])?;
        tx.commit()?;
        Ok(signals)
    }

    fn stats(&self) -> Result<StoreStats, Self::Error> {
        let page_size = self.pragma_i64("page_size")?;
        let page_count = self.pragma_i64("page_count")?;
        let freelist_count = self.pragma_i64("freelist_count")?;
        let record_count = self.record_count()?;
        Ok(StoreStats {
            record_count,
            allocated_bytes: (page_size * page_count).max(0) as u64,
            free_bytes: (page_size * freelist_count).max(0) as u64,
        })
    }

    fn record_count(&self) -> Result<u64, Self::Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::new(":memory:").unwrap()
    }

    #[test]
    fn test_schema_initializes() {
        let store = store();
        assert_eq!(store.record_count().unwrap(), 0);
        assert_eq!(store.visit_count().unwrap(), 0);
    }

    #[test]
    fn test_visit_triggers_maintain_record_columns() {
        let mut store = store();
        let id = store.add_record(&NewRecord::new("https://example.com/")).unwrap();

        let v1 = store.add_visit(id, 1_000, VisitKind::Link).unwrap();
        let v2 = store.add_visit(id, 2_000, VisitKind::Link).unwrap();

        let record = store.get_record(id).unwrap().unwrap();
        assert_eq!(record.visit_count, 2);
        assert_eq!(record.last_visit_at, Some(2_000));

        store
            .conn
            .execute("DELETE FROM visits WHERE id = ?1", params![v2.value()])
            .unwrap();
        let record = store.get_record(id).unwrap().unwrap();
        assert_eq!(record.visit_count, 1);
        assert_eq!(record.last_visit_at, Some(1_000));

        store
            .conn
            .execute("DELETE FROM visits WHERE id = ?1", params![v1.value()])
            .unwrap();
        let record = store.get_record(id).unwrap().unwrap();
        assert_eq!(record.visit_count, 0);
        assert_eq!(record.last_visit_at, None);
    }

    #[test]
    fn test_stats_reports_allocation() {
        let mut store = store();
        for i in 0..50 {
            store
                .add_record(&NewRecord::new(format!("https://example.com/{i}")))
                .unwrap();
        }
        let stats = store.stats().unwrap();
        assert_eq!(stats.record_count, 50);
        assert!(stats.allocated_bytes > 0);
        assert!(stats.free_bytes <= stats.allocated_bytes);
    }

    #[test]
    fn test_execute_expiration_drains_staging_table() {
        let mut store = store();
        store.prepare_expiration().unwrap();
        let id = store.add_record(&NewRecord::new("https://example.com/")).unwrap();
        store.add_visit(id, 1_000, VisitKind::Link).unwrap();

        let ops = vec![
            BatchOp {
                name: "stage_all_visits",
                sql: "INSERT INTO expiration_notify (visit_id, url, guid, visit_at)
                      SELECT v.id, r.url, r.guid, v.visit_at
                      FROM visits v JOIN records r ON r.id = v.record_id
                      LIMIT :limit",
                params: vec![(":limit", -1)],
            },
            BatchOp {
                name: "delete_staged_visits",
                sql: "DELETE FROM visits WHERE id IN (
                          SELECT visit_id FROM expiration_notify
                          WHERE visit_id NOT NULL)",
                params: vec![],
            },
        ];

        let signals = store.execute_expiration(&ops).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].url, "https://example.com/");
        assert_eq!(signals[0].reason, RemovalReason::Expired);
        assert_eq!(store.visit_count().unwrap(), 0);

        // Staging table is drained; a second run returns nothing.
        let signals = store.execute_expiration(&[]).unwrap();
        assert!(signals.is_empty());
    }

    #[test]
    fn test_execute_expiration_rolls_back_on_failure() {
        let mut store = store();
        store.prepare_expiration().unwrap();
        let id = store.add_record(&NewRecord::new("https://example.com/")).unwrap();
        store.add_visit(id, 1_000, VisitKind::Link).unwrap();

        let ops = vec![
            BatchOp {
                name: "delete_all_visits",
                sql: "DELETE FROM visits",
                params: vec![],
            },
            BatchOp {
                name: "broken",
                sql: "DELETE FROM no_such_table",
                params: vec![],
            },
        ];

        assert!(store.execute_expiration(&ops).is_err());
        // The earlier delete was rolled back with the failed run.
        assert_eq!(store.visit_count().unwrap(), 1);
    }

    #[test]
    fn test_persistent_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trove.db");

        let id = {
            let mut store = SqliteStore::new(&path).unwrap();
            store.add_record(&NewRecord::new("https://example.com/")).unwrap()
        };

        let store = SqliteStore::new(&path).unwrap();
        let record = store.get_record(id).unwrap().unwrap();
        assert_eq!(record.url, "https://example.com/");
        assert_eq!(record.score, 0);
    }
}

//! Record and visit types - the stored entities expiration operates on

use std::fmt;

/// Row id of a record in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw row id.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw row id.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row id of a visit in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VisitId(i64);

impl VisitId {
    /// Wrap a raw row id.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw row id.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique record identifier, UUIDv7 in canonical string form.
///
/// UUIDv7 keeps guids time-ordered, which makes store dumps and logs easy
/// to read without a join.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Guid(String);

impl Guid {
    /// Generate a fresh guid.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Wrap an existing guid string coming from the store.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The guid as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a visit.
///
/// Redirect visits are never classed as exotic by the expiration catalog,
/// since they are needed to recognize redirect sources. Downloads expire
/// sooner than regular visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitKind {
    /// A regular followed link.
    Link,
    /// Target of a permanent redirect.
    RedirectPermanent,
    /// Target of a temporary redirect.
    RedirectTemporary,
    /// A download.
    Download,
}

impl VisitKind {
    /// Numeric form stored in the database.
    pub fn as_i64(self) -> i64 {
        match self {
            VisitKind::Link => 1,
            VisitKind::RedirectPermanent => 5,
            VisitKind::RedirectTemporary => 6,
            VisitKind::Download => 7,
        }
    }

    /// Parse the stored numeric form.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(VisitKind::Link),
            5 => Some(VisitKind::RedirectPermanent),
            6 => Some(VisitKind::RedirectTemporary),
            7 => Some(VisitKind::Download),
            _ => None,
        }
    }

    /// Whether this visit is part of a redirect chain.
    pub fn is_redirect(self) -> bool {
        matches!(
            self,
            VisitKind::RedirectPermanent | VisitKind::RedirectTemporary
        )
    }
}

/// A stored historical record.
///
/// Created externally by the host; deleted only by expiration catalog
/// operations once it has zero visits and zero external references.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Unique row id.
    pub id: RecordId,

    /// The url/key string.
    pub url: String,

    /// Globally unique identifier.
    pub guid: Guid,

    /// Timestamp of the most recent visit (epoch millis), if any. Kept in
    /// sync with the visits table by store triggers.
    pub last_visit_at: Option<i64>,

    /// Number of visits currently owned by this record.
    pub visit_count: i64,

    /// Hidden records never show up in host UI surfaces.
    pub hidden: bool,

    /// Whether the record's url was ever typed by the user.
    pub typed: bool,

    /// Ranking score. `-1` marks a freshly inserted record that has not
    /// been scored yet; the orphan finder skips those so a record cannot
    /// be expired between its insertion and its first visit.
    pub score: i64,

    /// Count of external live references (bookmark-like). A record with a
    /// positive count is never deleted.
    pub foreign_count: i64,
}

/// A single visit belonging to a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visit {
    /// Unique row id.
    pub id: VisitId,

    /// Owning record.
    pub record_id: RecordId,

    /// When the visit happened (epoch millis).
    pub visit_at: i64,

    /// Classification of this visit.
    pub kind: VisitKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_is_unique_and_canonical() {
        let a = Guid::new();
        let b = Guid::new();

        assert_ne!(a, b);
        // Canonical UUID strings are 36 characters (8-4-4-4-12)
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_visit_kind_roundtrip() {
        for kind in [
            VisitKind::Link,
            VisitKind::RedirectPermanent,
            VisitKind::RedirectTemporary,
            VisitKind::Download,
        ] {
            assert_eq!(VisitKind::from_i64(kind.as_i64()), Some(kind));
        }
        assert_eq!(VisitKind::from_i64(99), None);
    }

    #[test]
    fn test_redirect_classification() {
        assert!(VisitKind::RedirectPermanent.is_redirect());
        assert!(VisitKind::RedirectTemporary.is_redirect());
        assert!(!VisitKind::Link.is_redirect());
        assert!(!VisitKind::Download.is_redirect());
    }
}

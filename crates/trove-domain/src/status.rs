//! Store status as estimated by the expiration feedback loop

use std::fmt;

/// Feedback-derived estimate of whether the store is over its retention
/// budget.
///
/// The controller starts at `Unknown` and flips between `Clean` and
/// `Dirty` based on the yield of size-gated expiration steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// The last size-gated step found fewer rows than requested.
    Clean,
    /// The last size-gated step consumed its whole budget; more rows are
    /// likely waiting.
    Dirty,
    /// No size-gated step has run yet.
    #[default]
    Unknown,
}

impl Status {
    /// Stable name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Clean => "clean",
            Status::Dirty => "dirty",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(Status::default(), Status::Unknown);
    }

    #[test]
    fn test_names() {
        assert_eq!(Status::Clean.as_str(), "clean");
        assert_eq!(Status::Dirty.as_str(), "dirty");
        assert_eq!(Status::Unknown.to_string(), "unknown");
    }
}

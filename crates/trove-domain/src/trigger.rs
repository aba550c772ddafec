//! Trigger actions and size classes selecting expiration behavior

use std::fmt;
use std::ops::BitOr;

/// Bitmask identifying which scheduling source caused an expiration run.
///
/// Catalog entries carry a mask of the actions they run under; an entry
/// executes when its mask intersects the run's action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action(u8);

impl Action {
    /// Fires every `interval_seconds`.
    pub const TIMED: Action = Action(1 << 0);

    /// Like TIMED, but only when the store is over its capacity limit.
    pub const TIMED_OVERLIMIT: Action = Action(1 << 1);

    /// Fires at shutdown, only for a dirty store.
    pub const SHUTDOWN_DIRTY: Action = Action(1 << 2);

    /// Fires on idle begin, only for a dirty store.
    pub const IDLE_DIRTY: Action = Action(1 << 3);

    /// Fires once per calendar day of accumulated idle time.
    pub const IDLE_DAILY: Action = Action(1 << 4);

    /// Fires on the manual/debug entry point.
    pub const DEBUG: Action = Action(1 << 5);

    /// Combine two masks; const form of `|` usable in static tables.
    pub const fn union(self, other: Action) -> Action {
        Action(self.0 | other.0)
    }

    /// Whether any bit is shared between the two masks.
    pub fn intersects(self, other: Action) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether `self` contains every bit of `other`.
    pub fn contains(self, other: Action) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bits, for logging.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Action {
    type Output = Action;

    fn bitor(self, rhs: Action) -> Action {
        Action(self.0 | rhs.0)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: &[(&str, Action)] = &[
            ("timed", Action::TIMED),
            ("timed-overlimit", Action::TIMED_OVERLIMIT),
            ("shutdown-dirty", Action::SHUTDOWN_DIRTY),
            ("idle-dirty", Action::IDLE_DIRTY),
            ("idle-daily", Action::IDLE_DAILY),
            ("debug", Action::DEBUG),
        ];
        let mut first = true;
        for (name, bit) in names {
            if self.intersects(*bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// Selects the batch-limit policy for one expiration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Usual partial expiration, a small chunk per step.
    Small,
    /// Idle or shutdown expiration, a large chunk per step.
    Large,
    /// No cap; expires everything eligible.
    Unlimited,
    /// Operator-supplied cap, carried separately as the debug override.
    Debug,
}

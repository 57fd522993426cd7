//! The four specimen/request priorities, shared by event queue tie-breaks,
//! resource waiting lines, and store ordering (spec §3: "lower is more
//! urgent").

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A priority level. Lower values are more urgent; `Ord` is derived in
/// declaration order so `Priority::Urgent < Priority::Routine` holds and a
/// plain `BinaryHeap` reversal (or a sort) produces the most-urgent-first
/// order everywhere it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Urgent,
    Priority,
    Cancer,
    Routine,
}

impl Priority {
    /// The raw integer value spec §3 assigns to this level (`Urgent = -3`
    /// ... `Routine = 0`). Exposed for diagnostics and snapshot output.
    pub const fn value(self) -> i32 {
        match self {
            Priority::Urgent => -3,
            Priority::Priority => -2,
            Priority::Cancer => -1,
            Priority::Routine => 0,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Priority::Urgent => "urgent",
            Priority::Priority => "priority",
            Priority::Cancer => "cancer",
            Priority::Routine => "routine",
        };
        write!(f, "{name}")
    }
}

/// A `(priority, sequence)` pair used as the sort key for both the event
/// queue and resource/store waiting lines: most-urgent-first, then earliest
/// wait-start first (spec §5(ii)/(iii)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySeq {
    pub priority: Priority,
    pub seq: u64,
}

impl PartialOrd for PrioritySeq {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritySeq {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgent_is_most_urgent() {
        assert!(Priority::Urgent < Priority::Priority);
        assert!(Priority::Priority < Priority::Cancer);
        assert!(Priority::Cancer < Priority::Routine);
    }

    #[test]
    fn raw_values_match_spec() {
        assert_eq!(Priority::Urgent.value(), -3);
        assert_eq!(Priority::Priority.value(), -2);
        assert_eq!(Priority::Cancer.value(), -1);
        assert_eq!(Priority::Routine.value(), 0);
    }

    #[test]
    fn priority_seq_orders_priority_first_then_seq() {
        let a = PrioritySeq { priority: Priority::Routine, seq: 0 };
        let b = PrioritySeq { priority: Priority::Urgent, seq: 100 };
        assert!(b < a, "urgent at later seq still outranks routine");

        let c = PrioritySeq { priority: Priority::Routine, seq: 1 };
        let d = PrioritySeq { priority: Priority::Routine, seq: 2 };
        assert!(c < d, "earlier wait-start wins at equal priority");
    }
}

//! Transaction lifecycle states.
//!
//! ```text
//! Pending ─► Proposing ─► Proposed ─► Committed
//!    │           │            │
//!    └───────────┴────────────┴──────► Rejected
//! ```
//!
//! Forward jumps are allowed (a block may propose or commit a transaction
//! before the pool reports the intermediate phase). `Committed` and
//! `Rejected` are terminal.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Entered the node's pool.
    Pending,
    /// Pool moved it into the proposing phase.
    Proposing,
    /// Listed in a block's proposal zone.
    Proposed,
    /// Included in a block body.
    Committed,
    /// Dropped by the pool.
    Rejected,
}

impl TransactionStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Proposing,
        Self::Proposed,
        Self::Committed,
        Self::Rejected,
    ];

    /// Persisted integer code.
    pub fn code(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Proposing => 1,
            Self::Proposed => 2,
            Self::Committed => 3,
            Self::Rejected => 4,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// `Committed` and `Rejected` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Rejected)
    }

    /// Returns `true` if a row in `self` may move to `next`.
    ///
    /// Re-entering the current status is not a transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        match next {
            Self::Rejected => true,
            _ => next.code() > self.code(),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Proposing => write!(f, "Proposing"),
            Self::Proposed => write!(f, "Proposed"),
            Self::Committed => write!(f, "Committed"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("invalid transaction status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(Pending.can_transition_to(Proposing));
        assert!(Proposing.can_transition_to(Proposed));
        assert!(Proposed.can_transition_to(Committed));
        // skipping phases is still forward
        assert!(Pending.can_transition_to(Proposed));
        assert!(Pending.can_transition_to(Committed));
    }

    #[test]
    fn backward_transitions_refused() {
        assert!(!Proposing.can_transition_to(Pending));
        assert!(!Proposed.can_transition_to(Proposing));
        assert!(!Proposed.can_transition_to(Pending));
    }

    #[test]
    fn rejection_from_any_non_terminal() {
        for from in [Pending, Proposing, Proposed] {
            assert!(from.can_transition_to(Rejected), "{from} -> Rejected");
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for next in TransactionStatus::ALL {
            assert!(!Committed.can_transition_to(next));
            assert!(!Rejected.can_transition_to(next));
        }
    }

    #[test]
    fn same_status_is_not_a_transition() {
        for s in TransactionStatus::ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn code_and_name_roundtrip() {
        for s in TransactionStatus::ALL {
            assert_eq!(TransactionStatus::from_code(s.code()), Some(s));
            assert_eq!(s.to_string().parse::<TransactionStatus>().unwrap(), s);
        }
        assert!(TransactionStatus::from_code(9).is_none());
        assert!("pending".parse::<TransactionStatus>().is_ok());
        assert!("elevated".parse::<TransactionStatus>().is_err());
    }
}

//! Analysis lifecycle status and the predicate used by conditional writes.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Lifecycle of one record's analysis.
///
/// Legal moves are `pending -> analyzing -> {done, failed}` plus
/// `analyzing -> analyzing` (retry in place). `done` and `failed` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Analyzing,
    Done,
    Failed,
}

impl AnalysisStatus {
    pub const ALL: [AnalysisStatus; 4] = [
        AnalysisStatus::Pending,
        AnalysisStatus::Analyzing,
        AnalysisStatus::Done,
        AnalysisStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Done => "done",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisStatus::Done | AnalysisStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle transition.
    pub fn can_transition_to(self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        matches!(
            (self, next),
            (Pending, Analyzing) | (Analyzing, Analyzing) | (Analyzing, Done) | (Analyzing, Failed)
        )
    }
}

impl core::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown analysis status '{s}'")))
    }
}

/// Status a conditional write requires the stored record to have at write time.
///
/// This is the compare half of the compare-and-swap every lifecycle write goes
/// through. Stores evaluate it atomically together with the write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedStatus {
    /// Stored status must equal this value.
    Exactly(AnalysisStatus),
    /// Stored status must not be terminal (`pending` or `analyzing`).
    NotTerminal,
}

impl ExpectedStatus {
    /// Statuses that satisfy this expectation.
    pub fn allowed(self) -> &'static [AnalysisStatus] {
        use AnalysisStatus::*;
        match self {
            ExpectedStatus::Exactly(Pending) => &[Pending],
            ExpectedStatus::Exactly(Analyzing) => &[Analyzing],
            ExpectedStatus::Exactly(Done) => &[Done],
            ExpectedStatus::Exactly(Failed) => &[Failed],
            ExpectedStatus::NotTerminal => &[Pending, Analyzing],
        }
    }

    pub fn matches(self, actual: AnalysisStatus) -> bool {
        self.allowed().contains(&actual)
    }

    /// Whether a record in `actual` may be written to `next` under this guard.
    ///
    /// Both the guard and the lifecycle must allow it; stores apply this
    /// atomically with the write.
    pub fn permits(self, actual: AnalysisStatus, next: AnalysisStatus) -> bool {
        self.matches(actual) && actual.can_transition_to(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::sample::select;

    fn any_status() -> impl Strategy<Value = AnalysisStatus> {
        select(AnalysisStatus::ALL.to_vec())
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for next in AnalysisStatus::ALL {
            assert!(!AnalysisStatus::Done.can_transition_to(next));
            assert!(!AnalysisStatus::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn retry_in_place_is_allowed() {
        assert!(AnalysisStatus::Analyzing.can_transition_to(AnalysisStatus::Analyzing));
        assert!(!AnalysisStatus::Pending.can_transition_to(AnalysisStatus::Done));
    }

    #[test]
    fn status_round_trips_through_str_and_serde() {
        for status in AnalysisStatus::ALL {
            assert_eq!(status.as_str().parse::<AnalysisStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("finished".parse::<AnalysisStatus>().is_err());
    }

    #[test]
    fn guard_refuses_lifecycle_violations_even_when_status_matches() {
        let pending = ExpectedStatus::Exactly(AnalysisStatus::Pending);
        assert!(pending.matches(AnalysisStatus::Pending));
        assert!(!pending.permits(AnalysisStatus::Pending, AnalysisStatus::Done));
        assert!(pending.permits(AnalysisStatus::Pending, AnalysisStatus::Analyzing));
    }

    proptest! {
        #[test]
        fn not_terminal_matches_exactly_the_non_terminal_states(status in any_status()) {
            prop_assert_eq!(ExpectedStatus::NotTerminal.matches(status), !status.is_terminal());
        }

        #[test]
        fn exactly_matches_only_itself(expected in any_status(), actual in any_status()) {
            prop_assert_eq!(ExpectedStatus::Exactly(expected).matches(actual), expected == actual);
        }

        #[test]
        fn legal_transitions_start_from_non_terminal_states(from in any_status(), to in any_status()) {
            if from.can_transition_to(to) {
                prop_assert!(!from.is_terminal());
                prop_assert!(ExpectedStatus::NotTerminal.matches(from));
            }
            prop_assert!(!ExpectedStatus::NotTerminal.permits(from, to) || from.can_transition_to(to));
        }
    }
}

//! The phase state machine (§4.5). A phase's status only ever moves along
//! the edges below; `can_transition_to` is consulted by every status write
//! so a bug elsewhere turns into an `InternalAssertionFailure` rather than a
//! silently corrupted phase.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseStatus {
    NotStarted,
    Running,
    Finished,
    Terminating,
    Terminated,
}

impl PhaseStatus {
    /// ```text
    /// NOT_STARTED --start()--> RUNNING
    /// RUNNING     --finish()--> FINISHED
    /// RUNNING     --terminate()--> TERMINATING
    /// FINISHED    --terminate()--> TERMINATING
    /// FINISHED    --(activeSessions->0)--> TERMINATED
    /// TERMINATING --(activeSessions->0)--> TERMINATED
    /// ```
    pub fn can_transition_to(self, next: PhaseStatus) -> bool {
        use PhaseStatus::*;
        matches!(
            (self, next),
            (NotStarted, Running)
                | (Running, Finished)
                | (Running, Terminating)
                | (Finished, Terminating)
                | (Finished, Terminated)
                | (Terminating, Terminated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Terminated)
    }

    pub fn is_finishing(self) -> bool {
        matches!(self, PhaseStatus::Finished | PhaseStatus::Terminating)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PhaseStatus::NotStarted => "NOT_STARTED",
            PhaseStatus::Running => "RUNNING",
            PhaseStatus::Finished => "FINISHED",
            PhaseStatus::Terminating => "TERMINATING",
            PhaseStatus::Terminated => "TERMINATED",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(PhaseStatus::NotStarted, PhaseStatus::Running, true)]
    #[test_case(PhaseStatus::Running, PhaseStatus::Finished, true)]
    #[test_case(PhaseStatus::Running, PhaseStatus::Terminating, true)]
    #[test_case(PhaseStatus::Finished, PhaseStatus::Terminating, true)]
    #[test_case(PhaseStatus::Finished, PhaseStatus::Terminated, true)]
    #[test_case(PhaseStatus::Terminating, PhaseStatus::Terminated, true)]
    #[test_case(PhaseStatus::Terminated, PhaseStatus::Running, false)]
    #[test_case(PhaseStatus::NotStarted, PhaseStatus::Finished, false)]
    #[test_case(PhaseStatus::Running, PhaseStatus::NotStarted, false)]
    fn transition_table(from: PhaseStatus, to: PhaseStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminated_has_no_outgoing_edges() {
        for next in [
            PhaseStatus::NotStarted,
            PhaseStatus::Running,
            PhaseStatus::Finished,
            PhaseStatus::Terminating,
            PhaseStatus::Terminated,
        ] {
            assert!(!PhaseStatus::Terminated.can_transition_to(next));
        }
    }
}

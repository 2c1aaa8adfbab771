//! The per-request lifecycle.
//!
//! ```text
//! Pending → MuteCheck → { BlockedOutOfScope | InScope }
//! InScope → PolicyCheck → { BlockedPolicy | Allowed }
//! Allowed → ConstraintCheck → { BlockedConstraint | Passed }
//! Passed → { BlockedPolicy (argument guard) | ExecuteOrSimulate }
//! ExecuteOrSimulate → { Succeeded | Error }
//! ```
//!
//! `Pending → Error` covers a trace that could not be opened.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Pending,
    MuteCheck,
    BlockedOutOfScope,
    InScope,
    PolicyCheck,
    BlockedPolicy,
    Allowed,
    ConstraintCheck,
    BlockedConstraint,
    Passed,
    ExecuteOrSimulate,
    Succeeded,
    Error,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::BlockedOutOfScope
                | RequestState::BlockedPolicy
                | RequestState::BlockedConstraint
                | RequestState::Succeeded
                | RequestState::Error
        )
    }

    /// True if `next` is a legal successor of `self`.
    pub fn allows(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Pending, MuteCheck)
                | (Pending, Error)
                | (MuteCheck, BlockedOutOfScope)
                | (MuteCheck, InScope)
                | (InScope, PolicyCheck)
                | (PolicyCheck, BlockedPolicy)
                | (PolicyCheck, Allowed)
                | (Allowed, ConstraintCheck)
                | (ConstraintCheck, BlockedConstraint)
                | (ConstraintCheck, Passed)
                | (Passed, BlockedPolicy)
                | (Passed, ExecuteOrSimulate)
                | (ExecuteOrSimulate, Succeeded)
                | (ExecuteOrSimulate, Error)
        )
    }

    /// Move to `next`. Illegal transitions are a kernel bug.
    pub fn advance(self, next: RequestState) -> RequestState {
        debug_assert!(self.allows(next), "illegal transition {self:?} -> {next:?}");
        next
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Pending => "PENDING",
            RequestState::MuteCheck => "MUTE_CHECK",
            RequestState::BlockedOutOfScope => "BLOCKED_OUT_OF_SCOPE",
            RequestState::InScope => "IN_SCOPE",
            RequestState::PolicyCheck => "POLICY_CHECK",
            RequestState::BlockedPolicy => "BLOCKED_POLICY",
            RequestState::Allowed => "ALLOWED",
            RequestState::ConstraintCheck => "CONSTRAINT_CHECK",
            RequestState::BlockedConstraint => "BLOCKED_CONSTRAINT",
            RequestState::Passed => "PASSED",
            RequestState::ExecuteOrSimulate => "EXECUTE_OR_SIMULATE",
            RequestState::Succeeded => "SUCCEEDED",
            RequestState::Error => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RequestState::{self, *};

    #[test]
    fn happy_path_is_legal() {
        let path = [
            Pending,
            MuteCheck,
            InScope,
            PolicyCheck,
            Allowed,
            ConstraintCheck,
            Passed,
            ExecuteOrSimulate,
            Succeeded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].allows(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(Succeeded.is_terminal());
    }

    #[test]
    fn blocked_states_are_terminal_and_have_no_successors() {
        let all = [
            Pending,
            MuteCheck,
            BlockedOutOfScope,
            InScope,
            PolicyCheck,
            BlockedPolicy,
            Allowed,
            ConstraintCheck,
            BlockedConstraint,
            Passed,
            ExecuteOrSimulate,
            Succeeded,
            Error,
        ];
        for terminal in all.iter().copied().filter(|s| s.is_terminal()) {
            assert!(
                all.iter().all(|next| !terminal.allows(*next)),
                "{terminal:?} must not have successors"
            );
        }
    }

    #[test]
    fn execution_is_unreachable_from_checks() {
        assert!(!PolicyCheck.allows(ExecuteOrSimulate));
        assert!(!ConstraintCheck.allows(ExecuteOrSimulate));
        assert!(!MuteCheck.allows(PolicyCheck));
        assert_eq!(RequestState::BlockedConstraint.as_str(), "BLOCKED_CONSTRAINT");
    }
}

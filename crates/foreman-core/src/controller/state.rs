//! Controller state machine vocabulary.

use serde::{Deserialize, Serialize};

/// States of the agentic loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Analyzing,
    SelectingTool,
    Dispatching,
    AwaitingResult,
    UpdatingPlan,
    Submitting,
    Standby,
    Aborted,
}

impl LoopState {
    /// Whether the machine may move from `self` to `to`.
    ///
    /// Any state may abort; `Aborted` is terminal.
    pub fn can_transition(&self, to: LoopState) -> bool {
        if *self == LoopState::Aborted {
            return false;
        }
        if to == LoopState::Aborted {
            return true;
        }
        matches!(
            (self, to),
            (LoopState::Idle, LoopState::Analyzing)
                | (LoopState::Analyzing, LoopState::SelectingTool)
                | (LoopState::Analyzing, LoopState::Submitting)
                | (LoopState::SelectingTool, LoopState::Dispatching)
                | (LoopState::Dispatching, LoopState::AwaitingResult)
                | (LoopState::AwaitingResult, LoopState::UpdatingPlan)
                | (LoopState::UpdatingPlan, LoopState::Analyzing)
                | (LoopState::UpdatingPlan, LoopState::Submitting)
                | (LoopState::Submitting, LoopState::Standby)
                | (LoopState::Standby, LoopState::Analyzing)
        )
    }

    /// Whether the loop has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Standby | LoopState::Aborted)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Analyzing => "analyzing",
            LoopState::SelectingTool => "selecting_tool",
            LoopState::Dispatching => "dispatching",
            LoopState::AwaitingResult => "awaiting_result",
            LoopState::UpdatingPlan => "updating_plan",
            LoopState::Submitting => "submitting",
            LoopState::Standby => "standby",
            LoopState::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let path = [
            LoopState::Idle,
            LoopState::Analyzing,
            LoopState::SelectingTool,
            LoopState::Dispatching,
            LoopState::AwaitingResult,
            LoopState::UpdatingPlan,
            LoopState::Analyzing,
            LoopState::SelectingTool,
            LoopState::Dispatching,
            LoopState::AwaitingResult,
            LoopState::UpdatingPlan,
            LoopState::Submitting,
            LoopState::Standby,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn standby_resumes_on_next_event() {
        assert!(LoopState::Standby.can_transition(LoopState::Analyzing));
    }

    #[test]
    fn any_state_may_abort_except_aborted() {
        for state in [
            LoopState::Idle,
            LoopState::Analyzing,
            LoopState::SelectingTool,
            LoopState::Dispatching,
            LoopState::AwaitingResult,
            LoopState::UpdatingPlan,
            LoopState::Submitting,
            LoopState::Standby,
        ] {
            assert!(state.can_transition(LoopState::Aborted), "{state} -> aborted");
        }
        assert!(!LoopState::Aborted.can_transition(LoopState::Analyzing));
        assert!(!LoopState::Aborted.can_transition(LoopState::Aborted));
    }

    #[test]
    fn no_state_skipping() {
        assert!(!LoopState::Idle.can_transition(LoopState::Dispatching));
        assert!(!LoopState::Analyzing.can_transition(LoopState::AwaitingResult));
        assert!(!LoopState::Dispatching.can_transition(LoopState::UpdatingPlan));
        assert!(!LoopState::AwaitingResult.can_transition(LoopState::Submitting));
    }
}

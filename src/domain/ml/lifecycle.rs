use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of a single prediction request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Idle,
    Normalizing,
    Windowing,
    Training,
    Predicting,
    Done,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Done | RequestState::Failed)
    }

    /// Stage that follows this one on the success path.
    pub fn successor(&self) -> Option<RequestState> {
        match self {
            RequestState::Idle => Some(RequestState::Normalizing),
            RequestState::Normalizing => Some(RequestState::Windowing),
            RequestState::Windowing => Some(RequestState::Training),
            RequestState::Training => Some(RequestState::Predicting),
            RequestState::Predicting => Some(RequestState::Done),
            RequestState::Done | RequestState::Failed => None,
        }
    }

    /// Forward one stage, or `Failed` from any live stage. Terminal states never move.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == RequestState::Failed || self.successor() == Some(next)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

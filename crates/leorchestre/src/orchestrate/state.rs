use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::KickoffMode;
use crate::model::Phase;

/// Position of one orchestration in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Checking the tournament parameters. No remote call yet.
    Validating,
    /// Creating the tournament on the engine.
    Scheduling,
    /// Enrolling entrants.
    Registering,
    /// Moving the tournament to `ABOUT_TO_START`.
    Staging,
    /// Waiting out the pre-kickoff delay, then kicking off.
    WaitingToKickoff,
    /// Watching the tournament until it ends.
    Running,
    /// Ending the tournament and ranking entrants.
    Finalizing,
    /// Ranking reported. Terminal.
    Done,
    /// Aborted by a failure in `phase`. Terminal.
    Failed {
        /// Phase that failed
        phase: Phase,
    },
    /// Aborted by cancellation during `phase`. Terminal.
    Cancelled {
        /// Phase interrupted
        phase: Phase,
    },
}

impl OrchestratorState {
    /// Phase this state belongs to. `None` once done.
    pub fn phase(self) -> Option<Phase> {
        match self {
            Self::Validating => Some(Phase::Validating),
            Self::Scheduling => Some(Phase::Scheduling),
            Self::Registering => Some(Phase::Registering),
            Self::Staging => Some(Phase::Staging),
            Self::WaitingToKickoff => Some(Phase::WaitingToKickoff),
            Self::Running => Some(Phase::Running),
            Self::Finalizing => Some(Phase::Finalizing),
            Self::Done => None,
            Self::Failed { phase } | Self::Cancelled { phase } => Some(phase),
        }
    }

    /// Whether the run has stopped.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. } | Self::Cancelled { .. })
    }

    /// Forward successor under `mode`. `None` for terminal states.
    ///
    /// Direct kickoff skips `Staging`.
    pub fn successor(self, mode: KickoffMode) -> Option<Self> {
        match self {
            Self::Validating => Some(Self::Scheduling),
            Self::Scheduling => Some(Self::Registering),
            Self::Registering => match mode {
                KickoffMode::Staged => Some(Self::Staging),
                KickoffMode::Direct => Some(Self::WaitingToKickoff),
            },
            Self::Staging => Some(Self::WaitingToKickoff),
            Self::WaitingToKickoff => Some(Self::Running),
            Self::Running => Some(Self::Finalizing),
            Self::Finalizing => Some(Self::Done),
            Self::Done | Self::Failed { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Whether moving to `next` is allowed.
    ///
    /// Only the forward successor, or failure/cancellation tagged with the
    /// current phase, may follow a non-terminal state.
    pub fn can_transition_to(self, next: Self, mode: KickoffMode) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed { phase } | Self::Cancelled { phase } => self.phase() == Some(phase),
            _ => self.successor(mode) == Some(next),
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Failed { phase } => write!(f, "failed({phase})"),
            Self::Cancelled { phase } => write!(f, "cancelled({phase})"),
            other => match other.phase() {
                Some(phase) => write!(f, "{phase}"),
                None => Ok(()),
            },
        }
    }
}

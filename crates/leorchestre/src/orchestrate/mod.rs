//! Tournament orchestration.
//!
//! [`Orchestrator::run`] validates the parameters, then walks one tournament
//! through scheduling, registration, staging, kickoff, monitoring and
//! finalization. Every phase failure stops the walk and is returned as a
//! structured [`Outcome`].

mod engine;
mod state;

pub use engine::Orchestrator;
pub use state::OrchestratorState;

use serde::{Deserialize, Serialize};

use crate::error::FailureCause;
use crate::model::{Phase, RankedEntrant, TournamentId};

/// Final result of one orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The tournament ended and entrants were ranked.
    Completed {
        /// Tournament id
        tournament_id: TournamentId,
        /// Entrants in rank order
        ranking: Vec<RankedEntrant>,
        /// Broadcast channel of the tournament
        channel: String,
        /// Game code of the first table
        first_table: String,
    },

    /// A phase failed. Applied phases are not undone.
    Failed {
        /// Phase that failed
        phase: Phase,
        /// Tournament id, when scheduling got that far
        tournament_id: Option<TournamentId>,
        /// Why it failed
        cause: FailureCause,
    },

    /// The run was cancelled. Not an error.
    Cancelled {
        /// Phase interrupted
        phase: Phase,
        /// Tournament id, when scheduling got that far
        tournament_id: Option<TournamentId>,
    },
}

impl Outcome {
    /// Whether the tournament completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    /// Tournament id, if one was assigned.
    pub fn tournament_id(&self) -> Option<TournamentId> {
        match self {
            Outcome::Completed { tournament_id, .. } => Some(*tournament_id),
            Outcome::Failed { tournament_id, .. } | Outcome::Cancelled { tournament_id, .. } => {
                *tournament_id
            }
        }
    }

    /// Ranking of a completed run.
    pub fn ranking(&self) -> Option<&[RankedEntrant]> {
        match self {
            Outcome::Completed { ranking, .. } => Some(ranking),
            _ => None,
        }
    }

    /// Failure cause of a failed run.
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            Outcome::Failed { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable report.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        match self {
            Outcome::Completed {
                tournament_id,
                ranking,
                channel,
                first_table,
            } => {
                out.push_str(&format!(
                    "Tournament {tournament_id} completed ({} entrants, channel {channel}, first table {first_table})\n",
                    ranking.len()
                ));
                out.push_str(&format!(
                    "{:>5}  {:>10}  {:>10}  {:>8}\n",
                    "RANK", "ENTRANT", "CHIPS", "BUSTED"
                ));
                for entry in ranking {
                    let busted = entry
                        .stats
                        .busted_order
                        .map(|order| format!("#{order}"))
                        .unwrap_or_else(|| "-".to_string());
                    out.push_str(&format!(
                        "{:>5}  {:>10}  {:>10}  {:>8}\n",
                        entry.rank, entry.entrant_id, entry.stats.final_chips, busted
                    ));
                }
            }
            Outcome::Failed {
                phase,
                tournament_id,
                cause,
            } => {
                out.push_str(&format!(
                    "Tournament {} failed during {phase}: {cause}\n",
                    display_id(*tournament_id)
                ));
                if cause.needs_manual_check() {
                    out.push_str("Remote state is unknown; check the engine before retrying.\n");
                }
            }
            Outcome::Cancelled {
                phase,
                tournament_id,
            } => {
                out.push_str(&format!(
                    "Tournament {} cancelled during {phase}\n",
                    display_id(*tournament_id)
                ));
            }
        }
        out
    }
}

fn display_id(id: Option<TournamentId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "(unscheduled)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntrantStats;

    fn completed() -> Outcome {
        let stats = EntrantStats {
            entrant_id: 9,
            final_chips: 150_000,
            busted_order: None,
            hands_played: 210,
            times_moved: 2,
            duration_played: 5400,
            chips_before_busted: None,
            largest_stack: 150_000,
            lowest_stack: 1200,
        };
        Outcome::Completed {
            tournament_id: TournamentId(42),
            ranking: vec![RankedEntrant {
                entrant_id: 9,
                rank: 1,
                stats,
            }],
            channel: "tournament-42".to_string(),
            first_table: "t-42-1".to_string(),
        }
    }

    #[test]
    fn completed_summary_lists_ranking() {
        let summary = completed().summary();
        assert!(summary.contains("Tournament 42 completed"));
        assert!(summary.contains("t-42-1"));
        assert!(summary.contains("150000"));
    }

    #[test]
    fn summary_lines_are_newline_terminated() {
        let summary = completed().summary();
        assert!(summary.ends_with('\n'));
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].trim_start().starts_with("RANK"));
        assert!(lines[2].trim_start().starts_with('1'));
    }

    #[test]
    fn failed_outcome_reports_phase_and_cause() {
        let outcome = Outcome::Failed {
            phase: Phase::Registering,
            tournament_id: Some(TournamentId(42)),
            cause: FailureCause::PartialRegistration {
                accepted: 20,
                requested: 30,
                reason: None,
            },
        };
        assert_eq!(outcome.tournament_id(), Some(TournamentId(42)));
        assert!(outcome.summary().contains("failed during registering"));

        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["phase"], "registering");
        assert_eq!(json["cause"]["cause"], "partial_registration");
    }

    #[test]
    fn unscheduled_cancellation() {
        let outcome = Outcome::Cancelled {
            phase: Phase::Scheduling,
            tournament_id: None,
        };
        assert!(!outcome.is_completed());
        assert!(outcome.summary().contains("(unscheduled)"));
        assert!(outcome.ranking().is_none());
    }

    #[test]
    fn outcome_json_roundtrip() {
        let json = completed().to_json_pretty().expect("serialize");
        let back: Outcome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, completed());
    }
}

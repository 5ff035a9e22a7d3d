// Tournament data model
//
// *Le Modèle* (The Model) - identities, statuses and per-entrant statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tournament identity assigned by the remote engine on scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TournamentId(pub u64);

impl fmt::Display for TournamentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote tournament status as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStatus {
    /// Engine has no status for the tournament yet.
    Unknown,
    /// Initial state after a successful schedule call.
    Scheduled,
    /// Staged; entrants are joining their tables.
    AboutToStart,
    /// Kicked off and in progress.
    Running,
    /// Finished. Terminal.
    Ended,
    /// Aborted on the engine side. Terminal.
    Cancelled,
}

impl TournamentStatus {
    /// Position in the forward lifecycle. `Unknown` sorts before everything.
    fn ordinal(self) -> u8 {
        match self {
            TournamentStatus::Unknown => 0,
            TournamentStatus::Scheduled => 1,
            TournamentStatus::AboutToStart => 2,
            TournamentStatus::Running => 3,
            TournamentStatus::Ended | TournamentStatus::Cancelled => 4,
        }
    }

    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, TournamentStatus::Ended | TournamentStatus::Cancelled)
    }

    /// Whether this status is `expected` or a later forward status.
    ///
    /// `Cancelled` never satisfies a forward expectation other than itself.
    pub fn has_reached(self, expected: TournamentStatus) -> bool {
        if self == TournamentStatus::Cancelled {
            return expected == TournamentStatus::Cancelled;
        }
        self.ordinal() >= expected.ordinal()
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TournamentStatus::Unknown => "UNKNOWN",
            TournamentStatus::Scheduled => "SCHEDULED",
            TournamentStatus::AboutToStart => "ABOUT_TO_START",
            TournamentStatus::Running => "RUNNING",
            TournamentStatus::Ended => "ENDED",
            TournamentStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// One discrete step of the tournament lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Local configuration validation. Issues no remote call.
    Validating,
    /// Schedule call.
    Scheduling,
    /// Entrant registration.
    Registering,
    /// About-to-start trigger followed by the pre-kickoff wait.
    Staging,
    /// Kickoff call.
    WaitingToKickoff,
    /// Status polling until the tournament ends.
    Running,
    /// End call, stats collection and ranking.
    Finalizing,
}

impl Phase {
    /// Stable lowercase name, used in idempotency keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Validating => "validating",
            Phase::Scheduling => "scheduling",
            Phase::Registering => "registering",
            Phase::Staging => "staging",
            Phase::WaitingToKickoff => "kickoff",
            Phase::Running => "running",
            Phase::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(tournament id, phase)` pair that makes a repeated remote call safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyKey {
    /// Tournament the call applies to.
    pub tournament_id: TournamentId,
    /// Phase the call belongs to.
    pub phase: Phase,
}

impl IdempotencyKey {
    /// Build a key for `phase` of tournament `tournament_id`.
    pub fn new(tournament_id: TournamentId, phase: Phase) -> Self {
        Self {
            tournament_id,
            phase,
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tournament-{}:{}", self.tournament_id, self.phase)
    }
}

/// In-memory view of the tournament being orchestrated.
///
/// The remote engine is the system of record; only `status` is mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    id: TournamentId,
    /// Display name.
    pub name: String,
    /// Chips each entrant starts with.
    pub starting_chips: u64,
    /// Seats per table.
    pub max_entrants_per_table: u32,
    /// Requested start time.
    pub scheduled_start_time: DateTime<Utc>,
    status: TournamentStatus,
}

impl Tournament {
    /// A freshly scheduled tournament.
    pub fn scheduled(
        id: TournamentId,
        name: impl Into<String>,
        starting_chips: u64,
        max_entrants_per_table: u32,
        scheduled_start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            starting_chips,
            max_entrants_per_table,
            scheduled_start_time,
            status: TournamentStatus::Scheduled,
        }
    }

    /// Engine-assigned id.
    pub fn id(&self) -> TournamentId {
        self.id
    }

    /// Last status confirmed by the orchestrator.
    pub fn status(&self) -> TournamentStatus {
        self.status
    }

    /// Move the status forward. Backward moves are rejected and leave the status untouched.
    pub fn advance(&mut self, next: TournamentStatus) -> Result<(), TournamentStatus> {
        let forward = next == TournamentStatus::Cancelled || next.has_reached(self.status);
        if self.status.is_terminal() || !forward {
            return Err(self.status);
        }
        self.status = next;
        Ok(())
    }

    /// Registration request for `count` entrants.
    ///
    /// Only valid while the tournament is still `SCHEDULED`.
    pub fn registration_request(&self, count: u32) -> Option<RegistrationRequest> {
        if self.status != TournamentStatus::Scheduled || count == 0 {
            return None;
        }
        Some(RegistrationRequest {
            tournament_id: self.id,
            requested_count: count,
        })
    }

    /// Broadcast channel the engine publishes tournament messages on.
    pub fn channel(&self) -> String {
        format!("tournament-{}", self.id)
    }

    /// Game code of table `table_no`.
    pub fn table_game_code(&self, table_no: u32) -> String {
        format!("t-{}-{}", self.id, table_no)
    }
}

/// Request to enrol `requested_count` entrants into a scheduled tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Target tournament.
    pub tournament_id: TournamentId,
    /// Number of entrants to enrol, at least one.
    pub requested_count: u32,
}

/// Per-entrant statistics produced by the engine once the tournament ends.
///
/// Field order drives the derived `Ord`, which ranking uses as the last tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrantStats {
    /// Entrant identity.
    pub entrant_id: u64,
    /// Chips at the end, zero when busted.
    pub final_chips: u64,
    /// Elimination sequence (1 = first out). `None` while still active.
    #[serde(default)]
    pub busted_order: Option<u32>,
    /// Hands dealt to the entrant.
    #[serde(default)]
    pub hands_played: u32,
    /// Table moves during balancing.
    #[serde(default)]
    pub times_moved: u32,
    /// Seconds spent in the tournament.
    #[serde(default)]
    pub duration_played: u64,
    /// Stack right before the busting hand.
    #[serde(default)]
    pub chips_before_busted: Option<u64>,
    /// Largest stack held.
    #[serde(default)]
    pub largest_stack: u64,
    /// Smallest stack held.
    #[serde(default)]
    pub lowest_stack: u64,
}

impl EntrantStats {
    /// Still in the tournament at the end.
    pub fn is_active(&self) -> bool {
        self.busted_order.is_none()
    }
}

/// Final position of one entrant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntrant {
    /// Entrant identity.
    pub entrant_id: u64,
    /// 1-based rank.
    pub rank: u32,
    /// Statistics the rank was derived from.
    pub stats: EntrantStats,
}

/// One observation made by the progress monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSnapshot {
    /// Observed tournament.
    pub tournament_id: TournamentId,
    /// Status at poll time.
    pub status: TournamentStatus,
    /// Time since the watch started.
    pub elapsed: Duration,
}

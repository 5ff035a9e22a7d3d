// Simulated engine
//
// In-process stand-in for the remote engine and the entrant pool. Honours
// idempotency keys, ends a running tournament after a fixed number of status
// polls and produces deterministic final stats.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::TransportError;
use crate::model::{EntrantStats, IdempotencyKey, RegistrationRequest, TournamentId, TournamentStatus};
use crate::protocol::{
    EngineService, RegistrationResponse, RegistrationService, ScheduleRequest, StatusReport,
};

/// Default entrant pool size.
pub const DEFAULT_POOL_SIZE: u32 = 100;

/// Default number of running polls before the tournament ends.
pub const DEFAULT_TICKS_TO_END: u32 = 5;

#[derive(Debug)]
struct SimTournament {
    status: TournamentStatus,
    starting_chips: u64,
    registered: u32,
    ticks: u32,
    stats: Vec<EntrantStats>,
}

#[derive(Debug, Default)]
struct SimState {
    next_id: u64,
    tournaments: HashMap<TournamentId, SimTournament>,
    applied: HashSet<IdempotencyKey>,
    registrations: HashMap<TournamentId, RegistrationResponse>,
    pool_used: u32,
    failures: HashMap<&'static str, u32>,
    calls: Vec<String>,
}

/// Scripted engine and entrant pool.
#[derive(Debug)]
pub struct SimulatedEngine {
    state: Mutex<SimState>,
    pool_size: u32,
    ticks_to_end: u32,
    transient_failures: u32,
    seed: u64,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    /// Engine with the default pool and tick count.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_id: 1,
                ..SimState::default()
            }),
            pool_size: DEFAULT_POOL_SIZE,
            ticks_to_end: DEFAULT_TICKS_TO_END,
            transient_failures: 0,
            seed: 0x5eed,
        }
    }

    /// Entrants available across all tournaments.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Running polls before the tournament ends on its own.
    #[must_use]
    pub fn with_ticks_to_end(mut self, ticks: u32) -> Self {
        self.ticks_to_end = ticks.max(1);
        self
    }

    /// Make the first `count` calls of every operation fail without response.
    #[must_use]
    pub fn with_transient_failures(mut self, count: u32) -> Self {
        self.transient_failures = count;
        self
    }

    /// Seed for the final stats.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Operations received, in order, as `name(tournament id)`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Current status of `tournament_id`.
    pub fn status(&self, tournament_id: TournamentId) -> Option<TournamentStatus> {
        self.lock().tournaments.get(&tournament_id).map(|t| t.status)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and inject a transient failure if one is due.
    fn enter(&self, state: &mut SimState, op: &'static str, target: String) -> Result<(), TransportError> {
        state.calls.push(format!("{op}({target})"));
        let seen = state.failures.entry(op).or_insert(0);
        if *seen < self.transient_failures {
            *seen += 1;
            debug!(op, attempt = *seen, "simulated transient failure");
            return Err(TransportError::Unreachable(format!("simulated outage on {op}")));
        }
        Ok(())
    }

    fn finish(&self, id: TournamentId, tournament: &mut SimTournament) {
        tournament.status = TournamentStatus::Ended;
        if tournament.stats.is_empty() {
            tournament.stats = final_stats(
                self.seed ^ id.0,
                tournament.registered,
                tournament.starting_chips,
            );
        }
    }
}

#[async_trait]
impl EngineService for SimulatedEngine {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<TournamentId, TransportError> {
        let mut state = self.lock();
        self.enter(&mut state, "schedule", request.name.clone())?;

        let id = TournamentId(state.next_id);
        state.next_id += 1;
        state.tournaments.insert(
            id,
            SimTournament {
                status: TournamentStatus::Scheduled,
                starting_chips: request.starting_chips,
                registered: 0,
                ticks: 0,
                stats: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn trigger_about_to_start(&self, key: IdempotencyKey) -> Result<bool, TransportError> {
        let mut state = self.lock();
        self.enter(&mut state, "trigger_about_to_start", key.tournament_id.to_string())?;
        if state.applied.contains(&key) {
            return Ok(true);
        }

        let tournament = state
            .tournaments
            .get_mut(&key.tournament_id)
            .ok_or_else(|| TransportError::Rejected(format!("unknown tournament {}", key.tournament_id)))?;
        if tournament.status != TournamentStatus::Scheduled {
            return Ok(false);
        }
        tournament.status = TournamentStatus::AboutToStart;
        state.applied.insert(key);
        Ok(true)
    }

    async fn kickoff(&self, key: IdempotencyKey) -> Result<bool, TransportError> {
        let mut state = self.lock();
        self.enter(&mut state, "kickoff", key.tournament_id.to_string())?;
        if state.applied.contains(&key) {
            return Ok(true);
        }

        let tournament = state
            .tournaments
            .get_mut(&key.tournament_id)
            .ok_or_else(|| TransportError::Rejected(format!("unknown tournament {}", key.tournament_id)))?;
        let ready = matches!(
            tournament.status,
            TournamentStatus::Scheduled | TournamentStatus::AboutToStart
        );
        if !ready || tournament.registered < 2 {
            return Ok(false);
        }
        tournament.status = TournamentStatus::Running;
        state.applied.insert(key);
        Ok(true)
    }

    async fn query_status(&self, tournament_id: TournamentId) -> Result<StatusReport, TransportError> {
        let mut state = self.lock();
        self.enter(&mut state, "query_status", tournament_id.to_string())?;

        let ticks_to_end = self.ticks_to_end;
        let tournament = state
            .tournaments
            .get_mut(&tournament_id)
            .ok_or_else(|| TransportError::Rejected(format!("unknown tournament {tournament_id}")))?;

        if tournament.status == TournamentStatus::Running {
            tournament.ticks += 1;
            if tournament.ticks >= ticks_to_end {
                self.finish(tournament_id, tournament);
            }
        }

        let active = match tournament.status {
            TournamentStatus::Running => {
                let remaining = ticks_to_end.saturating_sub(tournament.ticks);
                let left = u64::from(tournament.registered) * u64::from(remaining)
                    / u64::from(ticks_to_end.max(1));
                Some(u32::try_from(left).unwrap_or(u32::MAX).max(1))
            }
            TournamentStatus::Ended => {
                Some(tournament.stats.iter().filter(|s| s.is_active()).count() as u32)
            }
            _ => None,
        };

        Ok(StatusReport {
            status: tournament.status,
            active_entrants: active,
            current_level: Some(tournament.ticks + 1),
        })
    }

    async fn end(&self, key: IdempotencyKey) -> Result<Vec<EntrantStats>, TransportError> {
        let mut state = self.lock();
        self.enter(&mut state, "end", key.tournament_id.to_string())?;

        let tournament = state
            .tournaments
            .get_mut(&key.tournament_id)
            .ok_or_else(|| TransportError::Rejected(format!("unknown tournament {}", key.tournament_id)))?;
        match tournament.status {
            TournamentStatus::Running => self.finish(key.tournament_id, tournament),
            TournamentStatus::Ended => {}
            other => {
                return Err(TransportError::Rejected(format!(
                    "tournament {} cannot end while {other}",
                    key.tournament_id
                )))
            }
        }
        let stats = tournament.stats.clone();
        state.applied.insert(key);
        Ok(stats)
    }
}

#[async_trait]
impl RegistrationService for SimulatedEngine {
    async fn register_entrants(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, TransportError> {
        let mut state = self.lock();
        self.enter(&mut state, "register_entrants", request.tournament_id.to_string())?;
        if let Some(previous) = state.registrations.get(&request.tournament_id) {
            return Ok(previous.clone());
        }

        let available = self.pool_size.saturating_sub(state.pool_used);
        let tournament = state
            .tournaments
            .get_mut(&request.tournament_id)
            .ok_or_else(|| TransportError::Rejected(format!("unknown tournament {}", request.tournament_id)))?;
        if tournament.status != TournamentStatus::Scheduled {
            return Err(TransportError::Rejected(format!(
                "registration closed: tournament is {}",
                tournament.status
            )));
        }

        let accepted = request.requested_count.min(available);
        tournament.registered = accepted;
        let response = RegistrationResponse {
            accepted_count: accepted,
            rejected_reason: (accepted < request.requested_count)
                .then(|| format!("pool exhausted: {available} entrants available")),
        };
        state.pool_used += accepted;
        state.registrations.insert(request.tournament_id, response.clone());
        Ok(response)
    }
}

/// Deterministic final stats for `entrants` players. Chips are conserved
/// whenever the field's total stack fits in a `u64`.
fn final_stats(seed: u64, entrants: u32, starting_chips: u64) -> Vec<EntrantStats> {
    if entrants == 0 {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<u64> = (1..=u64::from(entrants)).collect();
    order.shuffle(&mut rng);

    let survivors = (entrants / 10).max(1) as usize;
    let busted_count = order.len() - survivors;
    let total_chips = u128::from(starting_chips) * u128::from(entrants);

    let weights: Vec<u128> = (0..survivors).map(|_| rng.gen_range(1..=100u128)).collect();
    let weight_sum: u128 = weights.iter().sum();
    let mut shares: Vec<u128> = weights.iter().map(|w| total_chips * w / weight_sum).collect();
    let handed_out: u128 = shares.iter().sum();
    shares[0] += total_chips - handed_out;

    let stack_cap = starting_chips.max(1);
    let mut stats = Vec::with_capacity(order.len());
    for (position, entrant_id) in order.iter().copied().enumerate() {
        let moved = rng.gen_range(0..3u32);
        if position < busted_count {
            let busted_order = u32::try_from(position + 1).unwrap_or(u32::MAX);
            let hands = busted_order.saturating_mul(7).saturating_add(10);
            stats.push(EntrantStats {
                entrant_id,
                final_chips: 0,
                busted_order: Some(busted_order),
                hands_played: hands,
                times_moved: moved,
                duration_played: u64::from(hands) * 30,
                chips_before_busted: Some(rng.gen_range(1..=stack_cap)),
                largest_stack: starting_chips.saturating_add(rng.gen_range(0..stack_cap)),
                lowest_stack: 0,
            });
        } else {
            let chips = u64::try_from(shares[position - busted_count]).unwrap_or(u64::MAX);
            let hands = u32::try_from(busted_count)
                .unwrap_or(u32::MAX)
                .saturating_mul(7)
                .saturating_add(30);
            stats.push(EntrantStats {
                entrant_id,
                final_chips: chips,
                busted_order: None,
                hands_played: hands,
                times_moved: moved,
                duration_played: u64::from(hands) * 30,
                chips_before_busted: None,
                largest_stack: chips.max(starting_chips),
                lowest_stack: chips.min(starting_chips / 2),
            });
        }
    }
    stats
}

//! Typed remote-control client for the game engine.

use tracing::{debug, info};

use crate::cancel::CancellationSignal;
use crate::config::CallTimeouts;
use crate::error::CallError;
use crate::model::{EntrantStats, IdempotencyKey, Phase, TournamentId};
use crate::protocol::{EngineService, ScheduleRequest, StatusReport};
use crate::retry::RetryPolicy;

/// Attempts allowed for `schedule`, which has no idempotency key.
pub const SCHEDULE_MAX_ATTEMPTS: u32 = 2;

/// Wraps an [`EngineService`] with per-call timeouts and the retry policy.
///
/// Holds no per-tournament state, so one client can serve many concurrent
/// orchestrations.
#[derive(Debug)]
pub struct RemoteControlClient<E> {
    engine: E,
    timeouts: CallTimeouts,
    retry: RetryPolicy,
}

impl<E: EngineService> RemoteControlClient<E> {
    /// Create a client over `engine`.
    pub fn new(engine: E, timeouts: CallTimeouts, retry: RetryPolicy) -> Self {
        Self {
            engine,
            timeouts,
            retry,
        }
    }

    /// Underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Retry policy applied to keyed calls.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Schedule a tournament.
    ///
    /// Retried at most once: a second ambiguous failure is surfaced as
    /// [`CallError::Exhausted`] so the caller can check for a duplicate.
    pub async fn schedule(
        &self,
        request: &ScheduleRequest,
        cancel: &CancellationSignal,
    ) -> Result<TournamentId, CallError> {
        let id = self
            .retry
            .capped(SCHEDULE_MAX_ATTEMPTS)
            .run("schedule", self.timeouts.control(), cancel, |_| {
                self.engine.schedule(request)
            })
            .await?;
        info!(tournament_id = %id, name = %request.name, "tournament scheduled");
        Ok(id)
    }

    /// Trigger `ABOUT_TO_START`.
    pub async fn trigger_about_to_start(
        &self,
        tournament_id: TournamentId,
        cancel: &CancellationSignal,
    ) -> Result<(), CallError> {
        let key = IdempotencyKey::new(tournament_id, Phase::Staging);
        let accepted = self
            .retry
            .run("trigger_about_to_start", self.timeouts.control(), cancel, |_| {
                self.engine.trigger_about_to_start(key)
            })
            .await?;
        accepted_or_rejected(accepted, key)
    }

    /// Kick the tournament off.
    pub async fn kickoff(
        &self,
        tournament_id: TournamentId,
        cancel: &CancellationSignal,
    ) -> Result<(), CallError> {
        let key = IdempotencyKey::new(tournament_id, Phase::WaitingToKickoff);
        let accepted = self
            .retry
            .run("kickoff", self.timeouts.control(), cancel, |_| {
                self.engine.kickoff(key)
            })
            .await?;
        accepted_or_rejected(accepted, key)
    }

    /// Read the current status.
    pub async fn query_status(
        &self,
        tournament_id: TournamentId,
        cancel: &CancellationSignal,
    ) -> Result<StatusReport, CallError> {
        let report = self
            .retry
            .run("query_status", self.timeouts.status_poll(), cancel, |_| {
                self.engine.query_status(tournament_id)
            })
            .await?;
        debug!(tournament_id = %tournament_id, status = %report.status, "status read");
        Ok(report)
    }

    /// End the tournament and collect the final per-entrant stats.
    pub async fn end(
        &self,
        tournament_id: TournamentId,
        cancel: &CancellationSignal,
    ) -> Result<Vec<EntrantStats>, CallError> {
        let key = IdempotencyKey::new(tournament_id, Phase::Finalizing);
        let stats = self
            .retry
            .run("end", self.timeouts.end(), cancel, |_| self.engine.end(key))
            .await?;
        info!(tournament_id = %tournament_id, entrants = stats.len(), "final stats collected");
        Ok(stats)
    }
}

fn accepted_or_rejected(accepted: bool, key: IdempotencyKey) -> Result<(), CallError> {
    if accepted {
        Ok(())
    } else {
        Err(CallError::Rejected(format!("engine refused {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::model::TournamentStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Engine double: replays scripted results per operation, records keys.
    #[derive(Default)]
    struct ScriptedEngine {
        schedule: Mutex<Vec<Result<TournamentId, TransportError>>>,
        kickoff: Mutex<Vec<Result<bool, TransportError>>>,
        keys: Mutex<Vec<IdempotencyKey>>,
        schedule_calls: Mutex<u32>,
    }

    #[async_trait]
    impl EngineService for ScriptedEngine {
        async fn schedule(&self, _: &ScheduleRequest) -> Result<TournamentId, TransportError> {
            *self.schedule_calls.lock().unwrap() += 1;
            self.schedule.lock().unwrap().remove(0)
        }

        async fn trigger_about_to_start(&self, key: IdempotencyKey) -> Result<bool, TransportError> {
            self.keys.lock().unwrap().push(key);
            Ok(true)
        }

        async fn kickoff(&self, key: IdempotencyKey) -> Result<bool, TransportError> {
            self.keys.lock().unwrap().push(key);
            self.kickoff.lock().unwrap().remove(0)
        }

        async fn query_status(&self, _: TournamentId) -> Result<StatusReport, TransportError> {
            Ok(StatusReport::with_status(TournamentStatus::Running))
        }

        async fn end(&self, key: IdempotencyKey) -> Result<Vec<EntrantStats>, TransportError> {
            self.keys.lock().unwrap().push(key);
            Ok(Vec::new())
        }
    }

    fn client(engine: ScriptedEngine) -> RemoteControlClient<ScriptedEngine> {
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            multiplier: 2.0,
        };
        RemoteControlClient::new(engine, CallTimeouts::default(), retry)
    }

    fn request() -> ScheduleRequest {
        ScheduleRequest {
            name: "Sunday tournament".into(),
            starting_chips: 5000,
            max_entrants_per_table: 6,
            start_time: chrono::Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_is_retried_at_most_once() {
        let engine = ScriptedEngine::default();
        *engine.schedule.lock().unwrap() = vec![
            Err(TransportError::Unreachable("reset".into())),
            Err(TransportError::TimedOut(Duration::from_secs(1))),
            Ok(TournamentId(1)),
        ];
        let client = client(engine);

        let err = client
            .schedule(&request(), &CancellationSignal::new())
            .await
            .expect_err("second ambiguity surfaces");

        assert!(matches!(err, CallError::Exhausted { attempts: 2, .. }));
        assert_eq!(*client.engine().schedule_calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_recovers_on_single_retry() {
        let engine = ScriptedEngine::default();
        *engine.schedule.lock().unwrap() = vec![
            Err(TransportError::Unreachable("reset".into())),
            Ok(TournamentId(42)),
        ];
        let client = client(engine);

        let id = client
            .schedule(&request(), &CancellationSignal::new())
            .await
            .expect("retry succeeds");
        assert_eq!(id, TournamentId(42));
    }

    #[tokio::test(start_paused = true)]
    async fn kickoff_retries_with_the_same_key() {
        let engine = ScriptedEngine::default();
        *engine.kickoff.lock().unwrap() = vec![
            Err(TransportError::TimedOut(Duration::from_secs(1))),
            Ok(true),
        ];
        let client = client(engine);

        client
            .kickoff(TournamentId(7), &CancellationSignal::new())
            .await
            .expect("kickoff");

        let keys = client.engine().keys.lock().unwrap().clone();
        let expected = IdempotencyKey::new(TournamentId(7), Phase::WaitingToKickoff);
        assert_eq!(keys, vec![expected, expected]);
    }

    #[tokio::test]
    async fn refused_kickoff_is_a_rejection() {
        let engine = ScriptedEngine::default();
        *engine.kickoff.lock().unwrap() = vec![Ok(false)];
        let client = client(engine);

        let err = client
            .kickoff(TournamentId(7), &CancellationSignal::new())
            .await
            .expect_err("refused");
        assert_eq!(err, CallError::Rejected("engine refused tournament-7:kickoff".into()));
    }
}

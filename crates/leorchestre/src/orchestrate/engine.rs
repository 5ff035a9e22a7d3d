use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, Instrument};

use crate::cancel::CancellationSignal;
use crate::config::{KickoffMode, OrchestratorConfig, TournamentConfig, TournamentPlan};
use crate::error::{CallError, ConfigError, FailureCause};
use crate::events::{EventSink, PhaseEvent, TracingSink};
use crate::model::{Phase, Tournament, TournamentId, TournamentStatus};
use crate::monitor::{ProgressMonitor, WatchEvent};
use crate::protocol::{EngineService, RegistrationService, ScheduleRequest};
use crate::ranking::rank_entrants;
use crate::registrar::{EntrantRegistrar, RegistrationError};
use crate::remote::RemoteControlClient;

use super::state::OrchestratorState;
use super::Outcome;

/// Run-wide settings taken from [`OrchestratorConfig`].
#[derive(Debug, Clone)]
struct RunSettings {
    poll_interval: Duration,
    max_monitor_wait: Duration,
    kickoff_mode: KickoffMode,
    confirm_transitions: bool,
}

/// Drives tournaments through their lifecycle.
///
/// Collaborators are shared behind `Arc`, so clones are cheap and may run
/// different tournaments concurrently. All per-tournament state lives inside
/// a single [`run`](Orchestrator::run) call.
pub struct Orchestrator<E, R> {
    client: Arc<RemoteControlClient<E>>,
    registrar: Arc<EntrantRegistrar<R>>,
    settings: RunSettings,
    sink: Arc<dyn EventSink>,
}

impl<E, R> Clone for Orchestrator<E, R> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            registrar: Arc::clone(&self.registrar),
            settings: self.settings.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<E: EngineService, R: RegistrationService> Orchestrator<E, R> {
    /// Build an orchestrator from validated configuration.
    ///
    /// Tournament parameters are not checked here; each [`run`](Self::run)
    /// validates its own.
    pub fn new(config: &OrchestratorConfig, engine: E, registration: R) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = RemoteControlClient::new(engine, config.timeouts.clone(), config.retry.clone());
        let registrar =
            EntrantRegistrar::new(registration, config.timeouts.registration(), config.retry.clone());

        Ok(Self {
            client: Arc::new(client),
            registrar: Arc::new(registrar),
            settings: RunSettings {
                poll_interval: config.poll_interval(),
                max_monitor_wait: config.max_monitor_wait(),
                kickoff_mode: config.kickoff_mode,
                confirm_transitions: config.confirm_transitions,
            },
            sink: Arc::new(TracingSink),
        })
    }

    /// Replace the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Remote-control client.
    pub fn client(&self) -> &RemoteControlClient<E> {
        &self.client
    }

    /// Entrant registrar.
    pub fn registrar(&self) -> &EntrantRegistrar<R> {
        &self.registrar
    }

    /// Drive one tournament end-to-end.
    ///
    /// Never panics on remote misbehaviour: every failure is reported in the
    /// returned [`Outcome`]. Firing `cancel` stops the run at its next
    /// suspension point without issuing further remote calls.
    pub async fn run(&self, config: &TournamentConfig, cancel: &CancellationSignal) -> Outcome {
        let span = info_span!("tournament", name = %config.name);
        async {
            let mut run = RunState::new(self.sink.as_ref(), self.settings.kickoff_mode);
            let result = self.drive(config, &mut run, cancel).await;
            run.finish(result)
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        config: &TournamentConfig,
        run: &mut RunState<'_>,
        cancel: &CancellationSignal,
    ) -> Result<Outcome, Abort> {
        let plan = config.validate(Utc::now()).map_err(|err| {
            Abort::Cause(FailureCause::Configuration {
                message: err.to_string(),
            })
        })?;
        if cancel.is_cancelled() {
            return Err(Abort::Cancelled);
        }

        run.enter(OrchestratorState::Scheduling);
        let mut tournament = self.schedule(&plan, cancel).await?;
        run.tournament_id = Some(tournament.id());

        run.enter(OrchestratorState::Registering);
        self.register(&tournament, plan.entrant_count, cancel).await?;

        if self.settings.kickoff_mode == KickoffMode::Staged {
            run.enter(OrchestratorState::Staging);
            self.client.trigger_about_to_start(tournament.id(), cancel).await?;
            self.confirm(&mut tournament, TournamentStatus::AboutToStart, cancel)
                .await?;

            run.enter(OrchestratorState::WaitingToKickoff);
            run.emit(PhaseEvent::WaitingBeforeKickoff {
                tournament_id: tournament.id(),
                wait: plan.pre_kickoff_wait,
            });
            cancel.sleep(plan.pre_kickoff_wait).await.map_err(|_| Abort::Cancelled)?;
        } else {
            run.enter(OrchestratorState::WaitingToKickoff);
        }

        self.client.kickoff(tournament.id(), cancel).await?;
        self.confirm(&mut tournament, TournamentStatus::Running, cancel)
            .await?;

        run.enter(OrchestratorState::Running);
        self.monitor(&mut tournament, run, cancel).await?;

        run.enter(OrchestratorState::Finalizing);
        let stats = self.client.end(tournament.id(), cancel).await?;
        let ranking = rank_entrants(&stats);
        info!(tournament_id = %tournament.id(), entrants = ranking.len(), "ranking computed");

        run.enter(OrchestratorState::Done);
        Ok(Outcome::Completed {
            tournament_id: tournament.id(),
            ranking,
            channel: tournament.channel(),
            first_table: tournament.table_game_code(1),
        })
    }

    async fn schedule(
        &self,
        plan: &TournamentPlan,
        cancel: &CancellationSignal,
    ) -> Result<Tournament, Abort> {
        let request = ScheduleRequest::from(plan);
        let id = self.client.schedule(&request, cancel).await?;
        Ok(Tournament::scheduled(
            id,
            plan.name.clone(),
            plan.starting_chips,
            plan.max_entrants_per_table,
            plan.start_time,
        ))
    }

    async fn register(
        &self,
        tournament: &Tournament,
        count: u32,
        cancel: &CancellationSignal,
    ) -> Result<(), Abort> {
        let request = tournament.registration_request(count).ok_or_else(|| {
            Abort::Cause(FailureCause::Configuration {
                message: format!("cannot register {count} entrants while {}", tournament.status()),
            })
        })?;

        match self.registrar.register(&request, cancel).await {
            Ok(_) => Ok(()),
            Err(RegistrationError::Call(err)) => Err(err.into()),
            Err(RegistrationError::Partial(result)) => {
                Err(Abort::Cause(FailureCause::PartialRegistration {
                    accepted: result.accepted,
                    requested: result.requested,
                    reason: result.rejected_reason,
                }))
            }
        }
    }

    /// Read the status once and require `expected` or later.
    ///
    /// Without confirmation the local status is advanced on trust.
    async fn confirm(
        &self,
        tournament: &mut Tournament,
        expected: TournamentStatus,
        cancel: &CancellationSignal,
    ) -> Result<(), Abort> {
        let observed = if self.settings.confirm_transitions {
            self.client.query_status(tournament.id(), cancel).await?.status
        } else {
            expected
        };

        if observed == TournamentStatus::Cancelled {
            return Err(Abort::Cause(FailureCause::RemoteCancelled));
        }
        if !observed.has_reached(expected) {
            return Err(Abort::Cause(FailureCause::UnexpectedStatus { expected, observed }));
        }

        advance(tournament, observed);
        Ok(())
    }

    async fn monitor(
        &self,
        tournament: &mut Tournament,
        run: &RunState<'_>,
        cancel: &CancellationSignal,
    ) -> Result<(), Abort> {
        let monitor = ProgressMonitor::new(
            &self.client,
            self.settings.poll_interval,
            self.settings.max_monitor_wait,
        );
        let mut watch = monitor.watch(tournament.id(), cancel);

        while let Some(event) = watch.next().await {
            match event {
                WatchEvent::Snapshot(snapshot) => {
                    run.emit(PhaseEvent::Snapshot(snapshot));
                    match snapshot.status {
                        TournamentStatus::Ended => {
                            advance(tournament, TournamentStatus::Ended);
                            return Ok(());
                        }
                        TournamentStatus::Cancelled => {
                            return Err(Abort::Cause(FailureCause::RemoteCancelled));
                        }
                        status => advance(tournament, status),
                    }
                }
                WatchEvent::TimedOut {
                    waited,
                    last_status,
                } => {
                    return Err(Abort::Cause(FailureCause::MonitorTimeout {
                        waited,
                        last_status,
                    }));
                }
                WatchEvent::Failed(err) => return Err(err.into()),
            }
        }

        Err(Abort::Cause(FailureCause::MonitorTimeout {
            waited: self.settings.max_monitor_wait,
            last_status: watch.last_status(),
        }))
    }
}

fn advance(tournament: &mut Tournament, status: TournamentStatus) {
    if let Err(current) = tournament.advance(status) {
        debug!(tournament_id = %tournament.id(), %current, observed = %status, "status not advanced");
    }
}

/// Why `drive` stopped early.
#[derive(Debug)]
enum Abort {
    Cancelled,
    Call(CallError),
    Cause(FailureCause),
}

impl From<CallError> for Abort {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Cancelled => Abort::Cancelled,
            other => Abort::Call(other),
        }
    }
}

/// Classify a call failure in `phase`.
fn call_failure(err: CallError, phase: Phase) -> Option<FailureCause> {
    let cause = match err {
        CallError::Cancelled => return None,
        CallError::Rejected(reason) => FailureCause::RemoteRejection { reason },
        CallError::Malformed(detail) => FailureCause::MalformedResponse { detail },
        CallError::Exhausted {
            attempts,
            last_error,
        } if phase == Phase::Scheduling => FailureCause::ScheduleAmbiguous {
            attempts,
            last_error,
        },
        CallError::Exhausted {
            attempts,
            last_error,
        } => FailureCause::TransportExhausted {
            attempts,
            last_error,
        },
    };
    Some(cause)
}

/// Per-run bookkeeping: current state, tournament id and the sink.
struct RunState<'a> {
    state: OrchestratorState,
    tournament_id: Option<TournamentId>,
    mode: KickoffMode,
    sink: &'a dyn EventSink,
}

impl<'a> RunState<'a> {
    fn new(sink: &'a dyn EventSink, mode: KickoffMode) -> Self {
        Self {
            state: OrchestratorState::Validating,
            tournament_id: None,
            mode,
            sink,
        }
    }

    fn phase(&self) -> Phase {
        self.state.phase().unwrap_or(Phase::Finalizing)
    }

    fn emit(&self, event: PhaseEvent) {
        self.sink.emit(&event);
    }

    fn enter(&mut self, next: OrchestratorState) {
        debug_assert!(
            self.state.can_transition_to(next, self.mode),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        let from = std::mem::replace(&mut self.state, next);
        self.emit(PhaseEvent::Transition {
            tournament_id: self.tournament_id,
            from,
            to: next,
        });
    }

    fn finish(&mut self, result: Result<Outcome, Abort>) -> Outcome {
        let phase = self.phase();
        let cause = match result {
            Ok(outcome) => return outcome,
            Err(Abort::Cancelled) => None,
            Err(Abort::Call(err)) => call_failure(err, phase),
            Err(Abort::Cause(cause)) => Some(cause),
        };

        match cause {
            Some(cause) => {
                error!(phase = %phase, tournament_id = ?self.tournament_id.map(|id| id.0), %cause, "phase failed");
                self.enter(OrchestratorState::Failed { phase });
                Outcome::Failed {
                    phase,
                    tournament_id: self.tournament_id,
                    cause,
                }
            }
            None => {
                info!(phase = %phase, "orchestration cancelled");
                self.enter(OrchestratorState::Cancelled { phase });
                Outcome::Cancelled {
                    phase,
                    tournament_id: self.tournament_id,
                }
            }
        }
    }
}

//! leorchestre - Tournament Lifecycle Orchestration
//!
//! *L'Orchestre* (The Orchestra) - drives one tournament on a remote game engine
//! through scheduling, registration, staging, kickoff, monitoring and ranking.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Cancellation signal shared by every suspension point of one orchestration.
pub mod cancel;

/// Orchestrator and tournament configuration (TOML + environment).
pub mod config;

/// Error taxonomy for configuration, transport and phase failures.
pub mod error;

/// Phase-transition events and observability sinks.
pub mod events;

/// Tournament data model.
pub mod model;

/// Status polling until the tournament ends or the wait budget runs out.
pub mod monitor;

/// Phase state machine and the orchestrator engine.
pub mod orchestrate;

/// Collaborator interfaces for the remote engine and registration service.
pub mod protocol;

/// Final ranking from per-entrant statistics.
pub mod ranking;

/// Entrant registration wrapper.
pub mod registrar;

/// Typed remote-control client over the engine protocol.
pub mod remote;

/// Bounded exponential backoff.
pub mod retry;

/// In-process scripted engine for dry runs.
pub mod sim;

pub use cancel::{CancellationSignal, Cancelled};
pub use config::{CallTimeouts, KickoffMode, OrchestratorConfig, TournamentConfig, TournamentPlan};
pub use error::{CallError, ConfigError, FailureCause, TransportError};
pub use events::{BroadcastSink, EventSink, MemorySink, PhaseEvent, TracingSink};
pub use model::{
    EntrantStats, IdempotencyKey, Phase, RankedEntrant, RegistrationRequest, Tournament,
    TournamentId, TournamentSnapshot, TournamentStatus,
};
pub use monitor::{ProgressMonitor, StatusWatch, WatchEvent};
pub use orchestrate::{Orchestrator, OrchestratorState, Outcome};
pub use protocol::{
    EngineService, RegistrationResponse, RegistrationService, ScheduleRequest, StatusReport,
};
pub use ranking::rank_entrants;
pub use registrar::{EntrantRegistrar, RegistrationError, RegistrationResult};
pub use remote::RemoteControlClient;
pub use retry::RetryPolicy;
pub use sim::SimulatedEngine;

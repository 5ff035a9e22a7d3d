//! Phase-transition events
//!
//! The orchestrator reports progress through an injected [`EventSink`] instead
//! of printing. Sinks must not block: they are called inline from the run.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

use crate::model::{TournamentId, TournamentSnapshot};
use crate::orchestrate::OrchestratorState;

/// Default capacity of a [`BroadcastSink`] channel.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Observable step of one orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseEvent {
    /// The state machine moved.
    Transition {
        /// Tournament id, once scheduled.
        tournament_id: Option<TournamentId>,
        /// Previous state
        from: OrchestratorState,
        /// New state
        to: OrchestratorState,
    },

    /// Staged and waiting out the pre-kickoff delay.
    WaitingBeforeKickoff {
        /// Tournament id
        tournament_id: TournamentId,
        /// Delay before kickoff
        wait: Duration,
    },

    /// A status poll while running.
    Snapshot(TournamentSnapshot),
}

impl PhaseEvent {
    /// Get event type string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Transition { .. } => "transition",
            Self::WaitingBeforeKickoff { .. } => "waiting_before_kickoff",
            Self::Snapshot(_) => "snapshot",
        }
    }
}

/// Receiver of [`PhaseEvent`]s.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: &PhaseEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &PhaseEvent) {
        (**self).emit(event)
    }
}

/// Logs every event through `tracing`. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &PhaseEvent) {
        match event {
            PhaseEvent::Transition {
                tournament_id,
                from,
                to,
            } => {
                info!(tournament_id = ?tournament_id.map(|id| id.0), %from, %to, "phase transition");
            }
            PhaseEvent::WaitingBeforeKickoff {
                tournament_id,
                wait,
            } => {
                info!(%tournament_id, wait_ms = wait.as_millis() as u64, "waiting before kickoff");
            }
            PhaseEvent::Snapshot(snapshot) => {
                info!(
                    tournament_id = %snapshot.tournament_id,
                    status = %snapshot.status,
                    elapsed_ms = snapshot.elapsed.as_millis() as u64,
                    "progress"
                );
            }
        }
    }
}

/// Fans events out to any number of subscribers.
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    broadcaster: broadcast::Sender<PhaseEvent>,
}

impl BroadcastSink {
    /// Create a sink whose channel holds `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(capacity.max(1));
        Self { broadcaster }
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseEvent> {
        self.broadcaster.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &PhaseEvent) {
        let _ = self.broadcaster.send(event.clone());
    }
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PhaseEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far.
    pub fn events(&self) -> Vec<PhaseEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// States entered, in order.
    pub fn states(&self) -> Vec<OrchestratorState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PhaseEvent::Transition { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &PhaseEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}

// Progress monitoring
//
// Polls the engine at a fixed interval and yields snapshots until the
// tournament reaches a terminal status or the maximum wait elapses.

use futures::stream::{self, Stream};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::cancel::CancellationSignal;
use crate::error::CallError;
use crate::model::{TournamentId, TournamentSnapshot, TournamentStatus};
use crate::protocol::EngineService;
use crate::remote::RemoteControlClient;

/// One item of a status watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A successful poll. The last snapshot of a watch has a terminal status.
    Snapshot(TournamentSnapshot),
    /// Maximum wait elapsed before a terminal status was seen. Always last.
    TimedOut {
        /// Time spent watching.
        waited: Duration,
        /// Last status observed, if any.
        last_status: Option<TournamentStatus>,
    },
    /// A poll failed after retries, or the watch was cancelled. Always last.
    Failed(CallError),
}

impl WatchEvent {
    /// Whether the watch produces nothing after this event.
    pub fn is_final(&self) -> bool {
        match self {
            WatchEvent::Snapshot(snapshot) => snapshot.status.is_terminal(),
            WatchEvent::TimedOut { .. } | WatchEvent::Failed(_) => true,
        }
    }
}

/// Polling settings for a [`RemoteControlClient`].
#[derive(Debug)]
pub struct ProgressMonitor<'a, E> {
    client: &'a RemoteControlClient<E>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl<'a, E: EngineService> ProgressMonitor<'a, E> {
    /// Create a monitor polling every `poll_interval` for at most `max_wait`.
    pub fn new(client: &'a RemoteControlClient<E>, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            client,
            poll_interval,
            max_wait,
        }
    }

    /// Start a fresh watch. Each call begins its own clock.
    pub fn watch(&self, tournament_id: TournamentId, cancel: &CancellationSignal) -> StatusWatch<'a, E> {
        let started = Instant::now();
        StatusWatch {
            client: self.client,
            tournament_id,
            cancel: cancel.clone(),
            poll_interval: self.poll_interval,
            started,
            deadline: started + self.max_wait,
            last_status: None,
            polls: 0,
            finished: false,
        }
    }
}

/// Lazy, finite sequence of [`WatchEvent`]s for one tournament.
#[derive(Debug)]
pub struct StatusWatch<'a, E> {
    client: &'a RemoteControlClient<E>,
    tournament_id: TournamentId,
    cancel: CancellationSignal,
    poll_interval: Duration,
    started: Instant,
    deadline: Instant,
    last_status: Option<TournamentStatus>,
    polls: u32,
    finished: bool,
}

impl<'a, E: EngineService> StatusWatch<'a, E> {
    /// Next event, or `None` once the watch has finished.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        if self.finished {
            return None;
        }

        let event = self.poll_once().await;
        if event.is_final() {
            self.finished = true;
        }
        Some(event)
    }

    /// Last status observed so far.
    pub fn last_status(&self) -> Option<TournamentStatus> {
        self.last_status
    }

    /// Number of polls that returned a status.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Convert into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = WatchEvent> + 'a {
        stream::unfold(self, |mut watch| async move {
            let event = watch.next().await?;
            Some((event, watch))
        })
    }

    async fn poll_once(&mut self) -> WatchEvent {
        if self.polls > 0 {
            let now = Instant::now();
            let remaining = self.deadline.saturating_duration_since(now);
            if self
                .cancel
                .sleep(self.poll_interval.min(remaining))
                .await
                .is_err()
            {
                return WatchEvent::Failed(CallError::Cancelled);
            }
        }

        if Instant::now() >= self.deadline {
            return self.timed_out();
        }

        let poll = self.client.query_status(self.tournament_id, &self.cancel);
        let report = tokio::select! {
            report = poll => report,
            _ = tokio::time::sleep_until(self.deadline) => return self.timed_out(),
        };

        match report {
            Ok(report) => {
                self.polls += 1;
                self.last_status = Some(report.status);
                let snapshot = TournamentSnapshot {
                    tournament_id: self.tournament_id,
                    status: report.status,
                    elapsed: self.started.elapsed(),
                };
                debug!(
                    tournament_id = %self.tournament_id,
                    status = %snapshot.status,
                    elapsed_ms = snapshot.elapsed.as_millis() as u64,
                    active_entrants = report.active_entrants,
                    "status snapshot"
                );
                WatchEvent::Snapshot(snapshot)
            }
            Err(err) => WatchEvent::Failed(err),
        }
    }

    fn timed_out(&self) -> WatchEvent {
        WatchEvent::TimedOut {
            waited: self.started.elapsed(),
            last_status: self.last_status,
        }
    }
}

// Collaborator interfaces
//
// The remote engine and the registration service are reached only through
// these two traits. Implementations own the wire transport and authentication.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::TournamentPlan;
use crate::error::TransportError;
use crate::model::{
    EntrantStats, IdempotencyKey, RegistrationRequest, TournamentId, TournamentStatus,
};

/// Body of the schedule operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    /// Display name.
    pub name: String,
    /// Chips each entrant starts with.
    pub starting_chips: u64,
    /// Seats per table.
    pub max_entrants_per_table: u32,
    /// Scheduled start.
    pub start_time: DateTime<Utc>,
}

impl From<&TournamentPlan> for ScheduleRequest {
    fn from(plan: &TournamentPlan) -> Self {
        Self {
            name: plan.name.clone(),
            starting_chips: plan.starting_chips,
            max_entrants_per_table: plan.max_entrants_per_table,
            start_time: plan.start_time,
        }
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Current remote status.
    pub status: TournamentStatus,
    /// Entrants still holding chips, when the engine reports it.
    #[serde(default)]
    pub active_entrants: Option<u32>,
    /// Current blind level, when the engine reports it.
    #[serde(default)]
    pub current_level: Option<u32>,
}

impl StatusReport {
    /// Report carrying only a status.
    pub fn with_status(status: TournamentStatus) -> Self {
        Self {
            status,
            active_entrants: None,
            current_level: None,
        }
    }
}

/// Answer of the registration service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    /// Entrants enrolled.
    pub accepted_count: u32,
    /// Why some entrants were refused.
    #[serde(default)]
    pub rejected_reason: Option<String>,
}

/// Remote game engine control surface.
///
/// Every call except `schedule` carries an [`IdempotencyKey`]; implementations
/// must guarantee a repeated key never applies its phase twice.
#[async_trait]
pub trait EngineService: Send + Sync {
    /// Create a tournament and return its id.
    async fn schedule(&self, request: &ScheduleRequest) -> Result<TournamentId, TransportError>;

    /// Move the tournament to `ABOUT_TO_START`.
    async fn trigger_about_to_start(&self, key: IdempotencyKey) -> Result<bool, TransportError>;

    /// Start play.
    async fn kickoff(&self, key: IdempotencyKey) -> Result<bool, TransportError>;

    /// Read the current status.
    async fn query_status(&self, tournament_id: TournamentId)
        -> Result<StatusReport, TransportError>;

    /// End the tournament if still running and return the final stats.
    async fn end(&self, key: IdempotencyKey) -> Result<Vec<EntrantStats>, TransportError>;
}

/// Remote entrant pool.
#[async_trait]
pub trait RegistrationService: Send + Sync {
    /// Enrol `request.requested_count` entrants. The request doubles as its own
    /// idempotency key.
    async fn register_entrants(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, TransportError>;
}

#[async_trait]
impl<T: EngineService + ?Sized> EngineService for Arc<T> {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<TournamentId, TransportError> {
        (**self).schedule(request).await
    }

    async fn trigger_about_to_start(&self, key: IdempotencyKey) -> Result<bool, TransportError> {
        (**self).trigger_about_to_start(key).await
    }

    async fn kickoff(&self, key: IdempotencyKey) -> Result<bool, TransportError> {
        (**self).kickoff(key).await
    }

    async fn query_status(
        &self,
        tournament_id: TournamentId,
    ) -> Result<StatusReport, TransportError> {
        (**self).query_status(tournament_id).await
    }

    async fn end(&self, key: IdempotencyKey) -> Result<Vec<EntrantStats>, TransportError> {
        (**self).end(key).await
    }
}

#[async_trait]
impl<T: RegistrationService + ?Sized> RegistrationService for Arc<T> {
    async fn register_entrants(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationResponse, TransportError> {
        (**self).register_entrants(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_request_uses_engine_field_names() {
        let request = ScheduleRequest {
            name: "Sunday tournament".to_string(),
            starting_chips: 5000,
            max_entrants_per_table: 6,
            start_time: "2099-06-01T00:00:00Z".parse().expect("timestamp"),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["startingChips"], 5000);
        assert_eq!(json["maxEntrantsPerTable"], 6);
        assert_eq!(json["startTime"], "2099-06-01T00:00:00Z");
    }

    #[test]
    fn status_report_tolerates_missing_derived_fields() {
        let report: StatusReport =
            serde_json::from_str(r#"{"status":"RUNNING"}"#).expect("deserialize");
        assert_eq!(report, StatusReport::with_status(TournamentStatus::Running));
    }

    #[test]
    fn registration_response_reason_is_optional() {
        let response: RegistrationResponse =
            serde_json::from_str(r#"{"acceptedCount":28,"rejectedReason":"pool exhausted"}"#)
                .expect("deserialize");
        assert_eq!(response.accepted_count, 28);
        assert_eq!(response.rejected_reason.as_deref(), Some("pool exhausted"));
    }
}

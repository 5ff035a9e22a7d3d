// Error Handling
//
// *La Gestion des Erreurs* (The Error Management) - configuration, transport and phase failures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::model::TournamentStatus;

/// Invalid configuration, detected before any remote call is issued.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// Config file could not be read.
    #[error("failed to read config file {path:?}")]
    Io {
        /// File path.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected schema.
    #[error("failed to parse config file {path:?}")]
    Parse {
        /// File path.
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Create a validation error for `field`.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure reported by a remote collaborator or the transport underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    /// Connection could not be established or dropped before a response.
    #[error("remote endpoint unreachable: {0}")]
    Unreachable(String),

    /// No response arrived within the per-call timeout.
    #[error("no response within {0:?}")]
    TimedOut(Duration),

    /// The remote side answered and refused the request.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    /// The remote side answered with something that could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Whether the remote outcome is unknown, making the call safe to retry by key.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, TransportError::Unreachable(_) | TransportError::TimedOut(_))
    }
}

/// Outcome of one remote call after retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Cancellation signal fired while the call or its backoff was pending.
    #[error("cancelled")]
    Cancelled,

    /// Deterministic refusal. Never retried.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Response could not be decoded. Never retried.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Every attempt ended without a response.
    #[error("transport exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: TransportError,
    },
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rejected(reason) => CallError::Rejected(reason),
            TransportError::Malformed(detail) => CallError::Malformed(detail),
            ambiguous => CallError::Exhausted {
                attempts: 1,
                last_error: ambiguous,
            },
        }
    }
}

/// Why an orchestration failed. Carried inside `Outcome::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    /// Invalid input, zero side effects.
    #[error("configuration error: {message}")]
    Configuration {
        /// Validation message.
        message: String,
    },

    /// The engine or registration service refused the call.
    #[error("remote rejection: {reason}")]
    RemoteRejection {
        /// Remote reason.
        reason: String,
    },

    /// No response after the whole retry budget. Remote state is unknown.
    #[error("transport exhausted after {attempts} attempts: {last_error}")]
    TransportExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: TransportError,
    },

    /// Scheduling outcome unknown after the single automatic retry.
    ///
    /// A tournament may exist remotely without the orchestrator knowing its id.
    #[error("schedule outcome unknown after {attempts} attempts: {last_error}")]
    ScheduleAmbiguous {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: TransportError,
    },

    /// Registration accepted fewer entrants than requested.
    #[error("partial registration: accepted {accepted} of {requested}")]
    PartialRegistration {
        /// Entrants accepted.
        accepted: u32,
        /// Entrants requested.
        requested: u32,
        /// Remote reason, if any.
        reason: Option<String>,
    },

    /// `ENDED` was never observed within the maximum wait.
    #[error("monitor timed out after {waited:?} (last status: {last_status:?})")]
    MonitorTimeout {
        /// Time spent watching.
        waited: Duration,
        /// Last status seen, if any poll succeeded.
        last_status: Option<TournamentStatus>,
    },

    /// The engine cancelled the tournament on its side.
    #[error("tournament cancelled by the engine")]
    RemoteCancelled,

    /// A confirmation read returned a status behind the one expected.
    #[error("expected status {expected}, observed {observed}")]
    UnexpectedStatus {
        /// Status required to proceed.
        expected: TournamentStatus,
        /// Status reported.
        observed: TournamentStatus,
    },

    /// The remote side answered with an undecodable payload.
    #[error("malformed response: {detail}")]
    MalformedResponse {
        /// Decoder detail.
        detail: String,
    },
}

impl FailureCause {
    /// Whether an operator should inspect remote state before retrying by hand.
    pub fn needs_manual_check(&self) -> bool {
        matches!(
            self,
            FailureCause::TransportExhausted { .. } | FailureCause::ScheduleAmbiguous { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_no_response_errors_are_ambiguous() {
        assert!(TransportError::Unreachable("refused".into()).is_ambiguous());
        assert!(TransportError::TimedOut(Duration::from_secs(1)).is_ambiguous());
        assert!(!TransportError::Rejected("bad state".into()).is_ambiguous());
        assert!(!TransportError::Malformed("eof".into()).is_ambiguous());
    }

    #[test]
    fn transport_error_maps_to_call_error() {
        assert_eq!(
            CallError::from(TransportError::Rejected("no".into())),
            CallError::Rejected("no".into())
        );
        assert!(matches!(
            CallError::from(TransportError::Unreachable("down".into())),
            CallError::Exhausted { attempts: 1, .. }
        ));
    }

    #[test]
    fn failure_cause_serializes_with_tag() {
        let cause = FailureCause::PartialRegistration {
            accepted: 20,
            requested: 30,
            reason: None,
        };
        let json = serde_json::to_value(&cause).expect("serialize");
        assert_eq!(json["cause"], "partial_registration");
        assert_eq!(json["accepted"], 20);
        assert!(cause.to_string().contains("20 of 30"));
    }

    #[test]
    fn manual_check_flagged_for_ambiguous_failures() {
        let exhausted = FailureCause::TransportExhausted {
            attempts: 3,
            last_error: TransportError::TimedOut(Duration::from_secs(5)),
        };
        assert!(exhausted.needs_manual_check());
        assert!(!FailureCause::RemoteCancelled.needs_manual_check());
    }

    #[test]
    fn config_error_names_field() {
        let err = ConfigError::invalid("entrant_count", "must be positive, got 0");
        assert_eq!(err.to_string(), "invalid entrant_count: must be positive, got 0");
    }
}

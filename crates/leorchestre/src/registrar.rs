//! Entrant registration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::cancel::CancellationSignal;
use crate::error::CallError;
use crate::model::RegistrationRequest;
use crate::protocol::RegistrationService;
use crate::retry::RetryPolicy;

/// Registration outcome reported by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    /// Entrants requested.
    pub requested: u32,
    /// Entrants accepted.
    pub accepted: u32,
    /// Why the remainder was refused.
    pub rejected_reason: Option<String>,
}

impl RegistrationResult {
    /// Every requested entrant was accepted.
    pub fn is_complete(&self) -> bool {
        self.accepted >= self.requested
    }
}

/// Registration did not enrol the full requested count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The call itself failed.
    #[error(transparent)]
    Call(#[from] CallError),

    /// The pool answered but accepted fewer entrants than requested.
    #[error("accepted {} of {} entrants", .0.accepted, .0.requested)]
    Partial(RegistrationResult),
}

/// Wraps a [`RegistrationService`] with its own timeout and the retry policy.
#[derive(Debug)]
pub struct EntrantRegistrar<R> {
    service: R,
    timeout: Duration,
    retry: RetryPolicy,
}

impl<R: RegistrationService> EntrantRegistrar<R> {
    /// Create a registrar. `timeout` is independent from the engine call timeouts.
    pub fn new(service: R, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            service,
            timeout,
            retry,
        }
    }

    /// Underlying service.
    pub fn service(&self) -> &R {
        &self.service
    }

    /// Enrol the requested entrants. Anything short of the full count is an error.
    pub async fn register(
        &self,
        request: &RegistrationRequest,
        cancel: &CancellationSignal,
    ) -> Result<RegistrationResult, RegistrationError> {
        let response = self
            .retry
            .run("register_entrants", self.timeout, cancel, |_| {
                self.service.register_entrants(request)
            })
            .await?;

        let result = RegistrationResult {
            requested: request.requested_count,
            accepted: response.accepted_count,
            rejected_reason: response.rejected_reason,
        };

        if !result.is_complete() {
            warn!(
                tournament_id = %request.tournament_id,
                accepted = result.accepted,
                requested = result.requested,
                reason = result.rejected_reason.as_deref().unwrap_or("none"),
                "partial registration"
            );
            return Err(RegistrationError::Partial(result));
        }

        info!(
            tournament_id = %request.tournament_id,
            accepted = result.accepted,
            "entrants registered"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::model::TournamentId;
    use crate::protocol::RegistrationResponse;
    use async_trait::async_trait;

    struct Pool {
        available: u32,
    }

    #[async_trait]
    impl RegistrationService for Pool {
        async fn register_entrants(
            &self,
            request: &RegistrationRequest,
        ) -> Result<RegistrationResponse, TransportError> {
            let accepted = request.requested_count.min(self.available);
            Ok(RegistrationResponse {
                accepted_count: accepted,
                rejected_reason: (accepted < request.requested_count)
                    .then(|| "pool exhausted".to_string()),
            })
        }
    }

    struct Down;

    #[async_trait]
    impl RegistrationService for Down {
        async fn register_entrants(
            &self,
            _: &RegistrationRequest,
        ) -> Result<RegistrationResponse, TransportError> {
            Err(TransportError::Rejected("503 service unavailable".into()))
        }
    }

    fn request(count: u32) -> RegistrationRequest {
        RegistrationRequest {
            tournament_id: TournamentId(42),
            requested_count: count,
        }
    }

    #[tokio::test]
    async fn full_registration_succeeds() {
        let registrar =
            EntrantRegistrar::new(Pool { available: 50 }, Duration::from_secs(60), RetryPolicy::default());
        let result = registrar
            .register(&request(30), &CancellationSignal::new())
            .await
            .expect("full fill");
        assert_eq!(result.accepted, 30);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn partial_registration_is_an_error() {
        let registrar =
            EntrantRegistrar::new(Pool { available: 20 }, Duration::from_secs(60), RetryPolicy::default());
        let err = registrar
            .register(&request(30), &CancellationSignal::new())
            .await
            .expect_err("partial fill");

        match err {
            RegistrationError::Partial(result) => {
                assert_eq!(result.accepted, 20);
                assert_eq!(result.requested, 30);
                assert_eq!(result.rejected_reason.as_deref(), Some("pool exhausted"));
            }
            other => panic!("expected partial registration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_response_is_an_error() {
        let registrar = EntrantRegistrar::new(Down, Duration::from_secs(60), RetryPolicy::default());
        let err = registrar
            .register(&request(30), &CancellationSignal::new())
            .await
            .expect_err("rejected");
        assert_eq!(
            err,
            RegistrationError::Call(CallError::Rejected("503 service unavailable".into()))
        );
    }
}

//! Origin dispatch with bounded retry.
//!
//! `OriginDispatcher::dispatch` turns a logical route name into a concrete
//! backend call: select a server, send the request through the transport port
//! under a per-attempt deadline, and record an [`Attempt`] for every try.
//! Any response from the backend ends the dispatch, including non-2xx
//! statuses; only connection-level failures and deadline expiry are
//! retry-eligible, and a request is only retried when it is replay-safe
//! (idempotent method, fully buffered body). Cancellation of the inbound
//! connection aborts the in-flight attempt and never retries.
use std::{sync::Arc, time::Instant};

use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        attempt::Attempt,
        error::GatewayError,
        message::{Request, Response},
        origin::OriginManager,
    },
    metrics,
    ports::transport::OriginTransport,
};

/// Executes backend calls for the endpoint stage.
pub struct OriginDispatcher {
    origins: Arc<OriginManager>,
    transport: Arc<dyn OriginTransport>,
}

impl OriginDispatcher {
    pub fn new(origins: Arc<OriginManager>, transport: Arc<dyn OriginTransport>) -> Self {
        Self { origins, transport }
    }

    pub fn origins(&self) -> &Arc<OriginManager> {
        &self.origins
    }

    /// Dispatch `request` to the origin behind `route`.
    ///
    /// Suspends at connection/request I/O; never blocks the calling thread.
    /// All attempt records are appended to the request's session context in
    /// arrival order before the result is surfaced.
    pub async fn dispatch(
        &self,
        request: Request,
        route: &str,
        cancel: &CancellationToken,
    ) -> Result<Response, GatewayError> {
        let ctx = request.context().clone();
        let origin = self
            .origins
            .get(route)
            .ok_or_else(|| GatewayError::NoOriginAvailable {
                route: route.to_string(),
            })?;
        if origin.servers().is_empty() {
            return Err(GatewayError::NoOriginAvailable {
                route: route.to_string(),
            });
        }
        ctx.set_origin(origin.name());

        let policy = origin.policy().clone();
        let replay_safe = request.is_replay_safe();
        let max_attempts = if replay_safe {
            policy.max_attempts.max(1)
        } else {
            1
        };
        let dispatch_start = Instant::now();
        let mut carried = Some(request);

        for index in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }

            let start_offset = dispatch_start.elapsed();
            let resolve_start = Instant::now();
            let server = match origin.select() {
                Some(server) => server,
                None => {
                    return Err(GatewayError::NoOriginAvailable {
                        route: route.to_string(),
                    });
                }
            };
            let mut attempt = Attempt::new(index, route, server.to_string());
            attempt.record_start_offset(start_offset);
            attempt.record_resolve(resolve_start.elapsed());

            // Keep the original for further attempts while any remain; the
            // last attempt moves it.
            let outgoing = if index < max_attempts {
                carried.as_ref().map(|r| r.replicate())
            } else {
                carried.take()
            };
            let Some(outgoing) = outgoing else {
                break;
            };

            let attempt_start = Instant::now();
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    attempt.set_error(&GatewayError::Cancelled);
                    attempt.record_total(attempt_start.elapsed());
                    ctx.push_attempt(attempt);
                    metrics::record_dispatch_attempt(route, "CANCELLED");
                    tracing::info!(route, attempt = index, "dispatch cancelled by client");
                    return Err(GatewayError::Cancelled);
                }
                result = tokio::time::timeout(
                    policy.attempt_timeout,
                    self.transport.send(&server, outgoing),
                ) => result,
            };

            let err = match result {
                Ok(Ok(response)) => {
                    let status = response.status.as_u16();
                    attempt.set_status(status);
                    attempt.record_total(attempt_start.elapsed());
                    ctx.push_attempt(attempt);
                    metrics::record_dispatch_attempt(route, "OK");
                    tracing::debug!(route, %server, attempt = index, status, "origin attempt succeeded");
                    return Ok(response);
                }
                Ok(Err(transport_err)) => transport_err.into_gateway_error(),
                Err(_) => GatewayError::OriginTimeout {
                    elapsed: policy.attempt_timeout,
                },
            };

            attempt.set_error(&err);
            attempt.record_total(attempt_start.elapsed());
            ctx.push_attempt(attempt);
            metrics::record_dispatch_attempt(route, err.error_class());
            tracing::warn!(
                route,
                %server,
                attempt = index,
                error = err.error_class(),
                cause = %err.cause_detail(),
                "origin attempt failed"
            );

            if err.is_retry_eligible() && index < max_attempts {
                continue;
            }
            if err.is_retry_eligible() && index > 1 {
                return Err(GatewayError::RetriesExhausted {
                    attempts: index,
                    last: Box::new(err),
                });
            }
            return Err(err);
        }

        Err(GatewayError::internal(
            "dispatch loop ended without an outcome",
        ))
    }
}

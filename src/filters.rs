//! Built-in filters: route binding, request id stamping, the proxy endpoint,
//! attempt reporting, and the default error responder.
//!
//! These cover the standard edge-proxy path; applications register their own
//! filters alongside them for auth, rewriting, and anything site-specific.
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::core::{
    chain::synthesize_error_response,
    dispatch::OriginDispatcher,
    error::GatewayError,
    filter::{
        EndpointFilter, ErrorFilter, ExecMode, FilterDescriptor, FilterKind, InboundFilter,
        Outcome, OutboundFilter,
    },
    message::{Body, Request, Response},
};

/// Context key under which the client-disconnect token is stored. The
/// connection layer inserts it before the pipeline runs; the proxy endpoint
/// reads it to abort in-flight origin attempts.
pub const CANCEL_TOKEN_KEY: &str = "strato.cancel_token";

/// Header carrying the request id to origins and back to clients.
pub const REQUEST_ID_HEADER: &str = "X-Strato-Request-Id";

/// Header reporting how many origin attempts served the response.
pub const ATTEMPTS_HEADER: &str = "X-Strato-Attempts";

/// Binds the request to a logical route by longest matching path prefix and
/// records it in the session context. An unmatched path short-circuits with
/// 404 before any origin work happens.
pub struct RouteBindingFilter {
    descriptor: FilterDescriptor,
    // Sorted by prefix length, longest first
    bindings: Vec<(String, String)>,
}

impl RouteBindingFilter {
    pub fn new(bindings: Vec<(String, String)>) -> Self {
        let mut bindings = bindings;
        bindings.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self {
            descriptor: FilterDescriptor::new("strato", "route-binding", FilterKind::Inbound, 0),
            bindings,
        }
    }

    fn resolve(&self, path: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, route)| route.as_str())
    }
}

#[async_trait]
impl InboundFilter for RouteBindingFilter {
    fn descriptor(&self) -> &FilterDescriptor {
        &self.descriptor
    }

    async fn apply(&self, request: Request) -> Outcome<Request> {
        let ctx = request.context().clone();
        match self.resolve(request.path()) {
            Some(route) => {
                tracing::debug!(path = request.path(), route, "bound request to route");
                ctx.set_route(route);
                Outcome::Continue(request)
            }
            None => {
                tracing::debug!(path = request.path(), "no route binding matched");
                let body = serde_json::json!({
                    "error": "NO_ROUTE",
                    "message": format!("no route matches path '{}'", request.path()),
                    "request_id": ctx.request_id(),
                });
                let mut response = Response::new(StatusCode::NOT_FOUND, ctx);
                response.headers.set("Content-Type", "application/json");
                response.set_body(Body::from(body.to_string().into_bytes()));
                Outcome::ShortCircuit(response)
            }
        }
    }
}

/// Stamps the session's request id onto the request, preserving an id already
/// supplied by an upstream hop.
pub struct RequestIdFilter {
    descriptor: FilterDescriptor,
}

impl Default for RequestIdFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdFilter {
    pub fn new() -> Self {
        Self {
            descriptor: FilterDescriptor::new("strato", "request-id", FilterKind::Inbound, 10),
        }
    }
}

#[async_trait]
impl InboundFilter for RequestIdFilter {
    fn descriptor(&self) -> &FilterDescriptor {
        &self.descriptor
    }

    async fn apply(&self, mut request: Request) -> Outcome<Request> {
        let request_id = request.context().request_id();
        request.headers.set_if_absent(REQUEST_ID_HEADER, &request_id);
        Outcome::Continue(request)
    }
}

/// The standard endpoint: proxies the request to the origin bound earlier in
/// the chain. Claims any request that carries a route.
pub struct ProxyEndpoint {
    descriptor: FilterDescriptor,
    dispatcher: Arc<OriginDispatcher>,
}

impl ProxyEndpoint {
    pub fn new(dispatcher: Arc<OriginDispatcher>) -> Self {
        Self {
            descriptor: FilterDescriptor::new("strato", "proxy", FilterKind::Endpoint, 0)
                .with_exec_mode(ExecMode::Async),
            dispatcher,
        }
    }
}

#[async_trait]
impl EndpointFilter for ProxyEndpoint {
    fn descriptor(&self) -> &FilterDescriptor {
        &self.descriptor
    }

    fn should_filter(&self, request: &Request) -> bool {
        request.context().route().is_some()
    }

    async fn dispatch(&self, request: Request) -> Result<Response, GatewayError> {
        let ctx = request.context().clone();
        let route = ctx
            .route()
            .ok_or_else(|| GatewayError::internal("proxy endpoint claimed a routeless request"))?;
        let cancel = ctx
            .get::<CancellationToken>(CANCEL_TOKEN_KEY)
            .map(|token| token.as_ref().clone())
            .unwrap_or_default();
        self.dispatcher.dispatch(request, &route, &cancel).await
    }
}

/// Reports the origin attempt count on the response and, for debug-flagged
/// requests, logs the full attempt records.
pub struct AttemptReportFilter {
    descriptor: FilterDescriptor,
}

impl Default for AttemptReportFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl AttemptReportFilter {
    pub fn new() -> Self {
        Self {
            descriptor: FilterDescriptor::new("strato", "attempt-report", FilterKind::Outbound, 10),
        }
    }
}

#[async_trait]
impl OutboundFilter for AttemptReportFilter {
    fn descriptor(&self) -> &FilterDescriptor {
        &self.descriptor
    }

    fn should_filter(&self, response: &Response) -> bool {
        response.context().attempt_count() > 0
    }

    async fn apply(&self, response: &mut Response) -> Result<(), GatewayError> {
        let ctx = response.context().clone();
        response
            .headers
            .set(ATTEMPTS_HEADER, ctx.attempt_count().to_string());
        if ctx.debug() {
            match serde_json::to_string(&ctx.attempts()) {
                Ok(records) => {
                    tracing::info!(request_id = %ctx.request_id(), attempts = %records, "attempt records");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize attempt records");
                }
            }
        }
        Ok(())
    }
}

/// Default error responder: converts the recorded failure into the standard
/// JSON error shape with its stable classification string.
pub struct EdgeErrorFilter {
    descriptor: FilterDescriptor,
}

impl Default for EdgeErrorFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeErrorFilter {
    pub fn new() -> Self {
        Self {
            descriptor: FilterDescriptor::new("strato", "edge-error", FilterKind::Error, 100),
        }
    }
}

#[async_trait]
impl ErrorFilter for EdgeErrorFilter {
    fn descriptor(&self) -> &FilterDescriptor {
        &self.descriptor
    }

    async fn handle(
        &self,
        request: Request,
        error: Arc<GatewayError>,
    ) -> Result<Response, GatewayError> {
        let ctx = request.context().clone();
        tracing::warn!(
            request_id = %ctx.request_id(),
            error = %error,
            error_class = error.error_class(),
            attempts = ctx.attempt_count(),
            "request failed"
        );
        let mut response = synthesize_error_response(&error, &ctx);
        response.headers.set(REQUEST_ID_HEADER, ctx.request_id());
        Ok(response)
    }
}

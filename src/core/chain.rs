//! Filter chain execution: the per-request pipeline state machine.
//!
//! One `Pipeline` instance serves all concurrent requests. It is constructed
//! with its filter registry explicitly (no process-wide singletons) and takes
//! one registry snapshot per request, so a hot swap of filters never lands
//! mid-request.
//!
//! Stage policy:
//! * INBOUND filters run in (order, registration) sequence. A failure records
//!   the error and routes straight to the ERROR stage; a short-circuit skips
//!   the endpoint stage and proceeds to OUTBOUND with the produced response.
//! * The first ENDPOINT filter whose predicate claims the request produces
//!   the response; later endpoint filters are skipped. Zero claimants is a
//!   failure.
//! * OUTBOUND filters run even after earlier unrelated failures elsewhere; a
//!   failing outbound filter is logged and recorded but the already-computed
//!   response is still delivered.
//! * ERROR filters run instead of OUTBOUND, given a copy of the original
//!   (pre-mutation) request sharing the live context. A second failure there
//!   is caught and a generic fallback response is synthesized.
use std::{sync::Arc, time::Instant};

use serde::Serialize;

use crate::{
    core::{
        context::SessionContext,
        error::GatewayError,
        filter::{FilterSnapshot, Outcome},
        message::{Body, Request, Response},
    },
    metrics,
    ports::registry::FilterRegistry,
};

/// Progress of one request through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    InboundRunning,
    Dispatching,
    OutboundRunning,
    ErrorRunning,
    Complete,
}

/// Orchestrates filter execution for every request.
pub struct Pipeline {
    registry: Arc<dyn FilterRegistry>,
}

impl Pipeline {
    pub fn new(registry: Arc<dyn FilterRegistry>) -> Self {
        Self { registry }
    }

    /// Run one request through the full chain. Always yields a well-formed
    /// response; failures are converted by the ERROR stage or the synthesized
    /// fallback.
    pub async fn handle(&self, request: Request) -> Response {
        let ctx = request.context().clone();
        let snapshot = self.registry.snapshot();
        let started = Instant::now();
        // Pre-mutation view for the error stage and terminal diagnostics;
        // shares the live context so error filters see recorded state.
        let original = request.replicate();

        ctx.set_state(PipelineState::InboundRunning);
        let mut current = request;
        for filter in snapshot.inbound() {
            if !filter.should_filter(&current) {
                continue;
            }
            match filter.apply(current).await {
                Outcome::Continue(next) => current = next,
                Outcome::ShortCircuit(response) => {
                    tracing::debug!(
                        filter = %filter.descriptor().id(),
                        "inbound filter short-circuited"
                    );
                    let response = self.run_outbound(response, &snapshot).await;
                    return self.finish(response, started);
                }
                Outcome::Failed(err) => {
                    let err = Arc::new(GatewayError::FilterExecution {
                        filter: filter.descriptor().id(),
                        message: err.to_string(),
                    });
                    tracing::warn!(
                        filter = %filter.descriptor().id(),
                        error = %err,
                        "inbound filter failed; aborting stage"
                    );
                    metrics::record_filter_failure(&filter.descriptor().id());
                    ctx.record_error(err.clone());
                    let response = self.run_error(&original, err, &snapshot).await;
                    return self.finish(response, started);
                }
            }
        }

        ctx.set_state(PipelineState::Dispatching);
        let mut claimed = None;
        for filter in snapshot.endpoint() {
            if filter.should_filter(&current) {
                claimed = Some(filter);
                break;
            }
        }
        let Some(endpoint) = claimed else {
            let err = Arc::new(GatewayError::NoEndpoint {
                route: ctx.route().unwrap_or_default(),
            });
            ctx.record_error(err.clone());
            let response = self.run_error(&original, err, &snapshot).await;
            return self.finish(response, started);
        };

        let response = match endpoint.dispatch(current).await {
            Ok(response) => response,
            Err(err) => {
                let err = Arc::new(err);
                tracing::warn!(
                    filter = %endpoint.descriptor().id(),
                    error = %err,
                    error_class = err.error_class(),
                    "endpoint dispatch failed"
                );
                ctx.record_error(err.clone());
                let response = self.run_error(&original, err, &snapshot).await;
                return self.finish(response, started);
            }
        };

        let response = self.run_outbound(response, &snapshot).await;
        self.finish(response, started)
    }

    async fn run_outbound(&self, mut response: Response, snapshot: &FilterSnapshot) -> Response {
        let ctx = response.context().clone();
        ctx.set_state(PipelineState::OutboundRunning);
        for filter in snapshot.outbound() {
            if !filter.should_filter(&response) {
                continue;
            }
            if let Err(err) = filter.apply(&mut response).await {
                let err = Arc::new(GatewayError::FilterExecution {
                    filter: filter.descriptor().id(),
                    message: err.to_string(),
                });
                // The computed response still gets delivered.
                tracing::warn!(
                    filter = %filter.descriptor().id(),
                    error = %err,
                    "outbound filter failed; continuing"
                );
                metrics::record_filter_failure(&filter.descriptor().id());
                ctx.record_error(err);
            }
        }
        response
    }

    async fn run_error(
        &self,
        original: &Request,
        err: Arc<GatewayError>,
        snapshot: &FilterSnapshot,
    ) -> Response {
        let ctx = original.context().clone();
        ctx.set_state(PipelineState::ErrorRunning);
        for filter in snapshot.error() {
            if !filter.should_filter(original, &err) {
                continue;
            }
            match filter.handle(original.replicate(), err.clone()).await {
                Ok(response) => return response,
                Err(second) => {
                    tracing::error!(
                        filter = %filter.descriptor().id(),
                        error = %second,
                        "error filter itself failed; synthesizing fallback"
                    );
                    return synthesize_error_response(&err, &ctx);
                }
            }
        }
        synthesize_error_response(&err, &ctx)
    }

    fn finish(&self, response: Response, started: Instant) -> Response {
        let ctx = response.context().clone();
        ctx.set_state(PipelineState::Complete);
        metrics::record_pipeline(response.status.as_u16(), started.elapsed());
        tracing::info!(
            request_id = %ctx.request_id(),
            status = response.status.as_u16(),
            attempts = ctx.attempt_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request complete"
        );
        response
    }
}

/// Synthesize a well-formed error response carrying the stable classification
/// string, for the ERROR-stage fallback and for pre-pipeline rejections.
pub fn synthesize_error_response(err: &GatewayError, ctx: &SessionContext) -> Response {
    let body = serde_json::json!({
        "error": err.error_class(),
        "message": err.to_string(),
        "request_id": ctx.request_id(),
    });
    let mut response = Response::new(err.status_code(), ctx.clone());
    response.headers.set("Content-Type", "application/json");
    response.headers.set("X-Strato-Error", err.error_class());
    response.set_body(Body::from(body.to_string().into_bytes()));
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use http::{Method, StatusCode};

    use super::*;
    use crate::{
        adapters::registry::InMemoryFilterRegistry,
        core::filter::{
            EndpointFilter, ErrorFilter, FilterDescriptor, FilterKind, InboundFilter,
            OutboundFilter,
        },
    };

    type Trace = Arc<Mutex<Vec<String>>>;

    struct RecordingInbound {
        descriptor: FilterDescriptor,
        trace: Trace,
        mode: InboundMode,
    }

    enum InboundMode {
        Continue,
        Skip,
        Fail,
        ShortCircuit(StatusCode),
    }

    impl RecordingInbound {
        fn new(name: &str, order: i32, trace: Trace, mode: InboundMode) -> Arc<Self> {
            Arc::new(Self {
                descriptor: FilterDescriptor::new("test", name, FilterKind::Inbound, order),
                trace,
                mode,
            })
        }
    }

    #[async_trait]
    impl InboundFilter for RecordingInbound {
        fn descriptor(&self) -> &FilterDescriptor {
            &self.descriptor
        }

        fn should_filter(&self, _request: &Request) -> bool {
            !matches!(self.mode, InboundMode::Skip)
        }

        async fn apply(&self, request: Request) -> Outcome<Request> {
            self.trace.lock().unwrap().push(self.descriptor.name.clone());
            match self.mode {
                InboundMode::Continue | InboundMode::Skip => Outcome::Continue(request),
                InboundMode::Fail => Outcome::Failed(GatewayError::internal("inbound boom")),
                InboundMode::ShortCircuit(status) => {
                    Outcome::ShortCircuit(Response::new(status, request.context().clone()))
                }
            }
        }
    }

    struct OkEndpoint {
        descriptor: FilterDescriptor,
        trace: Trace,
        claims: bool,
        status: StatusCode,
    }

    impl OkEndpoint {
        fn new(name: &str, order: i32, trace: Trace, claims: bool, status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                descriptor: FilterDescriptor::new("test", name, FilterKind::Endpoint, order),
                trace,
                claims,
                status,
            })
        }
    }

    #[async_trait]
    impl EndpointFilter for OkEndpoint {
        fn descriptor(&self) -> &FilterDescriptor {
            &self.descriptor
        }

        fn should_filter(&self, _request: &Request) -> bool {
            self.claims
        }

        async fn dispatch(&self, request: Request) -> Result<Response, GatewayError> {
            self.trace.lock().unwrap().push(self.descriptor.name.clone());
            Ok(Response::new(self.status, request.context().clone()))
        }
    }

    struct RecordingOutbound {
        descriptor: FilterDescriptor,
        trace: Trace,
        fail: bool,
    }

    impl RecordingOutbound {
        fn new(name: &str, order: i32, trace: Trace, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                descriptor: FilterDescriptor::new("test", name, FilterKind::Outbound, order),
                trace,
                fail,
            })
        }
    }

    #[async_trait]
    impl OutboundFilter for RecordingOutbound {
        fn descriptor(&self) -> &FilterDescriptor {
            &self.descriptor
        }

        async fn apply(&self, response: &mut Response) -> Result<(), GatewayError> {
            self.trace.lock().unwrap().push(self.descriptor.name.clone());
            if self.fail {
                return Err(GatewayError::internal("outbound boom"));
            }
            response
                .headers
                .add("X-Outbound-Seen", &self.descriptor.name);
            Ok(())
        }
    }

    struct RecordingError {
        descriptor: FilterDescriptor,
        trace: Trace,
        fail: bool,
    }

    impl RecordingError {
        fn new(name: &str, trace: Trace, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                descriptor: FilterDescriptor::new("test", name, FilterKind::Error, 0),
                trace,
                fail,
            })
        }
    }

    #[async_trait]
    impl ErrorFilter for RecordingError {
        fn descriptor(&self) -> &FilterDescriptor {
            &self.descriptor
        }

        async fn handle(
            &self,
            request: Request,
            error: Arc<GatewayError>,
        ) -> Result<Response, GatewayError> {
            self.trace.lock().unwrap().push(self.descriptor.name.clone());
            if self.fail {
                return Err(GatewayError::internal("error filter boom"));
            }
            let mut response =
                Response::new(StatusCode::SERVICE_UNAVAILABLE, request.context().clone());
            response.headers.set("X-Handled-Error", error.error_class());
            Ok(response)
        }
    }

    fn trace() -> Trace {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn request() -> Request {
        Request::new(Method::GET, "/test", SessionContext::new())
    }

    fn taken(trace: &Trace) -> Vec<String> {
        trace.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_inbound_filters_run_in_order_regardless_of_registration() {
        let t = trace();
        let registry = InMemoryFilterRegistry::new();
        registry.register_inbound(RecordingInbound::new("thirty", 30, t.clone(), InboundMode::Continue));
        registry.register_inbound(RecordingInbound::new("ten", 10, t.clone(), InboundMode::Continue));
        registry.register_inbound(RecordingInbound::new("twenty", 20, t.clone(), InboundMode::Continue));
        registry.register_endpoint(OkEndpoint::new("ep", 0, t.clone(), true, StatusCode::OK));

        let pipeline = Pipeline::new(Arc::new(registry));
        let response = pipeline.handle(request()).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(taken(&t), vec!["ten", "twenty", "thirty", "ep"]);
    }

    #[tokio::test]
    async fn test_registration_order_breaks_ties() {
        let t = trace();
        let registry = InMemoryFilterRegistry::new();
        registry.register_inbound(RecordingInbound::new("first", 10, t.clone(), InboundMode::Continue));
        registry.register_inbound(RecordingInbound::new("second", 10, t.clone(), InboundMode::Continue));
        registry.register_endpoint(OkEndpoint::new("ep", 0, t.clone(), true, StatusCode::OK));

        let pipeline = Pipeline::new(Arc::new(registry));
        pipeline.handle(request()).await;
        assert_eq!(taken(&t), vec!["first", "second", "ep"]);
    }

    #[tokio::test]
    async fn test_skipped_filter_leaves_message_unchanged() {
        let t = trace();
        let registry = InMemoryFilterRegistry::new();
        registry.register_inbound(RecordingInbound::new("skipped", 10, t.clone(), InboundMode::Skip));
        registry.register_endpoint(OkEndpoint::new("ep", 0, t.clone(), true, StatusCode::OK));

        let pipeline = Pipeline::new(Arc::new(registry));
        let mut req = request();
        req.headers.set("X-Untouched", "yes");
        let response = pipeline.handle(req).await;

        assert_eq!(response.status, StatusCode::OK);
        // The skipped filter never executed, so nothing touched the message
        assert_eq!(taken(&t), vec!["ep"]);
    }

    #[tokio::test]
    async fn test_inbound_failure_routes_to_error_stage_once() {
        let t = trace();
        let registry = InMemoryFilterRegistry::new();
        registry.register_inbound(RecordingInbound::new("boom", 10, t.clone(), InboundMode::Fail));
        registry.register_inbound(RecordingInbound::new("after", 20, t.clone(), InboundMode::Continue));
        registry.register_endpoint(OkEndpoint::new("ep", 0, t.clone(), true, StatusCode::OK));
        registry.register_error(RecordingError::new("err", t.clone(), false));

        let pipeline = Pipeline::new(Arc::new(registry));
        let req = request();
        let ctx = req.context().clone();
        let response = pipeline.handle(req).await;

        // Remaining inbound filters and the endpoint never ran; error stage ran once
        assert_eq!(taken(&t), vec!["boom", "err"]);
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers.get_first("X-Handled-Error"),
            Some("FILTER_EXECUTION")
        );
        assert_eq!(
            ctx.error().map(|e| e.error_class()),
            Some("FILTER_EXECUTION")
        );
        assert_eq!(ctx.state(), PipelineState::Complete);
    }

    #[tokio::test]
    async fn test_outbound_failure_still_delivers_response() {
        let t = trace();
        let registry = InMemoryFilterRegistry::new();
        registry.register_endpoint(OkEndpoint::new("ep", 0, t.clone(), true, StatusCode::OK));
        registry.register_outbound(RecordingOutbound::new("ob-fail", 10, t.clone(), true));
        registry.register_outbound(RecordingOutbound::new("ob-after", 20, t.clone(), false));

        let pipeline = Pipeline::new(Arc::new(registry));
        let req = request();
        let ctx = req.context().clone();
        let response = pipeline.handle(req).await;

        assert_eq!(response.status, StatusCode::OK);
        // Both outbound filters ran despite the first one failing
        assert_eq!(taken(&t), vec!["ep", "ob-fail", "ob-after"]);
        assert!(response.headers.contains("X-Outbound-Seen", "ob-after"));
        // The failure was still recorded for diagnostics
        assert_eq!(
            ctx.error().map(|e| e.error_class()),
            Some("FILTER_EXECUTION")
        );
    }

    #[tokio::test]
    async fn test_first_claiming_endpoint_wins() {
        let t = trace();
        let registry = InMemoryFilterRegistry::new();
        registry.register_endpoint(OkEndpoint::new("declines", 10, t.clone(), false, StatusCode::OK));
        registry.register_endpoint(OkEndpoint::new("claims", 20, t.clone(), true, StatusCode::CREATED));
        registry.register_endpoint(OkEndpoint::new("late", 30, t.clone(), true, StatusCode::ACCEPTED));

        let pipeline = Pipeline::new(Arc::new(registry));
        let response = pipeline.handle(request()).await;

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(taken(&t), vec!["claims"]);
    }

    #[tokio::test]
    async fn test_no_endpoint_yields_classified_error_response() {
        let registry = InMemoryFilterRegistry::new();
        let pipeline = Pipeline::new(Arc::new(registry));
        let response = pipeline.handle(request()).await;

        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers.get_first("X-Strato-Error"),
            Some("NO_ENDPOINT")
        );
    }

    #[tokio::test]
    async fn test_failing_error_filter_falls_back_to_synthesized_response() {
        let t = trace();
        let registry = InMemoryFilterRegistry::new();
        registry.register_inbound(RecordingInbound::new("boom", 10, t.clone(), InboundMode::Fail));
        registry.register_error(RecordingError::new("err-boom", t.clone(), true));

        let pipeline = Pipeline::new(Arc::new(registry));
        let response = pipeline.handle(request()).await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers.get_first("X-Strato-Error"),
            Some("FILTER_EXECUTION")
        );
    }

    #[tokio::test]
    async fn test_inbound_short_circuit_skips_endpoint_but_runs_outbound() {
        let t = trace();
        let registry = InMemoryFilterRegistry::new();
        registry.register_inbound(RecordingInbound::new(
            "teapot",
            10,
            t.clone(),
            InboundMode::ShortCircuit(StatusCode::IM_A_TEAPOT),
        ));
        registry.register_endpoint(OkEndpoint::new("ep", 0, t.clone(), true, StatusCode::OK));
        registry.register_outbound(RecordingOutbound::new("ob", 10, t.clone(), false));

        let pipeline = Pipeline::new(Arc::new(registry));
        let response = pipeline.handle(request()).await;

        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(taken(&t), vec!["teapot", "ob"]);
    }

    #[tokio::test]
    async fn test_error_filter_sees_original_request_and_live_context() {
        struct PathAssertingError {
            descriptor: FilterDescriptor,
        }

        #[async_trait]
        impl ErrorFilter for PathAssertingError {
            fn descriptor(&self) -> &FilterDescriptor {
                &self.descriptor
            }

            async fn handle(
                &self,
                request: Request,
                _error: Arc<GatewayError>,
            ) -> Result<Response, GatewayError> {
                // Inbound mutation must not be visible on the original view
                assert_eq!(request.path(), "/test");
                assert!(!request.headers.contains_name("X-Mutated"));
                Ok(Response::new(StatusCode::BAD_GATEWAY, request.context().clone()))
            }
        }

        struct MutatingInbound {
            descriptor: FilterDescriptor,
        }

        #[async_trait]
        impl InboundFilter for MutatingInbound {
            fn descriptor(&self) -> &FilterDescriptor {
                &self.descriptor
            }

            async fn apply(&self, mut request: Request) -> Outcome<Request> {
                request.headers.set("X-Mutated", "yes");
                request.set_path("/rewritten");
                Outcome::Failed(GatewayError::internal("after mutation"))
            }
        }

        let registry = InMemoryFilterRegistry::new();
        registry.register_inbound(Arc::new(MutatingInbound {
            descriptor: FilterDescriptor::new("test", "mutate", FilterKind::Inbound, 10),
        }));
        registry.register_error(Arc::new(PathAssertingError {
            descriptor: FilterDescriptor::new("test", "assert", FilterKind::Error, 0),
        }));

        let pipeline = Pipeline::new(Arc::new(registry));
        let response = pipeline.handle(request()).await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    }
}

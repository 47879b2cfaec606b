//! End-to-end pipeline tests: built-in filters wired together over a mock
//! origin transport.
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use http::{Method, StatusCode};
use strato::{
    adapters::InMemoryFilterRegistry,
    core::{
        OriginDispatcher, OriginManager, Pipeline,
        context::SessionContext,
        message::{Body, Request, Response},
        origin::{DispatchPolicy, Origin, SelectionKind, Server},
    },
    filters::{
        ATTEMPTS_HEADER, AttemptReportFilter, EdgeErrorFilter, ProxyEndpoint, REQUEST_ID_HEADER,
        RequestIdFilter, RouteBindingFilter,
    },
    ports::transport::{OriginTransport, TransportResult},
};

struct EchoTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl OriginTransport for EchoTransport {
    async fn send(&self, server: &Server, request: Request) -> TransportResult<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut response = Response::new(StatusCode::OK, request.context().clone());
        response.headers.set("X-Served-By", server.addr());
        response
            .headers
            .set("X-Echo-Path", request.path().to_string());
        response.set_body(Body::from("origin payload"));
        Ok(response)
    }
}

fn gateway(transport: Arc<dyn OriginTransport>) -> Pipeline {
    let origins = Arc::new(OriginManager::new(vec![Origin::new(
        "users",
        vec![Server::new("10.0.0.1", 8080)],
        SelectionKind::RoundRobin,
        DispatchPolicy::default(),
    )]));
    let dispatcher = Arc::new(OriginDispatcher::new(origins, transport));

    let registry = Arc::new(InMemoryFilterRegistry::new());
    registry.register_inbound(Arc::new(RouteBindingFilter::new(vec![(
        "/api/users".to_string(),
        "users".to_string(),
    )])));
    registry.register_inbound(Arc::new(RequestIdFilter::new()));
    registry.register_endpoint(Arc::new(ProxyEndpoint::new(dispatcher)));
    registry.register_outbound(Arc::new(AttemptReportFilter::new()));
    registry.register_error(Arc::new(EdgeErrorFilter::new()));

    Pipeline::new(registry)
}

fn request(path: &str) -> Request {
    Request::new(Method::GET, path, SessionContext::new())
}

#[tokio::test(flavor = "multi_thread")]
async fn proxies_routed_request_to_origin() {
    let transport = Arc::new(EchoTransport {
        calls: AtomicUsize::new(0),
    });
    let pipeline = gateway(transport.clone());

    let req = request("/api/users/42");
    let ctx = req.context().clone();
    let response = pipeline.handle(req).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.headers.get_first("X-Served-By"),
        Some("10.0.0.1:8080")
    );
    assert_eq!(
        response.headers.get_first("X-Echo-Path"),
        Some("/api/users/42")
    );
    assert_eq!(response.headers.get_first(ATTEMPTS_HEADER), Some("1"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.route().as_deref(), Some("users"));
    assert_eq!(ctx.origin().as_deref(), Some("users"));
}

#[tokio::test(flavor = "multi_thread")]
async fn stamps_request_id_onto_proxied_request() {
    struct HeaderCapture;

    #[async_trait]
    impl OriginTransport for HeaderCapture {
        async fn send(&self, _server: &Server, request: Request) -> TransportResult<Response> {
            let mut response = Response::new(StatusCode::OK, request.context().clone());
            if let Some(id) = request.headers.get_first(REQUEST_ID_HEADER) {
                response.headers.set("X-Seen-Request-Id", id);
            }
            Ok(response)
        }
    }

    let pipeline = gateway(Arc::new(HeaderCapture));
    let req = request("/api/users");
    let expected = req.context().request_id();
    let response = pipeline.handle(req).await;

    assert_eq!(
        response.headers.get_first("X-Seen-Request-Id"),
        Some(expected.as_str())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unmatched_path_gets_404_without_touching_origin() {
    let transport = Arc::new(EchoTransport {
        calls: AtomicUsize::new(0),
    });
    let pipeline = gateway(transport.clone());

    let response = pipeline.handle(request("/nope")).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers.get_first("Content-Type"),
        Some("application/json")
    );
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn origin_failure_produces_classified_error_response() {
    struct FailingTransport;

    #[async_trait]
    impl OriginTransport for FailingTransport {
        async fn send(&self, server: &Server, _request: Request) -> TransportResult<Response> {
            Err(strato::ports::transport::TransportError::Read {
                server: server.to_string(),
                message: "connection reset mid-body".to_string(),
            })
        }
    }

    let pipeline = gateway(Arc::new(FailingTransport));
    let req = request("/api/users");
    let ctx = req.context().clone();
    let response = pipeline.handle(req).await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.headers.get_first("X-Strato-Error"),
        Some("ORIGIN_READ")
    );
    assert!(response.headers.contains_name(REQUEST_ID_HEADER));
    // The failed attempt was still recorded on the context
    assert_eq!(ctx.attempt_count(), 1);
    assert_eq!(ctx.attempts()[0].error.as_deref(), Some("ORIGIN_READ"));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_2xx_origin_status_passes_through_unchanged() {
    struct NotFoundTransport;

    #[async_trait]
    impl OriginTransport for NotFoundTransport {
        async fn send(&self, _server: &Server, request: Request) -> TransportResult<Response> {
            Ok(Response::new(
                StatusCode::NOT_FOUND,
                request.context().clone(),
            ))
        }
    }

    let pipeline = gateway(Arc::new(NotFoundTransport));
    let req = request("/api/users/999");
    let ctx = req.context().clone();
    let response = pipeline.handle(req).await;

    // A response from the origin is the answer, whatever its status
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(ctx.attempt_count(), 1);
    assert_eq!(ctx.attempts()[0].status, Some(404));
    assert!(ctx.error().is_none());
}

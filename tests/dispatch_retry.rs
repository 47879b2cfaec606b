//! Retry and discovery behavior through the dispatcher against a scripted
//! transport.
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use http::{Method, StatusCode};
use strato::{
    adapters::StaticDiscovery,
    core::{
        OriginDispatcher, OriginManager,
        context::SessionContext,
        error::{ConnectFailure, GatewayError},
        message::{Body, Request, Response},
        origin::{DispatchPolicy, Origin, SelectionKind, Server},
    },
    ports::transport::{OriginTransport, TransportError, TransportResult},
};
use tokio_util::sync::CancellationToken;

enum Step {
    Status(StatusCode),
    ConnectRefused,
}

struct ScriptedTransport {
    steps: Mutex<Vec<Step>>,
    servers_seen: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps),
            servers_seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.servers_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OriginTransport for ScriptedTransport {
    async fn send(&self, server: &Server, request: Request) -> TransportResult<Response> {
        self.servers_seen.lock().unwrap().push(server.addr());
        let step = self.steps.lock().unwrap().remove(0);
        match step {
            Step::Status(status) => Ok(Response::new(status, request.context().clone())),
            Step::ConnectRefused => Err(TransportError::Connect(ConnectFailure::wrapped(
                server.to_string(),
                "std::io::Error",
                "connection refused",
            ))),
        }
    }
}

fn manager(servers: Vec<Server>, max_attempts: u32) -> Arc<OriginManager> {
    Arc::new(OriginManager::new(vec![Origin::new(
        "users",
        servers,
        SelectionKind::RoundRobin,
        DispatchPolicy {
            max_attempts,
            attempt_timeout: Duration::from_secs(1),
        },
    )]))
}

fn two_servers() -> Vec<Server> {
    vec![Server::new("10.0.0.1", 8080), Server::new("10.0.0.2", 8080)]
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_failure_retries_on_next_server() {
    let transport = ScriptedTransport::new(vec![Step::ConnectRefused, Step::Status(StatusCode::OK)]);
    let dispatcher = OriginDispatcher::new(manager(two_servers(), 3), transport.clone());

    let request = Request::new(Method::GET, "/users", SessionContext::new());
    let ctx = request.context().clone();
    let cancel = CancellationToken::new();
    let response = dispatcher
        .dispatch(request, "users", &cancel)
        .await
        .expect("second attempt succeeds");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(transport.seen(), vec!["10.0.0.1:8080", "10.0.0.2:8080"]);

    let attempts = ctx.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].error.as_deref(), Some("ORIGIN_CONNECT"));
    assert_eq!(
        attempts[0].cause.as_deref(),
        Some("std::io::Error: connection refused")
    );
    assert_eq!(attempts[1].status, Some(200));
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_surface_wrapped_error() {
    let transport = ScriptedTransport::new(vec![
        Step::ConnectRefused,
        Step::ConnectRefused,
        Step::ConnectRefused,
    ]);
    let dispatcher = OriginDispatcher::new(manager(two_servers(), 3), transport.clone());

    let request = Request::new(Method::GET, "/users", SessionContext::new());
    let ctx = request.context().clone();
    let cancel = CancellationToken::new();
    let err = dispatcher
        .dispatch(request, "users", &cancel)
        .await
        .expect_err("all attempts fail");

    match err {
        GatewayError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, GatewayError::OriginConnect(_)));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(ctx.attempt_count(), 3);
    // Round-robin walked the server set
    assert_eq!(
        transport.seen(),
        vec!["10.0.0.1:8080", "10.0.0.2:8080", "10.0.0.1:8080"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn post_with_body_is_never_retried() {
    let transport = ScriptedTransport::new(vec![Step::ConnectRefused]);
    let dispatcher = OriginDispatcher::new(manager(two_servers(), 3), transport.clone());

    let mut request = Request::new(Method::POST, "/users", SessionContext::new());
    request.set_body(Body::from("payload"));
    let cancel = CancellationToken::new();
    let err = dispatcher
        .dispatch(request, "users", &cancel)
        .await
        .expect_err("single attempt fails");

    assert!(matches!(err, GatewayError::OriginConnect(_)));
    assert_eq!(transport.seen().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn discovery_updates_flow_into_dispatch() {
    let origins = manager(Vec::new(), 3);
    let transport = ScriptedTransport::new(vec![Step::Status(StatusCode::OK)]);
    let dispatcher = OriginDispatcher::new(origins.clone(), transport.clone());
    let cancel = CancellationToken::new();

    // No servers yet: dispatch fails fast without touching the transport
    let request = Request::new(Method::GET, "/users", SessionContext::new());
    let err = dispatcher
        .dispatch(request, "users", &cancel)
        .await
        .expect_err("no servers known");
    assert!(matches!(err, GatewayError::NoOriginAvailable { .. }));
    assert!(transport.seen().is_empty());

    // Discovery publishes a server set; the watch task applies it
    let discovery = Arc::new(StaticDiscovery::new());
    discovery.push("users", vec![Server::new("10.0.0.7", 8080)]);
    origins.spawn_discovery(discovery.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let request = Request::new(Method::GET, "/users", SessionContext::new());
    let response = dispatcher
        .dispatch(request, "users", &cancel)
        .await
        .expect("dispatch succeeds after discovery update");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(transport.seen(), vec!["10.0.0.7:8080"]);
}

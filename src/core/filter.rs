//! Filter abstractions: descriptors, outcomes, and the per-stage traits.
//!
//! A filter is a named, ordered transformation over a message. Filters are
//! registered as shared singletons (`Arc<dyn ...>`) and must therefore be
//! stateless or internally synchronized: one instance serves every concurrent
//! request. Short-circuiting and failure are expressed through the tagged
//! [`Outcome`] type rather than unwinding, so expected control paths never
//! rely on panics.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{
    error::GatewayError,
    message::{Request, Response},
};

/// Pipeline stage a filter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Inbound,
    Endpoint,
    Outbound,
    Error,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterKind::Inbound => "inbound",
            FilterKind::Endpoint => "endpoint",
            FilterKind::Outbound => "outbound",
            FilterKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// Declared execution mode. `Sync` filters must return without suspending;
/// `Async` filters may await. Both run through the same async seam, so the
/// mode is descriptive for diagnostics and registry listings rather than a
/// separate execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    Sync,
    Async,
}

/// Identity and ordering metadata for one filter.
///
/// Lower `order` runs first within a stage; ties are broken by registration
/// index so execution is deterministic across runs with identical filter sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescriptor {
    pub application: String,
    pub name: String,
    pub kind: FilterKind,
    pub order: i32,
    pub exec_mode: ExecMode,
}

impl FilterDescriptor {
    pub fn new(
        application: impl Into<String>,
        name: impl Into<String>,
        kind: FilterKind,
        order: i32,
    ) -> Self {
        Self {
            application: application.into(),
            name: name.into(),
            kind,
            order,
            exec_mode: ExecMode::Sync,
        }
    }

    pub fn with_exec_mode(mut self, exec_mode: ExecMode) -> Self {
        self.exec_mode = exec_mode;
        self
    }

    /// `application:name:kind` identity string used in logs.
    pub fn id(&self) -> String {
        format!("{}:{}:{}", self.application, self.name, self.kind)
    }
}

/// Result of applying one filter to a message.
#[derive(Debug)]
pub enum Outcome<T> {
    /// Keep going with this (possibly mutated or replaced) message.
    Continue(T),
    /// Stop the stage and use this response instead.
    ShortCircuit(Response),
    /// The filter failed; the pipeline isolates the error per stage policy.
    Failed(GatewayError),
}

/// Runs against the request before dispatch.
#[async_trait]
pub trait InboundFilter: Send + Sync + 'static {
    fn descriptor(&self) -> &FilterDescriptor;

    /// Predicate consulted before `apply`; a `false` skips the filter with no
    /// side effect on the message.
    fn should_filter(&self, _request: &Request) -> bool {
        true
    }

    async fn apply(&self, request: Request) -> Outcome<Request>;
}

/// Produces the response, normally by dispatching to an origin. Exactly one
/// endpoint filter claims each request: the first whose `should_filter`
/// returns true wins and later endpoint filters are skipped.
#[async_trait]
pub trait EndpointFilter: Send + Sync + 'static {
    fn descriptor(&self) -> &FilterDescriptor;

    fn should_filter(&self, _request: &Request) -> bool {
        true
    }

    async fn dispatch(&self, request: Request) -> Result<Response, GatewayError>;
}

/// Runs against the response after dispatch. The transform mutates the
/// response in place (including replacing status and body for a
/// short-circuit); a failure is logged and recorded but never prevents the
/// already-computed response from being delivered, so the message stays with
/// the pipeline.
#[async_trait]
pub trait OutboundFilter: Send + Sync + 'static {
    fn descriptor(&self) -> &FilterDescriptor;

    fn should_filter(&self, _response: &Response) -> bool {
        true
    }

    async fn apply(&self, response: &mut Response) -> Result<(), GatewayError>;
}

/// Runs instead of the outbound stage when a request failed, given the
/// original (pre-mutation) request and the recorded error.
#[async_trait]
pub trait ErrorFilter: Send + Sync + 'static {
    fn descriptor(&self) -> &FilterDescriptor;

    fn should_filter(&self, _request: &Request, _error: &GatewayError) -> bool {
        true
    }

    async fn handle(
        &self,
        request: Request,
        error: Arc<GatewayError>,
    ) -> Result<Response, GatewayError>;
}

/// Immutable, type-partitioned view of the registered filters, already sorted
/// by (order, registration index). A request reads exactly one snapshot for
/// its whole life; a registry swap only affects requests that start later.
#[derive(Default)]
pub struct FilterSnapshot {
    pub(crate) inbound: Vec<Arc<dyn InboundFilter>>,
    pub(crate) endpoint: Vec<Arc<dyn EndpointFilter>>,
    pub(crate) outbound: Vec<Arc<dyn OutboundFilter>>,
    pub(crate) error: Vec<Arc<dyn ErrorFilter>>,
}

impl FilterSnapshot {
    pub fn inbound(&self) -> &[Arc<dyn InboundFilter>] {
        &self.inbound
    }

    pub fn endpoint(&self) -> &[Arc<dyn EndpointFilter>] {
        &self.endpoint
    }

    pub fn outbound(&self) -> &[Arc<dyn OutboundFilter>] {
        &self.outbound
    }

    pub fn error(&self) -> &[Arc<dyn ErrorFilter>] {
        &self.error
    }

    pub fn filter_count(&self) -> usize {
        self.inbound.len() + self.endpoint.len() + self.outbound.len() + self.error.len()
    }
}

impl fmt::Debug for FilterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSnapshot")
            .field("inbound", &self.inbound.len())
            .field("endpoint", &self.endpoint.len())
            .field("outbound", &self.outbound.len())
            .field("error", &self.error.len())
            .finish()
    }
}

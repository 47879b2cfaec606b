//! Strato - an edge API gateway engine.
//!
//! Strato is the request-processing core of an edge gateway, implementing a
//! **hexagonal architecture**. Every request flows through a staged filter
//! chain (inbound, endpoint, outbound, with an error stage for failures),
//! carries a per-request session context, and is dispatched to load-balanced
//! origin servers with bounded retry. This library exposes the building
//! blocks so you can embed the engine behind your own connection layer or
//! compose parts of it inside another application.
//!
//! # Features
//! - Ordered, hot-swappable filter chains with per-stage failure isolation
//! - Case-preserving multi-value header map
//! - Typed per-request session context shared across all message views
//! - Origin sets with pluggable selection (round-robin, random) fed by a
//!   discovery seam
//! - Retrying dispatch with per-attempt deadlines, replay-safety checks, and
//!   full attempt records for diagnostics
//! - Token-bucket admission control per client identity
//! - Metrics and structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use strato::{
//!     adapters::{HttpTransport, InMemoryFilterRegistry},
//!     core::{OriginDispatcher, Pipeline},
//!     filters::{ProxyEndpoint, RequestIdFilter, RouteBindingFilter},
//! };
//!
//! # fn main() -> eyre::Result<()> {
//! let config = strato::config::load_config("strato.toml")?;
//! let origins = config.build_origins().map_err(|e| eyre::eyre!(e))?;
//! let dispatcher = Arc::new(OriginDispatcher::new(origins, Arc::new(HttpTransport::new())));
//!
//! let registry = Arc::new(InMemoryFilterRegistry::new());
//! registry.register_inbound(Arc::new(RouteBindingFilter::new(config.route_bindings())));
//! registry.register_inbound(Arc::new(RequestIdFilter::new()));
//! registry.register_endpoint(Arc::new(ProxyEndpoint::new(dispatcher)));
//!
//! let _pipeline = Pipeline::new(registry);
//! // Feed requests from your connection layer: pipeline.handle(request).await
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping business logic inside `core`. End users should prefer the
//! re-exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! Filter and dispatch failures are values ([`core::error::GatewayError`]),
//! never unwinding: each stage isolates them per its own policy, and every
//! failed request still produces a well-formed response carrying a stable
//! classification string.
//!
//! # Concurrency & Data Structures
//! Shared state that changes at runtime (filter snapshots, origin server
//! sets) is published through `arc-swap` so the request path never takes a
//! write lock; concurrent maps use `scc::HashMap`.
pub mod config;
pub mod filters;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;

pub mod adapters;
pub mod core;

// Re-export the types most embeddings need
pub use crate::{
    adapters::{HttpTransport, InMemoryFilterRegistry, StaticDiscovery},
    core::{
        OriginDispatcher, OriginManager, Pipeline,
        context::SessionContext,
        error::GatewayError,
        headers::Headers,
        message::{Body, Request, Response},
    },
    ports::{discovery::Discovery, registry::FilterRegistry, transport::OriginTransport},
};

//! Per-request session context.
//!
//! Exactly one `SessionContext` exists per inbound request. It is created
//! before any filter runs and dropped once the response has been written. All
//! messages derived from one request (the live request, diagnostic clones, the
//! response) share the same context through a cheap handle. A context is never
//! shared across two concurrent requests; the internal lock exists only
//! because the owning task may migrate between executor threads, and critical
//! sections are short field reads/writes.
use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use uuid::Uuid;

use crate::core::{
    attempt::Attempt, chain::PipelineState, error::GatewayError, origin::OriginManager,
};

struct ContextInner {
    request_id: String,
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
    route: Option<String>,
    origin: Option<String>,
    debug: bool,
    error: Option<Arc<GatewayError>>,
    attempts: Vec<Attempt>,
    state: PipelineState,
    started_at: Instant,
    origin_manager: Option<Arc<OriginManager>>,
}

/// Cheap handle to the mutable per-request state bag.
///
/// `Clone` shares the same underlying context; use
/// [`SessionContext::deep_clone`] when deriving a diagnostic message copy that
/// must be isolated from further mutation.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Mutex<ContextInner>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Create a fresh context with a generated request id.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ContextInner {
                request_id: Uuid::new_v4().to_string(),
                values: HashMap::new(),
                route: None,
                origin: None,
                debug: false,
                error: None,
                attempts: Vec::new(),
                state: PipelineState::Created,
                started_at: Instant::now(),
                origin_manager: None,
            })),
        }
    }

    /// Context wired with a back-reference to the origin manager, so filters
    /// can inspect the route table without a global.
    pub fn with_origin_manager(origins: Arc<OriginManager>) -> Self {
        let ctx = Self::new();
        ctx.lock().origin_manager = Some(origins);
        ctx
    }

    /// Deep-copy the context bag. The value map becomes independent (inserts
    /// and removals on the copy never affect the original) while the stored
    /// values themselves are shared immutably via `Arc`.
    pub fn deep_clone(&self) -> Self {
        let guard = self.lock();
        Self {
            inner: Arc::new(Mutex::new(ContextInner {
                request_id: guard.request_id.clone(),
                values: guard.values.clone(),
                route: guard.route.clone(),
                origin: guard.origin.clone(),
                debug: guard.debug,
                error: guard.error.clone(),
                attempts: guard.attempts.clone(),
                state: guard.state,
                started_at: guard.started_at,
                origin_manager: guard.origin_manager.clone(),
            })),
        }
    }

    /// Whether two handles refer to the same underlying context.
    pub fn same_context(&self, other: &SessionContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn request_id(&self) -> String {
        self.lock().request_id.clone()
    }

    /// Store an arbitrary typed value under a string key.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.lock().values.insert(key.into(), Arc::new(value));
    }

    /// Fetch a typed value. Returns `None` when the key is absent or the
    /// stored value has a different type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.lock()
            .values
            .get(key)
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().values.remove(key).is_some()
    }

    pub fn route(&self) -> Option<String> {
        self.lock().route.clone()
    }

    pub fn set_route(&self, route: impl Into<String>) {
        self.lock().route = Some(route.into());
    }

    pub fn origin(&self) -> Option<String> {
        self.lock().origin.clone()
    }

    pub fn set_origin(&self, origin: impl Into<String>) {
        self.lock().origin = Some(origin.into());
    }

    pub fn debug(&self) -> bool {
        self.lock().debug
    }

    pub fn set_debug(&self, debug: bool) {
        self.lock().debug = debug;
    }

    /// The first recorded unrecoverable error, if any. Later errors do not
    /// overwrite the original one that routed the request to the ERROR stage.
    pub fn error(&self) -> Option<Arc<GatewayError>> {
        self.lock().error.clone()
    }

    pub fn record_error(&self, err: Arc<GatewayError>) {
        let mut guard = self.lock();
        if guard.error.is_none() {
            guard.error = Some(err);
        }
    }

    /// Append one attempt record, preserving arrival order.
    pub fn push_attempt(&self, attempt: Attempt) {
        self.lock().attempts.push(attempt);
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.lock().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.lock().attempts.len()
    }

    pub fn state(&self) -> PipelineState {
        self.lock().state
    }

    pub fn set_state(&self, state: PipelineState) {
        self.lock().state = state;
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.lock().started_at.elapsed()
    }

    /// Back-reference to the origin manager, when wired.
    pub fn origin_manager(&self) -> Option<Arc<OriginManager>> {
        self.lock().origin_manager.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ContextInner> {
        // A poisoned lock only means a panicking task held it; the field
        // state is still coherent for diagnostics.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.lock();
        f.debug_struct("SessionContext")
            .field("request_id", &guard.request_id)
            .field("route", &guard.route)
            .field("origin", &guard.origin)
            .field("state", &guard.state)
            .field("attempts", &guard.attempts.len())
            .finish()
    }
}

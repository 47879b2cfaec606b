//! Origin resolution and load balancing.
//!
//! An `Origin` is the logical backend service behind a route name. Each holds
//! an atomically swapped snapshot of candidate servers (fed by the discovery
//! port; the most recent snapshot is authoritative and resolution never
//! blocks waiting for one) plus a selection strategy. The route table itself
//! is fixed at construction; only the server sets change at runtime.
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{core::error::GatewayError, ports::discovery::Discovery};

/// Errors constructing origin definitions.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OriginError {
    #[error("Invalid server address '{0}': expected host:port")]
    InvalidServer(String),
}

/// Identity of one physical backend server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Server {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Server {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| OriginError::InvalidServer(s.to_string()))?;
        if host.is_empty() {
            return Err(OriginError::InvalidServer(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| OriginError::InvalidServer(s.to_string()))?;
        Ok(Server::new(host, port))
    }
}

/// Trait defining the interface for server selection strategies.
pub trait SelectionStrategy: Send + Sync + 'static {
    /// Select one server from the candidate set, or `None` when empty.
    fn select(&self, servers: &[Server]) -> Option<Server>;

    fn boxed(self) -> Box<dyn SelectionStrategy>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin selection with one shared rotation counter.
///
/// `fetch_add` serializes concurrent selections at the counter so every
/// selection receives a distinct index; distribution stays fair under load
/// without any stronger cross-thread ordering.
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn select(&self, servers: &[Server]) -> Option<Server> {
        if servers.is_empty() {
            return None;
        }
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(servers[count % servers.len()].clone())
    }
}

/// Uniform random selection.
pub struct RandomStrategy;

impl SelectionStrategy for RandomStrategy {
    fn select(&self, servers: &[Server]) -> Option<Server> {
        if servers.is_empty() {
            return None;
        }
        use rand::Rng;
        let index = rand::rng().random_range(0..servers.len());
        Some(servers[index].clone())
    }
}

/// Selection strategy kinds as they appear in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    #[default]
    RoundRobin,
    Random,
}

impl SelectionKind {
    fn build(self) -> Box<dyn SelectionStrategy> {
        match self {
            SelectionKind::RoundRobin => RoundRobinStrategy::new().boxed(),
            SelectionKind::Random => RandomStrategy.boxed(),
        }
    }
}

/// Dispatch policy attached to one origin.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Bound on backend call attempts per request.
    pub max_attempts: u32,
    /// Deadline for each individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

/// One logical backend service: a live candidate set plus selection state.
pub struct Origin {
    name: String,
    servers: ArcSwap<Vec<Server>>,
    strategy: Box<dyn SelectionStrategy>,
    policy: DispatchPolicy,
}

impl Origin {
    pub fn new(
        name: impl Into<String>,
        servers: Vec<Server>,
        strategy: SelectionKind,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            servers: ArcSwap::from_pointee(servers),
            strategy: strategy.build(),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Current candidate snapshot; may be empty.
    pub fn servers(&self) -> Arc<Vec<Server>> {
        self.servers.load_full()
    }

    /// Replace the candidate set with a fresh discovery snapshot.
    pub fn update_servers(&self, servers: Vec<Server>) {
        tracing::debug!(origin = %self.name, count = servers.len(), "updating server set");
        self.servers.store(Arc::new(servers));
    }

    /// Select one server from the current snapshot.
    pub fn select(&self) -> Option<Server> {
        self.strategy.select(&self.servers.load())
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Origin")
            .field("name", &self.name)
            .field("servers", &self.servers.load().len())
            .finish()
    }
}

/// Maps logical route names to origins. The table is immutable after
/// construction; candidate server sets are refreshed through the discovery
/// port.
pub struct OriginManager {
    origins: HashMap<String, Arc<Origin>>,
}

impl OriginManager {
    pub fn new(origins: Vec<Origin>) -> Self {
        let origins = origins
            .into_iter()
            .map(|o| (o.name().to_string(), Arc::new(o)))
            .collect();
        Self { origins }
    }

    pub fn get(&self, route: &str) -> Option<Arc<Origin>> {
        self.origins.get(route).cloned()
    }

    pub fn route_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.origins.keys().cloned().collect();
        names.sort();
        names
    }

    /// Current candidate set for a route.
    pub fn resolve(&self, route: &str) -> Result<Arc<Vec<Server>>, GatewayError> {
        let origin = self.origins.get(route).ok_or_else(|| {
            GatewayError::NoOriginAvailable {
                route: route.to_string(),
            }
        })?;
        Ok(origin.servers())
    }

    /// Select one live server for a route, or fail with `NoOriginAvailable`
    /// when the route is unknown or its candidate set is empty.
    pub fn select(&self, route: &str) -> Result<Server, GatewayError> {
        self.origins
            .get(route)
            .and_then(|origin| origin.select())
            .ok_or_else(|| GatewayError::NoOriginAvailable {
                route: route.to_string(),
            })
    }

    /// Subscribe every origin to discovery updates. Each route gets a task
    /// that stores the latest pushed snapshot; resolution keeps reading the
    /// previous snapshot until a new one lands.
    pub fn spawn_discovery(self: &Arc<Self>, discovery: Arc<dyn Discovery>) {
        for origin in self.origins.values() {
            let origin = origin.clone();
            let mut updates = discovery.watch(origin.name());
            tokio::spawn(async move {
                while let Some(servers) = updates.next().await {
                    origin.update_servers(servers);
                }
                tracing::debug!(origin = %origin.name(), "discovery stream ended");
            });
        }
    }
}

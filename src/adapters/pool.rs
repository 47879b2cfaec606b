//! Bounded in-memory connection pool.
//!
//! Idle connections are kept per server in a concurrent map; checkout pops
//! one (exclusivity comes from removal, so a connection can never be handed
//! to two requests) and falls back to dialing through the injected connector.
//! `release` returns a healthy connection up to the per-server idle cap;
//! `discard` drops it, for connections left in an indeterminate state.
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use scc::HashMap;

use crate::{
    core::origin::Server,
    ports::{
        pool::ConnectionPool,
        transport::{TransportError, TransportResult},
    },
};

/// Dials a new connection to a server.
pub type Connector<C> =
    Box<dyn Fn(&Server) -> BoxFuture<'static, TransportResult<C>> + Send + Sync>;

/// Pool adapter generic over the connection type.
pub struct BoundedPool<C: Send + 'static> {
    idle: HashMap<Server, Vec<C>>,
    connector: Connector<C>,
    max_idle_per_server: usize,
}

impl<C: Send + 'static> BoundedPool<C> {
    pub fn new(connector: Connector<C>, max_idle_per_server: usize) -> Self {
        Self {
            idle: HashMap::new(),
            connector,
            max_idle_per_server,
        }
    }

    /// Number of idle connections currently pooled for a server.
    pub async fn idle_count(&self, server: &Server) -> usize {
        self.idle
            .get_async(server)
            .await
            .map(|entry| entry.get().len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl<C: Send + Sync + 'static> ConnectionPool for BoundedPool<C> {
    type Conn = C;

    async fn acquire(&self, server: &Server) -> TransportResult<C> {
        if let Some(mut entry) = self.idle.get_async(server).await {
            if let Some(conn) = entry.get_mut().pop() {
                tracing::trace!(%server, "reusing pooled connection");
                return Ok(conn);
            }
        }
        tracing::trace!(%server, "dialing new connection");
        (self.connector)(server).await
    }

    async fn release(&self, server: &Server, conn: C) {
        if let Some(mut entry) = self.idle.get_async(server).await {
            let idle = entry.get_mut();
            if idle.len() < self.max_idle_per_server {
                idle.push(conn);
            }
            return;
        }
        if let Err((server, mut conns)) = self.idle.insert_async(server.clone(), vec![conn]).await {
            // Lost the insert race; append to the entry that won
            if let Some(mut entry) = self.idle.get_async(&server).await {
                let idle = entry.get_mut();
                if idle.len() < self.max_idle_per_server {
                    idle.append(&mut conns);
                }
            }
        }
    }

    async fn discard(&self, server: &Server, conn: C) {
        tracing::trace!(%server, "discarding connection");
        drop(conn);
    }
}

/// Convenience constructor for tests and simple embeddings.
pub fn pool_with<C, F, Fut>(dial: F, max_idle_per_server: usize) -> BoundedPool<C>
where
    C: Send + 'static,
    F: Fn(Server) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = TransportResult<C>> + Send + 'static,
{
    BoundedPool::new(
        Box::new(move |server: &Server| Box::pin(dial(server.clone()))),
        max_idle_per_server,
    )
}

/// Uniform classification for a failed dial, for connector implementations.
pub fn dial_failure(server: &Server, message: impl Into<String>) -> TransportError {
    TransportError::Connect(crate::core::error::ConnectFailure::wrapped(
        server.to_string(),
        "std::io::Error",
        message,
    ))
}

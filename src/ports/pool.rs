use async_trait::async_trait;

use crate::{core::origin::Server, ports::transport::TransportResult};

/// ConnectionPool defines the port (interface) for pooled origin connections.
///
/// The pool is shared across all requests. Checkout and checkin must be safe
/// under concurrent access and a connection must never be handed to two
/// requests simultaneously. `discard` bypasses the pool return path for
/// connections in an indeterminate state (mid-request cancellation, protocol
/// errors).
#[async_trait]
pub trait ConnectionPool: Send + Sync + 'static {
    /// The pooled connection type.
    type Conn: Send + 'static;

    /// Check out a connection to `server`, dialing a new one when no idle
    /// connection is available. May suspend.
    async fn acquire(&self, server: &Server) -> TransportResult<Self::Conn>;

    /// Return a healthy connection for reuse.
    async fn release(&self, server: &Server, conn: Self::Conn);

    /// Drop a connection without returning it to the pool.
    async fn discard(&self, server: &Server, conn: Self::Conn);
}

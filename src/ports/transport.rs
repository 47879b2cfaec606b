use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{
    error::{ConnectFailure, GatewayError},
    message::{Request, Response},
    origin::Server,
};

/// Classified failure of one transport attempt.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Connecting to the server failed, possibly wrapping a handshake
    /// failure with its own cause chain.
    #[error("{0}")]
    Connect(ConnectFailure),

    /// The attempt exceeded its deadline.
    #[error("attempt timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The connection was established but reading the response failed.
    #[error("read from {server} failed: {message}")]
    Read { server: String, message: String },

    /// Unclassified failure; the message is surfaced verbatim.
    #[error("{message}")]
    Other { message: String },
}

impl TransportError {
    /// Fold into the gateway taxonomy the dispatcher records and surfaces.
    pub fn into_gateway_error(self) -> GatewayError {
        match self {
            TransportError::Connect(failure) => GatewayError::OriginConnect(failure),
            TransportError::Timeout { elapsed } => GatewayError::OriginTimeout { elapsed },
            TransportError::Read { server, message } => GatewayError::OriginRead { server, message },
            TransportError::Other { message } => GatewayError::Internal { message },
        }
    }
}

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// OriginTransport defines the port (interface) for issuing one backend call
/// attempt against a concrete server.
///
/// Implementations own connection establishment and reuse; the dispatcher
/// owns attempt bounding, per-attempt deadlines, retry decisions and attempt
/// records. `send` is a suspension point and must never block its executor
/// thread.
#[async_trait]
pub trait OriginTransport: Send + Sync + 'static {
    /// Issue the request against `server` and await the full response.
    async fn send(&self, server: &Server, request: Request) -> TransportResult<Response>;
}

//! Gateway error taxonomy.
//!
//! Every failure surfaced by the pipeline or the dispatcher is one of these
//! variants. Each carries a stable machine-parseable classification string
//! (`error_class`) and a response status mapping so the client always receives
//! a well-formed error response. Connect failures keep a classified cause
//! chain that is flattened by the diagnostic unwrapping rule in
//! [`GatewayError::cause_detail`].
use std::{fmt, time::Duration};

use http::StatusCode;
use thiserror::Error;

/// What a failed connection attempt was wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectCause {
    /// TLS or protocol handshake failed after the socket was established.
    /// `cause` carries the handshake failure's own inner cause, when present
    /// (e.g. a certificate validation message).
    Handshake {
        message: String,
        cause: Option<String>,
    },
    /// Some other error occurred while connecting; `type_name` identifies the
    /// wrapped error type for diagnostics.
    Wrapped { type_name: String, message: String },
}

/// A classified transport-level connection failure against one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFailure {
    pub server: String,
    pub cause: ConnectCause,
}

impl ConnectFailure {
    pub fn handshake(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            cause: ConnectCause::Handshake {
                message: message.into(),
                cause: None,
            },
        }
    }

    pub fn handshake_with_cause(
        server: impl Into<String>,
        message: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            cause: ConnectCause::Handshake {
                message: message.into(),
                cause: Some(cause.into()),
            },
        }
    }

    pub fn wrapped(
        server: impl Into<String>,
        type_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            cause: ConnectCause::Wrapped {
                type_name: type_name.into(),
                message: message.into(),
            },
        }
    }

    /// Flatten the wrapped cause to the single diagnostic string reported on
    /// attempt records. A handshake failure reports its inner cause message
    /// when one exists, otherwise its own message. Any other wrapped error
    /// reports `"<TypeName>: <message>"`.
    pub fn unwrapped_cause(&self) -> String {
        match &self.cause {
            ConnectCause::Handshake {
                cause: Some(inner), ..
            } => inner.clone(),
            ConnectCause::Handshake { message, .. } => message.clone(),
            ConnectCause::Wrapped { type_name, message } => {
                format!("{type_name}: {message}")
            }
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connect to {} failed: {}", self.server, self.unwrapped_cause())
    }
}

/// Failure taxonomy for the pipeline and dispatcher.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum GatewayError {
    /// A single filter failed; isolated at the stage boundary.
    #[error("filter '{filter}' failed: {message}")]
    FilterExecution { filter: String, message: String },

    /// No candidate servers are known for the route. Not retryable.
    #[error("no origin available for route '{route}'")]
    NoOriginAvailable { route: String },

    /// Transport or handshake level failure. Retry-eligible.
    #[error("{0}")]
    OriginConnect(ConnectFailure),

    /// A backend attempt exceeded its deadline. Retry-eligible.
    #[error("origin attempt timed out after {elapsed:?}")]
    OriginTimeout { elapsed: Duration },

    /// Reading the response failed after the connection was established.
    #[error("read from origin '{server}' failed: {message}")]
    OriginRead { server: String, message: String },

    /// The backend produced a response with an error status. Never retried;
    /// surfaced as-is by the dispatcher, present here for filters that choose
    /// to convert such responses into failures.
    #[error("origin returned error status {status}")]
    OriginApplication { status: StatusCode },

    /// Every bounded attempt failed; `last` is the final attempt's failure.
    #[error("all {attempts} dispatch attempts failed: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },

    /// Rejected by admission control before entering the pipeline.
    #[error("admission rejected for '{identity}'")]
    AdmissionRejected { identity: String },

    /// The inbound connection went away; in-flight work was abandoned.
    #[error("request cancelled before completion")]
    Cancelled,

    /// No endpoint filter claimed the request.
    #[error("no endpoint filter claimed route '{route}'")]
    NoEndpoint { route: String },

    /// Unclassified runtime failure; its message is reported verbatim as both
    /// error and cause.
    #[error("{message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn internal(message: impl Into<String>) -> Self {
        GatewayError::Internal {
            message: message.into(),
        }
    }

    /// Stable classification string for operators and log parsers.
    pub fn error_class(&self) -> &'static str {
        match self {
            GatewayError::FilterExecution { .. } => "FILTER_EXECUTION",
            GatewayError::NoOriginAvailable { .. } => "NO_ORIGIN_AVAILABLE",
            GatewayError::OriginConnect(_) => "ORIGIN_CONNECT",
            GatewayError::OriginTimeout { .. } => "ORIGIN_TIMEOUT",
            GatewayError::OriginRead { .. } => "ORIGIN_READ",
            GatewayError::OriginApplication { .. } => "ORIGIN_APPLICATION",
            GatewayError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            GatewayError::AdmissionRejected { .. } => "ADMISSION_REJECTED",
            GatewayError::Cancelled => "CANCELLED",
            GatewayError::NoEndpoint { .. } => "NO_ENDPOINT",
            GatewayError::Internal { .. } => "INTERNAL",
        }
    }

    /// Response status synthesized for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::FilterExecution { .. } | GatewayError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::NoOriginAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::OriginConnect(_)
            | GatewayError::OriginRead { .. }
            | GatewayError::RetriesExhausted { .. }
            | GatewayError::NoEndpoint { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::OriginTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::OriginApplication { status } => *status,
            GatewayError::AdmissionRejected { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a new attempt against a different server may succeed. Only
    /// connection-level failures and deadline expiry qualify; application
    /// statuses and read failures after headers do not.
    pub fn is_retry_eligible(&self) -> bool {
        matches!(
            self,
            GatewayError::OriginConnect(_) | GatewayError::OriginTimeout { .. }
        )
    }

    /// Unwrapped root-cause string recorded on attempt records.
    pub fn cause_detail(&self) -> String {
        match self {
            GatewayError::OriginConnect(failure) => failure.unwrapped_cause(),
            GatewayError::RetriesExhausted { last, .. } => last.cause_detail(),
            other => other.to_string(),
        }
    }
}

//! Per-attempt diagnostic records for backend dispatch.
//!
//! One `Attempt` is created for every concrete backend call the dispatcher
//! makes. It is terminal once either a status or an error has been recorded;
//! later outcome mutations are ignored. All attempts for one request are
//! retained in arrival order on the session context, even after a later
//! attempt supersedes an earlier failed one.
use std::time::Duration;

use serde::Serialize;

use crate::core::error::GatewayError;

/// Diagnostic record of one backend call attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    /// 1-based attempt index within one dispatch.
    pub index: u32,
    /// Logical route name this dispatch targeted.
    pub route: String,
    /// Chosen server identity (host:port).
    pub server: String,
    /// Response status when the attempt reached the backend.
    pub status: Option<u16>,
    /// Short error classification when the attempt failed.
    pub error: Option<String>,
    /// Unwrapped root-cause detail when the attempt failed.
    pub cause: Option<String>,
    /// Offset from the start of the request, in milliseconds.
    pub start_offset_ms: u64,
    /// Time spent resolving and selecting the server.
    pub resolve_ms: u64,
    /// Time spent establishing or checking out the connection, when known.
    pub connect_ms: Option<u64>,
    /// Total attempt duration.
    pub total_ms: u64,
    #[serde(skip)]
    terminal: bool,
}

impl Attempt {
    /// Start a new attempt record. Timing fields are filled in as the attempt
    /// progresses; the outcome is recorded exactly once.
    pub fn new(index: u32, route: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            index,
            route: route.into(),
            server: server.into(),
            status: None,
            error: None,
            cause: None,
            start_offset_ms: 0,
            resolve_ms: 0,
            connect_ms: None,
            total_ms: 0,
            terminal: false,
        }
    }

    /// Mark the attempt successful with the backend's status code. Mutually
    /// exclusive with [`Attempt::set_error`]; ignored once terminal.
    pub fn set_status(&mut self, status: u16) {
        if self.terminal {
            tracing::debug!(
                attempt = self.index,
                "ignoring status on terminal attempt record"
            );
            return;
        }
        self.status = Some(status);
        self.terminal = true;
    }

    /// Mark the attempt failed, recording the classification and the
    /// unwrapped root cause. Ignored once terminal.
    pub fn set_error(&mut self, err: &GatewayError) {
        if self.terminal {
            tracing::debug!(
                attempt = self.index,
                "ignoring error on terminal attempt record"
            );
            return;
        }
        // Unclassified failures report their message verbatim as both fields.
        self.error = Some(match err {
            GatewayError::Internal { message } => message.clone(),
            other => other.error_class().to_string(),
        });
        self.cause = Some(err.cause_detail());
        self.terminal = true;
    }

    /// Whether an outcome (status or error) has been recorded.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Whether the attempt completed with a backend response.
    pub fn succeeded(&self) -> bool {
        self.status.is_some()
    }

    pub fn record_start_offset(&mut self, offset: Duration) {
        self.start_offset_ms = offset.as_millis() as u64;
    }

    pub fn record_resolve(&mut self, elapsed: Duration) {
        self.resolve_ms = elapsed.as_millis() as u64;
    }

    pub fn record_connect(&mut self, elapsed: Duration) {
        self.connect_ms = Some(elapsed.as_millis() as u64);
    }

    pub fn record_total(&mut self, elapsed: Duration) {
        self.total_ms = elapsed.as_millis() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ConnectFailure;

    #[test]
    fn test_status_marks_terminal() {
        let mut attempt = Attempt::new(1, "users", "10.0.0.1:8080");
        assert!(!attempt.is_terminal());
        attempt.set_status(200);
        assert!(attempt.is_terminal());
        assert!(attempt.succeeded());
        assert_eq!(attempt.status, Some(200));
        assert_eq!(attempt.error, None);
    }

    #[test]
    fn test_error_after_status_is_ignored() {
        let mut attempt = Attempt::new(1, "users", "10.0.0.1:8080");
        attempt.set_status(200);
        attempt.set_error(&GatewayError::internal("late failure"));
        assert_eq!(attempt.status, Some(200));
        assert_eq!(attempt.error, None);
    }

    #[test]
    fn test_status_after_error_is_ignored() {
        let mut attempt = Attempt::new(2, "users", "10.0.0.2:8080");
        attempt.set_error(&GatewayError::OriginConnect(ConnectFailure::wrapped(
            "10.0.0.2:8080",
            "std::io::Error",
            "connection refused",
        )));
        attempt.set_status(200);
        assert_eq!(attempt.status, None);
        assert_eq!(attempt.error.as_deref(), Some("ORIGIN_CONNECT"));
        assert_eq!(
            attempt.cause.as_deref(),
            Some("std::io::Error: connection refused")
        );
    }

    #[test]
    fn test_unclassified_error_recorded_verbatim() {
        let mut attempt = Attempt::new(1, "users", "10.0.0.1:8080");
        attempt.set_error(&GatewayError::internal("socket failure"));
        assert_eq!(attempt.error.as_deref(), Some("socket failure"));
        assert_eq!(attempt.cause.as_deref(), Some("socket failure"));
    }

    #[test]
    fn test_serializes_for_logging() {
        let mut attempt = Attempt::new(1, "users", "10.0.0.1:8080");
        attempt.set_status(503);
        let json = serde_json::to_value(&attempt).expect("attempt should serialize");
        assert_eq!(json["index"], 1);
        assert_eq!(json["server"], "10.0.0.1:8080");
        assert_eq!(json["status"], 503);
        assert!(json.get("terminal").is_none());
    }
}

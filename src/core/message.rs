//! Request and response message model.
//!
//! A message couples immutable identity (method/status, path, version) with a
//! mutable header map, a body, and a handle to its session context. Many
//! messages can share one context: the live request, the diagnostic clone
//! taken before inbound filters mutate it, and the response all point at the
//! same per-request state.
//!
//! `clone_message` deep-copies headers and the context bag so that mutation
//! through one copy never corrupts state visible through another, while
//! buffered bodies are shared cheaply (`Bytes` is reference counted). A
//! not-yet-materialized stream body cannot be duplicated and clones to
//! `Body::Empty`; call [`Request::buffer_body`] first when a clone or a retry
//! needs the payload.
use std::fmt;

use bytes::Bytes;
use futures_util::{StreamExt, stream::BoxStream};
use http::{Method, StatusCode, Version};

use crate::core::{context::SessionContext, error::GatewayError, headers::Headers};

/// Message payload: empty, fully buffered, or a not-yet-materialized stream.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Buffered(Bytes),
    Stream(BoxStream<'static, Result<Bytes, std::io::Error>>),
}

impl Body {
    pub fn buffered(bytes: impl Into<Bytes>) -> Self {
        Body::Buffered(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Buffered(b) => b.is_empty(),
            Body::Stream(_) => false,
        }
    }

    /// Whether the payload is already materialized and can be resent.
    pub fn is_buffered(&self) -> bool {
        !matches!(self, Body::Stream(_))
    }

    /// Cheap duplicate for clones: buffered bytes are shared, a stream
    /// degrades to `Empty`.
    fn clone_shallow(&self) -> Self {
        match self {
            Body::Empty => Body::Empty,
            Body::Buffered(b) => Body::Buffered(b.clone()),
            Body::Stream(_) => Body::Empty,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Body::Empty"),
            Body::Buffered(b) => write!(f, "Body::Buffered({} bytes)", b.len()),
            Body::Stream(_) => write!(f, "Body::Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Buffered(bytes)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Buffered(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Buffered(Bytes::from(v))
    }
}

/// One logical inbound or origin-bound request.
#[derive(Debug)]
pub struct Request {
    pub version: Version,
    pub method: Method,
    path: String,
    query: Vec<(String, String)>,
    pub headers: Headers,
    body: Body,
    context: SessionContext,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>, context: SessionContext) -> Self {
        Self {
            version: Version::HTTP_11,
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Headers::new(),
            body: Body::Empty,
            context,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn add_query(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query.push((name.into(), value.into()));
    }

    /// Path plus serialized query string, as sent on the wire.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Deep-copy headers and context for diagnostics; body is shared when
    /// buffered. Mutating the clone never affects the original.
    pub fn clone_message(&self) -> Request {
        Request {
            version: self.version,
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            body: self.body.clone_shallow(),
            context: self.context.deep_clone(),
        }
    }

    /// Copy sharing the live context handle, with its own header map and a
    /// shared buffered body. Used for transport attempts and for the
    /// error-stage view of the original request, both of which must observe
    /// the live per-request state.
    pub(crate) fn replicate(&self) -> Request {
        Request {
            version: self.version,
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            body: self.body.clone_shallow(),
            context: self.context.clone(),
        }
    }

    /// Materialize a stream body into buffered bytes so the request becomes
    /// replay-safe. No-op for empty or already-buffered bodies.
    pub async fn buffer_body(&mut self) -> Result<(), GatewayError> {
        if let Body::Stream(_) = self.body {
            let Body::Stream(mut stream) = std::mem::take(&mut self.body) else {
                return Ok(());
            };
            let mut buf = Vec::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| {
                    GatewayError::internal(format!("failed to buffer request body: {e}"))
                })?;
                buf.extend_from_slice(&chunk);
            }
            self.body = Body::Buffered(Bytes::from(buf));
        }
        Ok(())
    }

    /// Whether the method is idempotent per RFC 9110 semantics.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::PUT | Method::DELETE
        )
    }

    /// A request may be retried only when the method is idempotent and the
    /// body is fully buffered so it can be resent.
    pub fn is_replay_safe(&self) -> bool {
        self.is_idempotent() && self.body.is_buffered()
    }
}

/// One logical response flowing back through the outbound stage.
#[derive(Debug)]
pub struct Response {
    pub version: Version,
    pub status: StatusCode,
    pub headers: Headers,
    body: Body,
    context: SessionContext,
}

impl Response {
    pub fn new(status: StatusCode, context: SessionContext) -> Self {
        Self {
            version: Version::HTTP_11,
            status,
            headers: Headers::new(),
            body: Body::Empty,
            context,
        }
    }

    pub fn with_body(status: StatusCode, body: impl Into<Body>, context: SessionContext) -> Self {
        let mut response = Self::new(status, context);
        response.body = body.into();
        response
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Deep-copy headers and context; body is shared when buffered.
    pub fn clone_message(&self) -> Response {
        Response {
            version: self.version,
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone_shallow(),
            context: self.context.deep_clone(),
        }
    }
}

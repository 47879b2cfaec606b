//! HTTP/1.1 origin transport built on the Hyper legacy pooled client.
//!
//! Converts the gateway message model to and from Hyper's types for one
//! attempt. Connection pooling lives inside the Hyper client: dropping an
//! in-flight request (dispatcher timeout or cancellation) tears the
//! connection down instead of returning it to the pool, which is the
//! discard-on-indeterminate-state behavior the dispatcher relies on.
use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::{
    HeaderName, HeaderValue, Version,
    header::{self},
};
use http_body_util::{BodyExt, Full, StreamBody, combinators::UnsyncBoxBody};
use hyper::body::Frame;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};

use crate::{
    core::{
        error::ConnectFailure,
        message::{Body, Request, Response},
        origin::Server,
    },
    ports::transport::{OriginTransport, TransportError, TransportResult},
};

type OutgoingBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Transport adapter issuing plain-HTTP attempts against origin servers.
pub struct HttpTransport {
    client: Client<HttpConnector, OutgoingBody>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        tracing::info!("created origin HTTP transport (HTTP/1.1, pooled)");
        Self { client }
    }

    fn to_outgoing(server: &Server, mut request: Request) -> TransportResult<hyper::Request<OutgoingBody>> {
        let uri = format!("http://{}{}", server, request.path_and_query());
        let body = match request.take_body() {
            Body::Empty => Full::new(Bytes::new())
                .map_err(|never| match never {})
                .boxed_unsync(),
            Body::Buffered(bytes) => Full::new(bytes)
                .map_err(|never| match never {})
                .boxed_unsync(),
            Body::Stream(stream) => {
                StreamBody::new(stream.map(|chunk| chunk.map(Frame::data))).boxed_unsync()
            }
        };

        let mut outgoing = hyper::Request::builder()
            .method(request.method.clone())
            .uri(&uri)
            .version(Version::HTTP_11)
            .body(body)
            .map_err(|e| TransportError::Other {
                message: format!("failed to build outgoing request for {uri}: {e}"),
            })?;

        let headers = outgoing.headers_mut();
        for (name, value) in request.headers.iter() {
            let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
                tracing::warn!(name, "skipping header with invalid name");
                continue;
            };
            let Ok(header_value) = HeaderValue::from_str(value) else {
                tracing::warn!(name, "skipping header with invalid value");
                continue;
            };
            headers.append(header_name, header_value);
        }
        headers.insert(
            header::HOST,
            HeaderValue::from_str(&server.addr()).map_err(|e| TransportError::Other {
                message: format!("invalid host header for {server}: {e}"),
            })?,
        );

        Ok(outgoing)
    }

    fn classify(server: &Server, err: hyper_util::client::legacy::Error) -> TransportError {
        // Walk to the root cause so diagnostics carry the socket-level
        // message rather than Hyper's wrapper text.
        let mut message = err.to_string();
        let mut source: Option<&(dyn StdError + 'static)> = err.source();
        while let Some(inner) = source {
            message = inner.to_string();
            source = inner.source();
        }

        if err.is_connect() {
            TransportError::Connect(ConnectFailure::wrapped(
                server.to_string(),
                "std::io::Error",
                message,
            ))
        } else {
            TransportError::Other { message }
        }
    }
}

#[async_trait]
impl OriginTransport for HttpTransport {
    async fn send(&self, server: &Server, request: Request) -> TransportResult<Response> {
        let ctx = request.context().clone();
        let method = request.method.clone();
        let path = request.path().to_string();
        let outgoing = Self::to_outgoing(server, request)?;

        tracing::debug!(%server, %method, path, "sending origin request");
        let response = self
            .client
            .request(outgoing)
            .await
            .map_err(|e| Self::classify(server, e))?;

        let (parts, incoming) = response.into_parts();
        let bytes = incoming
            .collect()
            .await
            .map_err(|e| TransportError::Read {
                server: server.to_string(),
                message: e.to_string(),
            })?
            .to_bytes();

        let mut result = Response::new(parts.status, ctx);
        result.version = parts.version;
        for (name, value) in parts.headers.iter() {
            match value.to_str() {
                Ok(value) => result.headers.add(name.as_str(), value),
                Err(_) => {
                    tracing::warn!(name = name.as_str(), "dropping non-UTF-8 response header");
                }
            }
        }
        result.set_body(Body::Buffered(bytes));
        Ok(result)
    }
}

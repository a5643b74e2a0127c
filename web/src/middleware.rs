//! Request correlation.
//!
//! [`correlation_id_layer`] tags every request with a [`CorrelationId`]:
//! the caller's `X-Correlation-ID` when it is a UUID, a fresh one otherwise.
//! The id is stored in the request extensions, recorded on the
//! `http_request` span the request runs in, and echoed on the response.

use axum::extract::Request;
use axum::http::{Extensions, HeaderMap, HeaderValue};
use axum::response::Response;
use futures::future::BoxFuture;
use std::fmt;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Request and response header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlation id of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Reuse the caller's id if it parses, otherwise generate one.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let supplied = headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|text| Uuid::parse_str(text.trim()).ok());
        Self(supplied.unwrap_or_else(Uuid::new_v4))
    }

    /// The id stored by the layer, if it ran.
    #[must_use]
    pub fn of(extensions: &Extensions) -> Option<Self> {
        extensions.get::<Self>().copied()
    }

    fn header_value(self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0.hyphenated().to_string()).ok()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Layer installing [`CorrelationId`] tagging.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationLayer {
    CorrelationLayer
}

/// See [`correlation_id_layer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CorrelationLayer;

impl<S> Layer<S> for CorrelationLayer {
    type Service = Correlated<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Correlated { inner }
    }
}

/// Service produced by [`CorrelationLayer`].
#[derive(Clone, Debug)]
pub struct Correlated<S> {
    inner: S,
}

impl<S> Service<Request> for Correlated<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let id = CorrelationId::from_headers(request.headers());
        request.extensions_mut().insert(id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %id,
            method = %request.method(),
            path = %request.uri().path(),
        );
        let response = self.inner.call(request).instrument(span);

        Box::pin(async move {
            let mut response = response.await?;
            if let Some(value) = id.header_value() {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::routing::get;
    use tower::ServiceExt;

    async fn echo(request: Request) -> String {
        CorrelationId::of(request.extensions()).map_or_else(String::new, |id| id.to_string())
    }

    async fn roundtrip(header: Option<&str>) -> (String, String) {
        let app = Router::new()
            .route("/", get(echo))
            .layer(correlation_id_layer());
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(CORRELATION_ID_HEADER, value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let echoed = response.headers()[CORRELATION_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        let seen = to_bytes(response.into_body(), 1024).await.unwrap();
        (echoed, String::from_utf8(seen.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn caller_id_is_reused() {
        let id = Uuid::new_v4().to_string();
        let (echoed, seen) = roundtrip(Some(&id)).await;
        assert_eq!(echoed, id);
        assert_eq!(seen, id);
    }

    #[tokio::test]
    async fn missing_or_malformed_id_is_replaced() {
        for header in [None, Some("request-42")] {
            let (echoed, seen) = roundtrip(header).await;
            assert!(Uuid::parse_str(&echoed).is_ok());
            assert_eq!(echoed, seen);
        }
    }

    #[test]
    fn absent_without_layer() {
        assert_eq!(CorrelationId::of(&Extensions::new()), None);
    }
}

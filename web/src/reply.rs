//! Response shaping.
//!
//! Handlers return a [`Reply`]; [`shape`] turns it into the wire response.
//! Shaping never fails: a body that cannot be serialised becomes the
//! `server_exception` envelope, and that envelope has a static fallback.

use crate::error::{ErrorEnvelope, translate};
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use serde::Serialize;

/// Pre-rendered `server_exception` envelope, used when rendering the envelope
/// itself fails.
pub const FALLBACK_BODY: &str =
    r#"{"error":{"name":"server_exception","code":50000,"desc":"Something went wrong on the server. Please try again shortly."}}"#;

const APPLICATION_JSON: &str = "application/json";

/// A handler's successful result.
#[derive(Debug)]
pub struct Reply(Kind);

#[derive(Debug)]
enum Kind {
    Json {
        body: serde_json::Result<Vec<u8>>,
        status: u16,
        headers: HeaderMap,
    },
    Raw(Response),
}

impl Reply {
    /// A JSON body with status 200.
    ///
    /// Serialisation happens here; a failure is reported when the reply is
    /// shaped.
    pub fn json<T: Serialize + ?Sized>(body: &T) -> Self {
        Self(Kind::Json {
            body: serde_json::to_vec(body),
            status: 200,
            headers: HeaderMap::new(),
        })
    }

    /// A response sent exactly as given.
    #[must_use]
    pub const fn raw(response: Response) -> Self {
        Self(Kind::Raw(response))
    }

    /// Set the status. Values outside 100..=999 are sent as 200. Ignored for
    /// raw replies.
    #[must_use]
    pub fn with_status(mut self, code: u16) -> Self {
        if let Kind::Json { status, .. } = &mut self.0 {
            *status = code;
        }
        self
    }

    /// Add a response header. Ignored for raw replies.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if let Kind::Json { headers, .. } = &mut self.0 {
            headers.append(name, value);
        }
        self
    }

    /// Whether the reply bypasses shaping.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        matches!(self.0, Kind::Raw(_))
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::raw(response)
    }
}

fn json_response(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}

/// Shape a reply into a response.
#[must_use]
pub fn shape(reply: Reply) -> Response {
    match reply.0 {
        Kind::Raw(response) => response,
        Kind::Json {
            body: Ok(body),
            status,
            headers,
        } => json_response(
            StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
            headers,
            body,
        ),
        Kind::Json { body: Err(e), .. } => {
            let (status, envelope) = translate(&anyhow::Error::new(e).context("Reply body").into());
            envelope_response(status, &envelope)
        }
    }
}

/// Render an error envelope.
#[must_use]
pub fn envelope_response(status: StatusCode, envelope: &ErrorEnvelope) -> Response {
    let body = serde_json::to_vec(envelope).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to render error envelope");
        FALLBACK_BODY.as_bytes().to_vec()
    });
    json_response(status, HeaderMap::new(), body)
}

//! Failure taxonomy and its translation into wire responses.
//!
//! Every way a request can fail ends up as a [`Failure`]. The session pipeline
//! is the only caller of [`translate`]; handlers and adapters just return
//! `Err(..)` and propagate with `?`.
//!
//! | Failure | Wire error |
//! |---|---|
//! | [`Failure::Request`] | its own catalog key and arguments |
//! | [`Failure::Database`] raised by a procedure | key and arguments parsed from the message |
//! | [`Failure::Client`] | `client_error` with the message |
//! | [`Failure::Decode`] | `invalid_json` |
//! | anything else | `server_exception`, detail logged only |

use crate::reply;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gatehouse_core::catalog::{self, CatalogEntry, SERVER_EXCEPTION_ENTRY};
use gatehouse_core::validation::ValidationError;
use gatehouse_core::{DbError, RequestError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Any failure of a request.
#[derive(Error, Debug)]
pub enum Failure {
    /// A catalog error raised by validation, the guard or a handler.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A database failure. Only [`DbError::Raised`] reaches the client.
    #[error(transparent)]
    Database(#[from] DbError),

    /// The transport rejected the request (unknown route, body too large...).
    #[error("Client error: {0}")]
    Client(String),

    /// The body was not valid JSON.
    #[error("Invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),

    /// A defect or an unanticipated failure.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<ValidationError> for Failure {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::Request(e) => Self::Request(e),
            not_an_object @ ValidationError::NotAnObject(_) => {
                Self::Unexpected(anyhow::Error::new(not_an_object))
            }
        }
    }
}

impl Failure {
    /// Build a transport failure.
    #[must_use]
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client(message.into())
    }
}

/// `{"error": {"name", "code", "desc"}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    /// The error.
    pub error: ErrorBody,
}

/// Contents of an [`ErrorEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Catalog key.
    pub name: String,
    /// Catalog code.
    pub code: u32,
    /// Formatted message.
    pub desc: String,
}

impl ErrorEnvelope {
    /// Envelope of an entry with an already formatted message.
    #[must_use]
    pub fn new(entry: &CatalogEntry, desc: String) -> Self {
        Self {
            error: ErrorBody {
                name: entry.key.to_owned(),
                code: entry.code,
                desc,
            },
        }
    }

    /// The generic internal-failure envelope.
    #[must_use]
    pub fn server_exception() -> Self {
        Self::new(&SERVER_EXCEPTION_ENTRY, SERVER_EXCEPTION_ENTRY.template.to_owned())
    }
}

/// Status of a catalog entry; entries always carry a valid status.
fn status_of(entry: &CatalogEntry) -> StatusCode {
    StatusCode::from_u16(entry.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn server_exception() -> (StatusCode, ErrorEnvelope) {
    (StatusCode::INTERNAL_SERVER_ERROR, ErrorEnvelope::server_exception())
}

/// Render a catalog key and arguments. Unknown keys and arity mismatches
/// degrade to `server_exception`.
#[must_use]
pub fn render(key: &str, args: &[Value]) -> (StatusCode, ErrorEnvelope) {
    let Some(entry) = catalog::lookup(key) else {
        tracing::warn!(key = %key, "Unknown error key, reporting server_exception");
        return server_exception();
    };

    match entry.format(args) {
        Ok(desc) => (status_of(entry), ErrorEnvelope::new(entry, desc)),
        Err(e) => {
            tracing::error!(error = %e, "Error template mismatch, reporting server_exception");
            server_exception()
        }
    }
}

/// Translate a failure into its status and envelope.
///
/// Total: every failure produces a response. Recognised failures are logged
/// at `debug`; unexpected ones at `error` with their full chain, and the
/// client only ever sees `server_exception` for them.
#[must_use]
pub fn translate(failure: &Failure) -> (StatusCode, ErrorEnvelope) {
    let (status, envelope) = match failure {
        Failure::Request(e) => {
            tracing::debug!(error = %e, "Request failed");
            render(e.key(), e.args())
        }
        Failure::Database(DbError::Raised(message)) => {
            tracing::debug!(message = %message, "Procedure raised");
            let raised = RequestError::from_raised(message);
            render(raised.key(), raised.args())
        }
        Failure::Client(message) => {
            tracing::debug!(message = %message, "Client error");
            render(catalog::CLIENT_ERROR, &[Value::from(message.as_str())])
        }
        Failure::Decode(e) => {
            tracing::debug!(error = %e, "Body is not valid JSON");
            render(catalog::INVALID_JSON, &[])
        }
        Failure::Database(other) => {
            tracing::error!(error = ?other, "Database failure");
            server_exception()
        }
        Failure::Unexpected(e) => {
            tracing::error!(error = ?e, "Unexpected failure");
            server_exception()
        }
    };

    metrics::counter!("gatehouse.failures", "name" => envelope.error.name.clone()).increment(1);
    (status, envelope)
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let (status, envelope) = translate(&self);
        reply::envelope_response(status, &envelope)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use serde_json::json;

    fn translated(failure: Failure) -> (u16, String, u32, String) {
        let (status, envelope) = translate(&failure);
        (
            status.as_u16(),
            envelope.error.name,
            envelope.error.code,
            envelope.error.desc,
        )
    }

    #[test]
    fn request_error_uses_catalog() {
        let (status, name, code, desc) =
            translated(RequestError::missing_header("Authorization").into());
        assert_eq!(status, 400);
        assert_eq!(name, "missing_header");
        assert_eq!(code, 40001);
        assert_eq!(desc, "You are missing the 'Authorization' HTTP header.");
    }

    #[test]
    fn raised_message_is_split() {
        let (status, name, _, desc) =
            translated(DbError::Raised("identity_exists a@b.com".into()).into());
        assert_eq!(status, 409);
        assert_eq!(name, "identity_exists");
        assert_eq!(desc, "Identity a@b.com is already registered");
    }

    #[test]
    fn raised_unknown_key_is_server_exception() {
        let (status, name, _, _) = translated(DbError::Raised("no_such_key x".into()).into());
        assert_eq!(status, 500);
        assert_eq!(name, "server_exception");
    }

    #[test]
    fn arity_mismatch_is_server_exception() {
        let (status, name, _, desc) =
            translated(RequestError::new(catalog::MISSING_KEY, vec![]).into());
        assert_eq!(status, 500);
        assert_eq!(name, "server_exception");
        assert_eq!(desc, "Something went wrong on the server. Please try again shortly.");
    }

    #[test]
    fn client_error_carries_message() {
        let (status, name, _, desc) = translated(Failure::client("Requested URL /x not found"));
        assert_eq!(status, 400);
        assert_eq!(name, "client_error");
        assert_eq!(desc, "You did something wrong: Requested URL /x not found.");
    }

    #[test]
    fn decode_failure_is_invalid_json() {
        let decode = serde_json::from_str::<Value>("{not json").unwrap_err();
        let (status, name, code, _) = translated(decode.into());
        assert_eq!(status, 400);
        assert_eq!(name, "invalid_json");
        assert_eq!(code, 40000);
    }

    #[test]
    fn unexpected_details_are_hidden() {
        let (status, name, _, desc) =
            translated(anyhow::anyhow!("connection refused to 10.0.0.7").into());
        assert_eq!(status, 500);
        assert_eq!(name, "server_exception");
        assert!(!desc.contains("10.0.0.7"));

        let (status, _, _, desc) = translated(DbError::Backend("password auth failed".into()).into());
        assert_eq!(status, 500);
        assert!(!desc.contains("password"));
    }

    #[test]
    fn not_an_object_is_internal() {
        let failure: Failure = ValidationError::NotAnObject("array").into();
        assert!(matches!(failure, Failure::Unexpected(_)));
    }

    #[test]
    fn non_string_arguments_render_as_json() {
        let (_, _, _, desc) = translated(
            RequestError::invalid_value(json!({"a": 1}), "data").into(),
        );
        assert_eq!(desc, r#"Invalid value {"a":1} for key data"#);
    }

    #[test]
    fn every_catalog_key_translates_to_its_own_status() {
        for entry in catalog::entries() {
            let args = vec![json!("x"); entry.arity()];
            let (status, envelope) = render(entry.key, &args);
            assert_eq!(status.as_u16(), entry.status);
            assert_eq!(envelope.error.name, entry.key);
            assert_eq!(envelope.error.code, entry.code);
        }
    }
}

//! Static error catalog.
//!
//! Every client-facing failure is identified by a catalog key. The catalog maps
//! that key to a numeric code, an HTTP status and a message template with `{}`
//! placeholders filled from the error's positional arguments.
//!
//! The table is a `static` slice: it is built at compile time and never
//! mutated, so it can be read from any request task without synchronisation.
//!
//! # Example
//!
//! ```
//! use gatehouse_core::catalog::{self, MISSING_KEY};
//! use serde_json::json;
//!
//! let entry = catalog::lookup(MISSING_KEY).unwrap();
//! assert_eq!(entry.status, 400);
//! assert_eq!(entry.format(&[json!("password")]).unwrap(), "You are missing the 'password' key and value in your JSON data.");
//! ```

use serde_json::Value;
use thiserror::Error;

/// Body is not valid JSON.
pub const INVALID_JSON: &str = "invalid_json";
/// A required header is absent. Args: header name.
pub const MISSING_HEADER: &str = "missing_header";
/// A required body key is absent. Args: key.
pub const MISSING_KEY: &str = "missing_key";
/// Malformed request detected by the transport. Args: message.
pub const CLIENT_ERROR: &str = "client_error";
/// A body value failed to cast. Args: raw value, key.
pub const INVALID_VALUE: &str = "invalid_value";
/// The endpoint needs a body and none was sent.
pub const NO_BODY: &str = "no_body";
/// The `User-ID` header is not a short identifier. Args: raw header.
pub const INVALID_USER_ID: &str = "invalid_user_id";
/// The session token is unknown or expired. Args: token.
pub const INVALID_TOKEN: &str = "invalid_token";
/// No account matches the supplied credentials.
pub const USER_NOT_FOUND: &str = "user_not_found";
/// An identity (email, phone) is already registered. Args: identifier.
pub const IDENTITY_EXISTS: &str = "identity_exists";
/// Generic internal failure. Never carries detail.
pub const SERVER_EXCEPTION: &str = "server_exception";

/// One catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Stable key, also reported to clients as `error.name`.
    pub key: &'static str,
    /// Numeric code reported as `error.code`.
    pub code: u32,
    /// Message template; each `{}` consumes one argument.
    pub template: &'static str,
    /// HTTP status of responses carrying this error.
    pub status: u16,
}

/// Template formatting failure.
///
/// Formatting only fails on an arity mismatch between template and arguments,
/// which is a programming defect in whoever raised the error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Template for {key} expects {expected} argument(s), got {actual}")]
pub struct FormatError {
    /// Key whose template was being formatted.
    pub key: &'static str,
    /// Placeholders in the template.
    pub expected: usize,
    /// Arguments supplied.
    pub actual: usize,
}

const ENTRIES: &[CatalogEntry] = &[
    CatalogEntry { key: INVALID_JSON, code: 40000, template: "Your POST-data is not JSON-compatible.", status: 400 },
    CatalogEntry { key: MISSING_HEADER, code: 40001, template: "You are missing the '{}' HTTP header.", status: 400 },
    CatalogEntry { key: MISSING_KEY, code: 40002, template: "You are missing the '{}' key and value in your JSON data.", status: 400 },
    CatalogEntry { key: CLIENT_ERROR, code: 40003, template: "You did something wrong: {}.", status: 400 },
    CatalogEntry { key: INVALID_VALUE, code: 40004, template: "Invalid value {} for key {}", status: 400 },
    CatalogEntry { key: NO_BODY, code: 40005, template: "Request body is required", status: 400 },
    CatalogEntry { key: INVALID_USER_ID, code: 40100, template: "Invalid user id {}", status: 401 },
    CatalogEntry { key: INVALID_TOKEN, code: 40101, template: "Invalid or expired token {}", status: 401 },
    CatalogEntry { key: USER_NOT_FOUND, code: 40400, template: "User not found", status: 404 },
    CatalogEntry { key: IDENTITY_EXISTS, code: 40900, template: "Identity {} is already registered", status: 409 },
    CatalogEntry { key: SERVER_EXCEPTION, code: 50000, template: "Something went wrong on the server. Please try again shortly.", status: 500 },
];

/// The fallback entry for unknown keys and internal failures.
pub const SERVER_EXCEPTION_ENTRY: CatalogEntry = CatalogEntry {
    key: SERVER_EXCEPTION,
    code: 50000,
    template: "Something went wrong on the server. Please try again shortly.",
    status: 500,
};

/// All catalog entries, in code order.
#[must_use]
pub const fn entries() -> &'static [CatalogEntry] {
    ENTRIES
}

/// Look up a key.
///
/// Returns `None` for keys the catalog does not define; callers fall back to
/// [`SERVER_EXCEPTION_ENTRY`].
#[must_use]
pub fn lookup(key: &str) -> Option<&'static CatalogEntry> {
    ENTRIES.iter().find(|entry| entry.key == key)
}

impl CatalogEntry {
    /// Number of `{}` placeholders in the template.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.template.matches("{}").count()
    }

    /// Fill the template with `args`.
    ///
    /// String arguments are inserted without quotes; every other JSON value is
    /// inserted in its compact JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] when the number of arguments differs from the
    /// number of placeholders.
    pub fn format(&self, args: &[Value]) -> Result<String, FormatError> {
        let expected = self.arity();
        if expected != args.len() {
            return Err(FormatError {
                key: self.key,
                expected,
                actual: args.len(),
            });
        }

        let mut pieces = self.template.split("{}");
        let mut message = String::with_capacity(self.template.len());
        message.push_str(pieces.next().unwrap_or_default());
        for (arg, piece) in args.iter().zip(pieces) {
            push_arg(&mut message, arg);
            message.push_str(piece);
        }
        Ok(message)
    }
}

fn push_arg(message: &mut String, arg: &Value) {
    match arg {
        Value::String(s) => message.push_str(s),
        other => message.push_str(&other.to_string()),
    }
}

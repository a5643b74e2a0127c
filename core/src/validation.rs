//! Declarative body validation.
//!
//! An endpoint declares the body it expects as a tuple of [`FieldSpec`]s. Each
//! spec names a key, a cast function and whether the key is required.
//! [`parse`] walks the specs in declaration order and returns a tuple of typed
//! values in the same order, so handlers destructure results positionally.
//!
//! ```
//! use gatehouse_core::validation::{self, casts, optional, required};
//! use serde_json::json;
//!
//! let specs = (
//!     required("identifier", casts::non_empty_string),
//!     optional("data", casts::object),
//! );
//!
//! let (identifier, data) = validation::parse(&json!({"identifier": "a@b.com"}), &specs).unwrap();
//! assert_eq!(identifier, "a@b.com");
//! assert!(data.is_none());
//! ```
//!
//! # Failure rules
//!
//! - absent and required: `missing_key(key)`
//! - absent and optional: `None`
//! - present but the cast fails: `invalid_value(raw, key)`; the cast's own
//!   error is discarded
//!
//! The first failing field in declaration order wins. A present JSON `null` is
//! handed to the cast like any other value.

use crate::error::RequestError;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use thiserror::Error;

/// Validation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The body was not a JSON object. This is caller misuse, not user input.
    #[error("Body must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A field was missing or failed to cast.
    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Marker for required fields.
#[derive(Debug, Clone, Copy)]
pub struct Required;

/// Marker for optional fields.
#[derive(Debug, Clone, Copy)]
pub struct Optional;

/// One expected body key.
///
/// Build with [`required`] or [`optional`].
#[derive(Clone, Copy)]
pub struct FieldSpec<C, M> {
    key: &'static str,
    cast: C,
    mode: PhantomData<fn() -> M>,
}

/// Declare a required key.
pub const fn required<C>(key: &'static str, cast: C) -> FieldSpec<C, Required> {
    FieldSpec {
        key,
        cast,
        mode: PhantomData,
    }
}

/// Declare an optional key; absent keys yield `None`.
pub const fn optional<C>(key: &'static str, cast: C) -> FieldSpec<C, Optional> {
    FieldSpec {
        key,
        cast,
        mode: PhantomData,
    }
}

impl<C, M> FieldSpec<C, M> {
    /// The body key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }
}

impl<C> FieldSpec<C, Required> {
    /// Whether absence is an error.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        true
    }
}

impl<C> FieldSpec<C, Optional> {
    /// Whether absence is an error.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        false
    }
}

/// A single field extractor.
pub trait Field: Send + Sync {
    /// Typed value produced for this field.
    type Output: Send;

    /// Extract and cast this field from a body object.
    ///
    /// # Errors
    ///
    /// Returns `missing_key` or `invalid_value`.
    fn extract(&self, body: &Map<String, Value>) -> Result<Self::Output, RequestError>;
}

impl<C, T, E> Field for FieldSpec<C, Required>
where
    C: Fn(&Value) -> Result<T, E> + Send + Sync,
    T: Send,
{
    type Output = T;

    fn extract(&self, body: &Map<String, Value>) -> Result<T, RequestError> {
        let raw = body
            .get(self.key)
            .ok_or_else(|| RequestError::missing_key(self.key))?;
        cast_field(self.key, &self.cast, raw)
    }
}

impl<C, T, E> Field for FieldSpec<C, Optional>
where
    C: Fn(&Value) -> Result<T, E> + Send + Sync,
    T: Send,
{
    type Output = Option<T>;

    fn extract(&self, body: &Map<String, Value>) -> Result<Option<T>, RequestError> {
        body.get(self.key)
            .map(|raw| cast_field(self.key, &self.cast, raw))
            .transpose()
    }
}

fn cast_field<C, T, E>(key: &str, cast: &C, raw: &Value) -> Result<T, RequestError>
where
    C: Fn(&Value) -> Result<T, E>,
{
    cast(raw).map_err(|_| RequestError::invalid_value(raw.clone(), key))
}

/// An ordered set of fields, implemented for tuples of [`Field`]s.
pub trait FieldSet: Send + Sync {
    /// Tuple of typed values, one per field, in declaration order.
    type Output: Send;

    /// Extract every field in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first field's `RequestError`.
    fn extract_all(&self, body: &Map<String, Value>) -> Result<Self::Output, RequestError>;
}

macro_rules! impl_field_set {
    ($($field:ident),+) => {
        impl<$($field: Field),+> FieldSet for ($($field,)+) {
            type Output = ($($field::Output,)+);

            #[allow(non_snake_case)]
            fn extract_all(&self, body: &Map<String, Value>) -> Result<Self::Output, RequestError> {
                let ($($field,)+) = self;
                // Tuple expressions evaluate left to right.
                Ok(($($field.extract(body)?,)+))
            }
        }
    };
}

impl_field_set!(A);
impl_field_set!(A, B);
impl_field_set!(A, B, C);
impl_field_set!(A, B, C, D);
impl_field_set!(A, B, C, D, E);
impl_field_set!(A, B, C, D, E, F);
impl_field_set!(A, B, C, D, E, F, G);
impl_field_set!(A, B, C, D, E, F, G, H);

/// Validate a parsed body against `specs`.
///
/// # Errors
///
/// - [`ValidationError::NotAnObject`] if `body` is not a JSON object
/// - [`ValidationError::Request`] for the first missing or invalid field
pub fn parse<S: FieldSet>(body: &Value, specs: &S) -> Result<S::Output, ValidationError> {
    let Value::Object(map) = body else {
        return Err(ValidationError::NotAnObject(json_kind(body)));
    };
    Ok(specs.extract_all(map)?)
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Stock cast functions.
///
/// Every cast is a plain `fn(&Value) -> Result<T, CastError>`; any function or
/// closure of the shape `Fn(&Value) -> Result<T, E>` works as a cast.
pub mod casts {
    use crate::identity::{LoginMethod, is_valid_email, is_valid_phone};
    use crate::short_id;
    use serde_json::{Map, Value};
    use thiserror::Error;
    use uuid::Uuid;

    /// Minimum password length accepted by [`password`].
    pub const MIN_PASSWORD_LEN: usize = 8;

    /// A value did not have the expected shape.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    #[error("Expected {0}")]
    pub struct CastError(pub &'static str);

    /// Any string.
    ///
    /// # Errors
    ///
    /// Fails on non-strings.
    pub fn string(value: &Value) -> Result<String, CastError> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or(CastError("string"))
    }

    /// A string with at least one non-whitespace character.
    ///
    /// # Errors
    ///
    /// Fails on non-strings and blank strings.
    pub fn non_empty_string(value: &Value) -> Result<String, CastError> {
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s.to_owned()),
            _ => Err(CastError("non-empty string")),
        }
    }

    /// A JSON integer.
    ///
    /// # Errors
    ///
    /// Fails on anything that does not fit an `i64`.
    pub fn integer(value: &Value) -> Result<i64, CastError> {
        value.as_i64().ok_or(CastError("integer"))
    }

    /// A JSON boolean.
    ///
    /// # Errors
    ///
    /// Fails on non-booleans.
    pub fn boolean(value: &Value) -> Result<bool, CastError> {
        value.as_bool().ok_or(CastError("boolean"))
    }

    /// A JSON object.
    ///
    /// # Errors
    ///
    /// Fails on non-objects.
    pub fn object(value: &Value) -> Result<Map<String, Value>, CastError> {
        value.as_object().cloned().ok_or(CastError("object"))
    }

    /// An email address.
    ///
    /// # Errors
    ///
    /// Fails unless [`is_valid_email`] accepts the string.
    pub fn email(value: &Value) -> Result<String, CastError> {
        match value.as_str() {
            Some(s) if is_valid_email(s) => Ok(s.to_owned()),
            _ => Err(CastError("email address")),
        }
    }

    /// An E.164 phone number.
    ///
    /// # Errors
    ///
    /// Fails unless [`is_valid_phone`] accepts the string.
    pub fn phone(value: &Value) -> Result<String, CastError> {
        match value.as_str() {
            Some(s) if is_valid_phone(s) => Ok(s.to_owned()),
            _ => Err(CastError("phone number")),
        }
    }

    /// A password of at least [`MIN_PASSWORD_LEN`] characters.
    ///
    /// # Errors
    ///
    /// Fails on non-strings and short strings.
    pub fn password(value: &Value) -> Result<String, CastError> {
        match value.as_str() {
            Some(s) if s.chars().count() >= MIN_PASSWORD_LEN => Ok(s.to_owned()),
            _ => Err(CastError("password")),
        }
    }

    /// `"email"` or `"phone"`.
    ///
    /// # Errors
    ///
    /// Fails on any other value.
    pub fn login_method(value: &Value) -> Result<LoginMethod, CastError> {
        value
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or(CastError("login method"))
    }

    /// A short identifier.
    ///
    /// # Errors
    ///
    /// Fails on non-strings and malformed identifiers.
    pub fn short_id(value: &Value) -> Result<Uuid, CastError> {
        value
            .as_str()
            .and_then(|s| short_id::decode(s).ok())
            .ok_or(CastError("short id"))
    }
}

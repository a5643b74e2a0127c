//! Structured request errors.

use crate::catalog;
use serde_json::Value;
use std::fmt;

/// A client-facing failure: a catalog key plus positional template arguments.
///
/// Raised by validation, by the authentication guard and by handlers; caught
/// exactly once at the session middleware, where the catalog turns it into a
/// wire response.
///
/// # Examples
///
/// ```
/// use gatehouse_core::RequestError;
///
/// let err = RequestError::missing_header("Authorization");
/// assert_eq!(err.key(), "missing_header");
/// assert_eq!(err.to_string(), "missing_header(\"Authorization\")");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestError {
    key: String,
    args: Vec<Value>,
}

impl RequestError {
    /// Build an error from a key and arguments.
    #[must_use]
    pub fn new(key: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            args,
        }
    }

    /// Build an error that carries no arguments.
    #[must_use]
    pub fn bare(key: impl Into<String>) -> Self {
        Self::new(key, Vec::new())
    }

    /// Parse the message of an error raised inside the database.
    ///
    /// Stored procedures report domain errors as `"<key> <arg> <arg> ..."`. The
    /// message is split on whitespace: the first token is the key, the rest are
    /// string arguments. An argument containing a space cannot be represented
    /// and will be split. An empty message yields `server_exception`.
    ///
    /// # Examples
    ///
    /// ```
    /// use gatehouse_core::RequestError;
    /// use serde_json::json;
    ///
    /// let err = RequestError::from_raised("identity_exists a@b.com");
    /// assert_eq!(err.key(), "identity_exists");
    /// assert_eq!(err.args(), &[json!("a@b.com")]);
    /// ```
    #[must_use]
    pub fn from_raised(message: &str) -> Self {
        let mut tokens = message.split_whitespace();
        match tokens.next() {
            Some(key) => Self::new(key, tokens.map(|t| Value::String(t.to_owned())).collect()),
            None => Self::bare(catalog::SERVER_EXCEPTION),
        }
    }

    /// `missing_header(name)`
    #[must_use]
    pub fn missing_header(name: &str) -> Self {
        Self::new(catalog::MISSING_HEADER, vec![Value::from(name)])
    }

    /// `missing_key(key)`
    #[must_use]
    pub fn missing_key(key: &str) -> Self {
        Self::new(catalog::MISSING_KEY, vec![Value::from(key)])
    }

    /// `invalid_value(raw, key)`
    #[must_use]
    pub fn invalid_value(raw: Value, key: &str) -> Self {
        Self::new(catalog::INVALID_VALUE, vec![raw, Value::from(key)])
    }

    /// `invalid_user_id(raw)`
    #[must_use]
    pub fn invalid_user_id(raw: &str) -> Self {
        Self::new(catalog::INVALID_USER_ID, vec![Value::from(raw)])
    }

    /// `invalid_token(token)`
    #[must_use]
    pub fn invalid_token(token: &str) -> Self {
        Self::new(catalog::INVALID_TOKEN, vec![Value::from(token)])
    }

    /// `user_not_found`
    #[must_use]
    pub fn user_not_found() -> Self {
        Self::bare(catalog::USER_NOT_FOUND)
    }

    /// `no_body`
    #[must_use]
    pub fn no_body() -> Self {
        Self::bare(catalog::NO_BODY)
    }

    /// Catalog key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Positional template arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Decompose into key and arguments.
    #[must_use]
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.key, self.args)
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.key)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for RequestError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raised_message_split() {
        let err = RequestError::from_raised("invalid_value abc age");
        assert_eq!(err.key(), "invalid_value");
        assert_eq!(err.args(), &[json!("abc"), json!("age")]);
    }

    #[test]
    fn raised_message_collapses_runs_of_whitespace() {
        let err = RequestError::from_raised("  user_not_found  ");
        assert_eq!(err.key(), "user_not_found");
        assert!(err.args().is_empty());
    }

    #[test]
    fn raised_empty_message() {
        assert_eq!(RequestError::from_raised("").key(), catalog::SERVER_EXCEPTION);
    }

    #[test]
    fn display_lists_arguments() {
        let err = RequestError::invalid_value(json!(7), "age");
        assert_eq!(err.to_string(), "invalid_value(7, \"age\")");
    }
}

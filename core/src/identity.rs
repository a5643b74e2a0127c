//! Account identity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// A verified caller, produced by the authentication guard.
///
/// Passed by value into handlers; it owns nothing but its own data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Account identifier.
    pub user_id: Uuid,
    /// Session token the caller presented.
    pub token: String,
}

/// How an identity's identifier is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    /// Identifier is an email address.
    Email,
    /// Identifier is a phone number.
    Phone,
}

/// Error type for `LoginMethod` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown login method: {0}")]
pub struct ParseLoginMethodError(String);

impl LoginMethod {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }

    /// Check an identifier against this method's format.
    ///
    /// # Examples
    ///
    /// ```
    /// use gatehouse_core::LoginMethod;
    ///
    /// assert!(LoginMethod::Email.accepts("a@b.com"));
    /// assert!(!LoginMethod::Phone.accepts("a@b.com"));
    /// ```
    #[must_use]
    pub fn accepts(&self, identifier: &str) -> bool {
        match self {
            Self::Email => is_valid_email(identifier),
            Self::Phone => is_valid_phone(identifier),
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMethod {
    type Err = ParseLoginMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            other => Err(ParseLoginMethodError(other.to_string())),
        }
    }
}

/// Validate email address format.
///
/// Basic shape check: one `@`, non-empty local part, dotted domain with
/// non-empty labels, 3 to 255 characters.
///
/// # Examples
///
/// ```
/// use gatehouse_core::identity::is_valid_email;
///
/// assert!(is_valid_email("user+tag@subdomain.example.com"));
/// assert!(!is_valid_email("user@"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 255 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    if !domain.contains('.') {
        return false;
    }

    let valid_local = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_');
    let valid_domain = |c: char| c.is_alphanumeric() || matches!(c, '.' | '-');

    local.chars().all(valid_local)
        && domain.chars().all(valid_domain)
        && domain.split('.').all(|label| !label.is_empty())
}

/// Validate an E.164 phone number: `+` followed by 8 to 15 digits.
///
/// # Examples
///
/// ```
/// use gatehouse_core::identity::is_valid_phone;
///
/// assert!(is_valid_phone("+14155550123"));
/// assert!(!is_valid_phone("4155550123"));
/// ```
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    let Some(digits) = phone.strip_prefix('+') else {
        return false;
    };
    (8..=15).contains(&digits.len())
        && !digits.starts_with('0')
        && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_method_parse() {
        assert_eq!("email".parse::<LoginMethod>(), Ok(LoginMethod::Email));
        assert_eq!("phone".parse::<LoginMethod>(), Ok(LoginMethod::Phone));
        assert!("EMAIL".parse::<LoginMethod>().is_err());
    }

    #[test]
    fn valid_emails() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("user.name@example.com"));
        assert!(is_valid_email("user-name@example.co.uk"));
        assert!(is_valid_email("a@b.c"));
    }

    #[test]
    fn invalid_emails() {
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("user@example."));
        assert!(!is_valid_email("user@example..com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email(&format!("{}@example.com", "a".repeat(250))));
    }

    #[test]
    fn phones() {
        assert!(is_valid_phone("+442071838750"));
        assert!(!is_valid_phone("+0123456789"));
        assert!(!is_valid_phone("+1234"));
        assert!(!is_valid_phone("+1415555O123"));
        assert!(!is_valid_phone("+1234567890123456"));
    }
}

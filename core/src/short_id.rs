//! Compact textual form of 128-bit identifiers.
//!
//! User identifiers travel in URLs and headers as URL-safe base64 without
//! padding: 16 bytes become 22 characters.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;
use uuid::Uuid;

/// Length of an encoded identifier.
pub const ENCODED_LEN: usize = 22;

/// Error returned when a string is not a valid short identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortIdError {
    /// Input has the wrong number of characters.
    #[error("Short id must be {ENCODED_LEN} characters, got {0}")]
    Length(usize),

    /// Input is not canonical URL-safe base64.
    #[error("Short id is not valid base64: {0}")]
    Encoding(String),
}

/// Encode an identifier.
///
/// # Examples
///
/// ```
/// use gatehouse_core::short_id;
/// use uuid::Uuid;
///
/// let id = Uuid::nil();
/// assert_eq!(short_id::encode(id), "AAAAAAAAAAAAAAAAAAAAAA");
/// ```
#[must_use]
pub fn encode(id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

/// Decode an identifier produced by [`encode`].
///
/// # Errors
///
/// Returns [`ShortIdError`] if the input has the wrong length, uses characters
/// outside the URL-safe alphabet, or has non-zero trailing bits.
pub fn decode(text: &str) -> Result<Uuid, ShortIdError> {
    if text.len() != ENCODED_LEN {
        return Err(ShortIdError::Length(text.len()));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| ShortIdError::Encoding(e.to_string()))?;

    let bytes: [u8; 16] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| ShortIdError::Length(v.len()))?;

    Ok(Uuid::from_bytes(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encoded_length() {
        assert_eq!(encode(Uuid::new_v4()).len(), ENCODED_LEN);
    }

    #[test]
    fn url_safe_alphabet() {
        let id = Uuid::from_bytes([0xfb; 16]);
        let text = encode(id);
        assert!(!text.contains('+'));
        assert!(!text.contains('/'));
        assert!(!text.contains('='));
        assert_eq!(decode(&text).unwrap(), id);
    }

    #[test]
    fn wrong_length() {
        assert_eq!(decode("abc"), Err(ShortIdError::Length(3)));
        assert_eq!(decode(""), Err(ShortIdError::Length(0)));
    }

    #[test]
    fn bad_alphabet() {
        let err = decode("AAAAAAAAAAAAAAAAAAAA+/").unwrap_err();
        assert!(matches!(err, ShortIdError::Encoding(_)));
    }

    #[test]
    fn non_canonical_trailing_bits() {
        // The last character carries 2 significant bits; 'B' sets a padding bit.
        let err = decode("AAAAAAAAAAAAAAAAAAAAAB").unwrap_err();
        assert!(matches!(err, ShortIdError::Encoding(_)));
    }

    proptest! {
        #[test]
        fn roundtrip(bytes in any::<[u8; 16]>()) {
            let id = Uuid::from_bytes(bytes);
            prop_assert_eq!(decode(&encode(id)).unwrap(), id);
        }

        #[test]
        fn decode_never_panics(text in "\\PC{0,40}") {
            let _ = decode(&text);
        }
    }
}

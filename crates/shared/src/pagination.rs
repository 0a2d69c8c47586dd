//! Cursor-based pagination utilities.
//!
//! Chats and messages are paged by message id. The id is the canonical
//! ordering key (a per-database monotonic BIGSERIAL), so the cursor carries
//! only the id — never a timestamp, which would be ambiguous under clock
//! skew.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

/// Error type for cursor operations.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("Invalid cursor format")]
    InvalidFormat,
    #[error("Invalid cursor encoding")]
    InvalidEncoding,
    #[error("Invalid ID in cursor")]
    InvalidId,
}

/// Encodes a message-id cursor.
///
/// The cursor format is: base64(id), URL-safe without padding.
pub fn encode_cursor(id: i64) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string().as_bytes())
}

/// Decodes a cursor back into a message id.
pub fn decode_cursor(cursor: &str) -> Result<i64, CursorError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| CursorError::InvalidEncoding)?;

    let s = String::from_utf8(decoded).map_err(|_| CursorError::InvalidFormat)?;

    s.parse().map_err(|_| CursorError::InvalidId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_cursor_roundtrip() {
        let cursor = encode_cursor(12345);
        assert_eq!(decode_cursor(&cursor).unwrap(), 12345);
    }

    #[test]
    fn test_decode_invalid_base64() {
        let result = decode_cursor("not-valid-base64!!!");
        assert!(matches!(result, Err(CursorError::InvalidEncoding)));
    }

    #[test]
    fn test_decode_non_numeric() {
        let invalid = URL_SAFE_NO_PAD.encode(b"not-a-number");
        let result = decode_cursor(&invalid);
        assert!(matches!(result, Err(CursorError::InvalidId)));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let invalid = URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0xfd]);
        let result = decode_cursor(&invalid);
        assert!(matches!(result, Err(CursorError::InvalidFormat)));
    }

    #[test]
    fn test_encode_large_id() {
        let cursor = encode_cursor(i64::MAX);
        assert_eq!(decode_cursor(&cursor).unwrap(), i64::MAX);
    }

    #[test]
    fn test_cursor_is_url_safe() {
        let cursor = encode_cursor(987654321);
        assert!(!cursor.contains('+'));
        assert!(!cursor.contains('/'));
        assert!(!cursor.contains('='));
    }
}

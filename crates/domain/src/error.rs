//! Domain error taxonomy.
//!
//! Every guard violation inside a controller raises one of these variants
//! before any mutation begins. The API layer maps them 1:1 to wire
//! responses (404 / 403 / 409 / 422 / 500).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Chat, match, ticket or user missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Role, ownership or self-certification guard failure.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Duplicate ticket for match, ticket already exists for chat.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Inactive match, invalid chat type or state for the requested
    /// operation.
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Storage-layer failure. Propagated unmodified; callers abort the
    /// transaction and surface a generic failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invariant violation, e.g. a referenced chat unexpectedly missing.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DomainError::NotFound(what.into())
    }

    pub fn forbidden(why: impl Into<String>) -> Self {
        DomainError::Forbidden(why.into())
    }

    pub fn conflict(why: impl Into<String>) -> Self {
        DomainError::Conflict(why.into())
    }

    pub fn unprocessable(why: impl Into<String>) -> Self {
        DomainError::Unprocessable(why.into())
    }

    pub fn internal(why: impl Into<String>) -> Self {
        DomainError::Internal(why.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", DomainError::not_found("chat 7")),
            "Not found: chat 7"
        );
        assert_eq!(
            format!("{}", DomainError::forbidden("not your ticket")),
            "Forbidden: not your ticket"
        );
        assert_eq!(
            format!("{}", DomainError::conflict("ticket already exists")),
            "Conflict: ticket already exists"
        );
        assert_eq!(
            format!("{}", DomainError::unprocessable("match is not active")),
            "Unprocessable: match is not active"
        );
    }
}

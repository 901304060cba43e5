//! Error Types
//!
//! Two layers:
//!
//! - `StoreError`: what a `DocumentStore` reports. Only `Transport` is
//!   transient and therefore eligible for retry.
//! - `DocumentError`: what the mapping layer reports to callers. Validation
//!   and configuration problems are raised before any remote call is made.

use crate::field::FieldError;
use std::fmt;

/// Error reported by a document store backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection/timeout class failure; retried per policy
    Transport(String),
    /// Index, type or document does not exist
    NotFound(String),
    /// Logical conflict (version mismatch, incompatible mapping)
    Conflict(String),
    /// Request rejected by the store for any other reason
    Rejected(String),
}

impl StoreError {
    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Transport(msg) => write!(f, "transport error: {}", msg),
            StoreError::NotFound(what) => write!(f, "not found: {}", what),
            StoreError::Conflict(msg) => write!(f, "conflict: {}", msg),
            StoreError::Rejected(msg) => write!(f, "rejected by store: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Aggregated field validation failures for one document
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    errors: Vec<(String, FieldError)>,
}

impl ValidationError {
    pub fn new(errors: Vec<(String, FieldError)>) -> Self {
        ValidationError { errors }
    }

    /// Every failing field with its reason, in declaration order
    pub fn errors(&self) -> &[(String, FieldError)] {
        &self.errors
    }

    /// Names of the failing fields
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.iter().any(|(name, _)| name == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(name, err)| format!("{} {}", name, err))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Error type for document, mapping and queue operations
#[derive(Debug)]
pub enum DocumentError {
    /// One or more field constraints failed
    Validation(ValidationError),
    /// Missing index, unknown connection alias, missing id
    Configuration(String),
    /// Save attempted on a read-only document type without `force`
    ReadOnly { doc_type: String },
    /// Error surfaced by the store (after retries, if transient)
    Store(StoreError),
    /// Wire body could not be (de)serialized
    Serialization(serde_json::Error),
}

impl DocumentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentError::Store(StoreError::NotFound(_)))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DocumentError::Store(StoreError::Conflict(_)))
    }
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::Validation(e) => write!(f, "validation failed: {}", e),
            DocumentError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            DocumentError::ReadOnly { doc_type } => {
                write!(f, "document type '{}' is read-only", doc_type)
            }
            DocumentError::Store(e) => write!(f, "{}", e),
            DocumentError::Serialization(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Validation(e) => Some(e),
            DocumentError::Store(e) => Some(e),
            DocumentError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for DocumentError {
    fn from(e: StoreError) -> Self {
        DocumentError::Store(e)
    }
}

impl From<ValidationError> for DocumentError {
    fn from(e: ValidationError) -> Self {
        DocumentError::Validation(e)
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(e: serde_json::Error) -> Self {
        DocumentError::Serialization(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_transient() {
        assert!(StoreError::Transport("reset".into()).is_transient());
        assert!(!StoreError::NotFound("x".into()).is_transient());
        assert!(!StoreError::Conflict("x".into()).is_transient());
        assert!(!StoreError::Rejected("x".into()).is_transient());
    }

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = ValidationError::new(vec![
            ("title".to_string(), FieldError::Required),
            (
                "views".to_string(),
                FieldError::WrongType { expected: "integer" },
            ),
        ]);
        assert!(err.contains("title"));
        assert!(err.contains("views"));
        assert_eq!(
            err.to_string(),
            "title field is required; views field must be integer"
        );
    }
}

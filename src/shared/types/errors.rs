use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    /// Name of the offending field as it appears in the JSON payload
    pub field: String,
    /// Human readable reason
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity} not found with {field}: {value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Cannot resolve current user: {0}")]
    IdentityResolution(String),

    #[error("Temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn user_not_found(field: &'static str, value: impl ToString) -> Self {
        Self::NotFound {
            entity: "User",
            field,
            value: value.to_string(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn email_taken() -> Self {
        Self::invalid_field("email", "Email already exists")
    }

    /// Whether the operation may succeed if retried (timeouts, lost connections).
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Unavailable(_))
    }

    /// Field names carried by a validation error, empty for every other kind.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            DomainError::Validation(fields) => fields.iter().map(|f| f.field.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

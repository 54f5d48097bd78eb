use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::{NewUser, User};
use crate::shared::{DomainError, FieldError, PageRequest, PaginatedResult};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write collided with a unique index; carries the JSON field name.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(&'static str),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation("email") => DomainError::email_taken(),
            StoreError::UniqueViolation(field) => {
                DomainError::Validation(vec![FieldError::new(field, "Value already exists")])
            }
            StoreError::Timeout(after) => {
                DomainError::Unavailable(format!("user store did not answer within {after:?}"))
            }
            StoreError::Database(msg) => DomainError::Internal(msg),
        }
    }
}

/// Columns a user listing may be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSortField {
    Id,
    FullName,
    Email,
    Role,
    TokenVersion,
    CreatedAt,
    UpdatedAt,
}

impl UserSortField {
    /// Accepts the JSON property name or the column name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "id" => Some(Self::Id),
            "fullName" | "full_name" => Some(Self::FullName),
            "email" => Some(Self::Email),
            "role" => Some(Self::Role),
            "tokenVersion" | "token_version" => Some(Self::TokenVersion),
            "createdAt" | "created_at" => Some(Self::CreatedAt),
            "updatedAt" | "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }
}

/// Persistence port for users. Implementations must be safe for concurrent use.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn exists_by_email(&self, email: &str) -> StoreResult<bool>;

    async fn insert(&self, user: NewUser) -> StoreResult<User>;
    /// Persists every mutable column of `user`. `None` if the row no longer exists.
    async fn update(&self, user: User) -> StoreResult<Option<User>>;
    /// `false` if no row had that id.
    async fn delete_by_id(&self, id: i64) -> StoreResult<bool>;
    /// Atomically bumps the counter and returns its new value, `None` if the row is missing.
    async fn increment_token_version(&self, id: i64) -> StoreResult<Option<i32>>;

    async fn find_page(
        &self,
        request: &PageRequest<UserSortField>,
    ) -> StoreResult<PaginatedResult<User>>;
}

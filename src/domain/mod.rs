//! Domain layer
//!
//! The user aggregate, its commands and the storage port the
//! application layer talks to.

pub mod user;

pub use crate::shared::{DomainError, DomainResult, FieldError};
pub use user::*;

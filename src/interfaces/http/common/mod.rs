//! Shared extractors for HTTP handlers

pub mod extractors;
pub mod validated_json;

pub use extractors::{ApiPath, ApiQuery};
pub use validated_json::{validation_field_errors, ValidatedJson};

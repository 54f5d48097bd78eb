//! HTTP REST API interfaces
//!
//! - `middleware`: Request authorization (internal secret / bearer token)
//! - `modules`: Handlers and DTOs per resource
//! - `error`: The single mapping from errors to HTTP responses
//! - `router`: API router with Swagger documentation

pub mod common;
pub mod error;
pub mod middleware;
pub mod modules;
pub mod router;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use middleware::{AuthState, CurrentClaims, Principal};
pub use router::{create_api_router, ApiDoc, RouterConfig};

//! # User Service
//!
//! User account management for the platform: CRUD over user records for
//! authenticated end users, plus shared-secret endpoints the authentication
//! service uses for login lookups and token revocation.
//!
//! ## Architecture
//!
//! - **domain**: User aggregate, commands and the storage port
//! - **application**: User service and current-user resolution
//! - **infrastructure**: SeaORM store, password hashing, JWT/JWKS validation
//! - **interfaces**: REST API with Swagger documentation
//! - **shared**: Errors, pagination and shutdown plumbing

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

#[cfg(test)]
mod test_support;

pub use config::{default_config_path, AppConfig};
pub use infrastructure::{init_database, run_migrations, DatabaseConfig, SeaOrmUserStore};
pub use interfaces::http::create_api_router;

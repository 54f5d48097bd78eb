//! Infrastructure layer
//!
//! - `crypto`: password hashing, JWK set cache and bearer token validation
//! - `database`: SeaORM entities, migrations and the SQL-backed user store

pub mod crypto;
pub mod database;

pub use database::{init_database, run_migrations, DatabaseConfig, SeaOrmUserStore};

//! Health module: liveness/readiness probe

pub mod handlers;

pub use handlers::*;

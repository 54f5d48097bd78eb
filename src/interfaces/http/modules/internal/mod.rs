//! Internal module: endpoints called by the authentication service
//!
//! Reachable only with the shared internal secret; see the authorization
//! middleware.

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;

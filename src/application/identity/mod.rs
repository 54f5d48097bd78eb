//! Identity module: user management and current-user resolution
//!
//! Contains the `UserService` which orchestrates all user-related
//! use-cases, and the resolver that maps token claims to a user.

pub mod resolver;
pub mod service;

pub use resolver::{resolve_identity, IdentityResolutionError, ResolvedIdentity};
pub use service::UserService;

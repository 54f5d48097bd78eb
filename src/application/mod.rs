//! Application layer

pub mod identity;

pub use identity::{resolve_identity, ResolvedIdentity, UserService};

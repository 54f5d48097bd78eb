//! User aggregate
//!
//! Contains the User entity, command DTOs, and the store interface.

pub mod model;
pub mod repository;

mod dto_create;
mod dto_update;

pub use model::{normalize_email, NewUser, Role, User};

pub use dto_create::CreateUserDto;
pub use dto_update::UpdateUserDto;

pub use repository::{StoreError, StoreResult, UserSortField, UserStore};

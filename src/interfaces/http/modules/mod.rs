pub mod health;
pub mod internal;
pub mod request_id;
pub mod users;

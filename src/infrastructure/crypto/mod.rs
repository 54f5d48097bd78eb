pub mod jwks;
pub mod jwt;
pub mod password;

pub use jwks::{key_source_from_uri, JwksCache, JwksError, KeySource, RemoteKeySource, StaticKeySource};
pub use jwt::{InvalidTokenError, JwtConfig, TokenClaims, TokenError, TokenValidator};
pub use password::{hash_password, verify_password, PasswordHasher};

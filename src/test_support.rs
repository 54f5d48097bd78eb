//! Fixtures shared by the unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::domain::{NewUser, Role};
use crate::infrastructure::crypto::{
    JwksCache, JwksError, JwtConfig, KeySource, TokenValidator,
};
use crate::infrastructure::{init_database, run_migrations, DatabaseConfig, SeaOrmUserStore};

pub const SIGNING_KEY: &[u8] = include_bytes!("../tests/fixtures/signing_key.pem");
pub const ROTATED_SIGNING_KEY: &[u8] = include_bytes!("../tests/fixtures/rotated_signing_key.pem");

pub const TEST_ISSUER: &str = "https://auth.example.com";
pub const TEST_AUDIENCE: &str = "users-api";

pub fn primary_jwks() -> JwkSet {
    serde_json::from_str(include_str!("../tests/fixtures/jwks_primary.json")).unwrap()
}

/// Primary key plus the rotated one.
pub fn rotated_jwks() -> JwkSet {
    serde_json::from_str(include_str!("../tests/fixtures/jwks_rotated.json")).unwrap()
}

/// Key source whose contents can be swapped mid-test; counts fetches.
pub struct SwappableKeySource {
    current: Mutex<Result<JwkSet, JwksError>>,
    fetches: AtomicUsize,
}

impl SwappableKeySource {
    pub fn new(set: JwkSet) -> Self {
        Self {
            current: Mutex::new(Ok(set)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, set: JwkSet) {
        *self.current.lock().unwrap() = Ok(set);
    }

    pub fn fail_with(&self, err: JwksError) {
        *self.current.lock().unwrap() = Err(err);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for SwappableKeySource {
    async fn fetch(&self) -> Result<JwkSet, JwksError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.current.lock().unwrap().clone()
    }
}

pub fn validator_for(source: Arc<SwappableKeySource>) -> TokenValidator {
    let cache = JwksCache::new(source, Duration::from_secs(300), Duration::ZERO);
    TokenValidator::new(Arc::new(cache), JwtConfig::new(TEST_ISSUER, TEST_AUDIENCE))
}

/// Claims of a valid access token for user 42.
pub fn access_claims() -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": "42",
        "uid": 42,
        "email": "jane@example.com",
        "aud": [TEST_AUDIENCE],
        "iss": TEST_ISSUER,
        "iat": now,
        "exp": now + 300,
        "typ": "access",
    })
}

pub fn mint_token(claims: &Value) -> String {
    mint_token_with(SIGNING_KEY, Some("primary"), claims)
}

pub fn mint_token_with(pem: &[u8], kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

pub async fn memory_store() -> Arc<SeaOrmUserStore> {
    let config = DatabaseConfig::in_memory();
    let db = init_database(&config).await.unwrap();
    run_migrations(&db).await.unwrap();
    Arc::new(SeaOrmUserStore::new(db, config.query_timeout))
}

pub fn new_user(full_name: &str, email: &str) -> NewUser {
    NewUser {
        full_name: full_name.to_string(),
        email: email.to_string(),
        password_hash: "$2b$04$not-a-real-hash".to_string(),
        token_version: 0,
        role: Role::Employee,
    }
}

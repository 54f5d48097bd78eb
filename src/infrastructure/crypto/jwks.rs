//! JWK set retrieval and caching
//!
//! Signing keys are fetched from the identity provider's JWKS endpoint and
//! cached by `kid`. The cache refreshes when its TTL has elapsed and when a
//! token names a key it has not seen (key rotation). Refreshes are
//! single-flight and rate limited; if a refresh fails while keys are cached,
//! the stale keys keep serving.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Error)]
pub enum JwksError {
    #[error("failed to fetch JWK set: {0}")]
    Fetch(String),

    #[error("JWK set request timed out")]
    Timeout,

    #[error("failed to parse JWK set: {0}")]
    Parse(String),

    #[error("JWK set contains no usable signing keys")]
    NoValidKeys,

    #[error("no signing keys are available")]
    NoKeys,

    #[error("no key with kid '{0}' in JWK set")]
    KeyNotFound(String),
}

impl JwksError {
    /// True when the key set itself could not be obtained, as opposed to a
    /// token naming a key the provider does not publish.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, JwksError::KeyNotFound(_))
    }
}

/// Where the JWK set comes from.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, JwksError>;
}

/// Fetches the JWK set over HTTP.
pub struct RemoteKeySource {
    uri: String,
    client: reqwest::Client,
}

impl RemoteKeySource {
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Result<Self, JwksError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        Ok(Self {
            uri: uri.into(),
            client,
        })
    }
}

#[async_trait]
impl KeySource for RemoteKeySource {
    async fn fetch(&self) -> Result<JwkSet, JwksError> {
        debug!(uri = %self.uri, "Fetching JWK set");

        let response = self.client.get(&self.uri).send().await.map_err(|e| {
            if e.is_timeout() {
                JwksError::Timeout
            } else {
                JwksError::Fetch(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(JwksError::Fetch(format!("{} returned {}", self.uri, status)));
        }

        response.json::<JwkSet>().await.map_err(|e| {
            if e.is_timeout() {
                JwksError::Timeout
            } else {
                JwksError::Parse(e.to_string())
            }
        })
    }
}

/// A fixed key set, e.g. one mounted from a file.
#[derive(Clone)]
pub struct StaticKeySource {
    set: JwkSet,
}

impl StaticKeySource {
    pub fn new(set: JwkSet) -> Self {
        Self { set }
    }

    pub fn from_json(json: &str) -> Result<Self, JwksError> {
        serde_json::from_str(json)
            .map(Self::new)
            .map_err(|e| JwksError::Parse(e.to_string()))
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch(&self) -> Result<JwkSet, JwksError> {
        Ok(self.set.clone())
    }
}

/// Build a key source for `uri`: `file://` paths are read once from disk,
/// anything else is fetched over HTTP.
pub fn key_source_from_uri(uri: &str, timeout: Duration) -> Result<Arc<dyn KeySource>, JwksError> {
    match uri.strip_prefix("file://") {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| JwksError::Fetch(format!("{path}: {e}")))?;
            Ok(Arc::new(StaticKeySource::from_json(&json)?))
        }
        None => Ok(Arc::new(RemoteKeySource::new(uri, timeout)?)),
    }
}

#[derive(Clone)]
struct CachedKey {
    kid: Option<String>,
    key: DecodingKey,
}

#[derive(Default)]
struct CacheState {
    keys: Vec<CachedKey>,
    fetched_at: Option<Instant>,
    /// Outcome of the most recent fetch, cleared on success.
    last_error: Option<JwksError>,
}

#[derive(Debug, Clone, Copy)]
enum RefreshReason {
    Expired,
    UnknownKey,
}

/// Cached view of a [`KeySource`].
pub struct JwksCache {
    source: Arc<dyn KeySource>,
    ttl: Duration,
    min_refresh_interval: Duration,
    state: RwLock<CacheState>,
    /// Held for the duration of a refresh; stores the time of the last attempt.
    refresh_lock: Mutex<Option<Instant>>,
}

impl JwksCache {
    pub fn new(source: Arc<dyn KeySource>, ttl: Duration, min_refresh_interval: Duration) -> Self {
        Self {
            source,
            ttl,
            min_refresh_interval,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(None),
        }
    }

    /// Decoding keys for `kid`, or every cached key when the token has no kid.
    pub async fn keys_for(&self, kid: Option<&str>) -> Result<Vec<DecodingKey>, JwksError> {
        if self.is_expired().await {
            if let Err(e) = self.refresh(RefreshReason::Expired).await {
                if !self.has_keys().await {
                    return Err(e);
                }
                warn!(error = %e, "JWK set refresh failed, serving cached keys");
            }
        }

        let found = self.lookup(kid).await;
        if !found.is_empty() {
            return Ok(found);
        }

        // Unknown kid: the provider may have rotated its keys.
        self.refresh(RefreshReason::UnknownKey).await?;

        let found = self.lookup(kid).await;
        if !found.is_empty() {
            return Ok(found);
        }

        let state = self.state.read().await;
        if state.keys.is_empty() {
            // Nothing loaded yet; a rate-limited retry must not turn an
            // outage into an unknown key.
            return Err(state.last_error.clone().unwrap_or(JwksError::NoKeys));
        }
        Err(match kid {
            Some(kid) => JwksError::KeyNotFound(kid.to_string()),
            None => JwksError::NoKeys,
        })
    }

    /// Refetch the key set unless a fetch was attempted within the minimum
    /// refresh interval. Returns whether a new key set was loaded.
    pub async fn force_refresh(&self) -> Result<bool, JwksError> {
        self.refresh(RefreshReason::UnknownKey).await
    }

    async fn refresh(&self, reason: RefreshReason) -> Result<bool, JwksError> {
        let mut last_attempt = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited for the lock.
        if let RefreshReason::Expired = reason {
            if !self.is_expired().await {
                return Ok(false);
            }
        }
        if let Some(at) = *last_attempt {
            if at.elapsed() < self.min_refresh_interval {
                debug!(?reason, "JWK set refresh skipped, attempted recently");
                return Ok(false);
            }
        }
        *last_attempt = Some(Instant::now());

        let fetched = match self.source.fetch().await {
            Ok(set) => {
                let keys = decode_key_set(&set);
                if keys.is_empty() {
                    Err(JwksError::NoValidKeys)
                } else {
                    Ok(keys)
                }
            }
            Err(e) => Err(e),
        };

        let mut state = self.state.write().await;
        match fetched {
            Ok(keys) => {
                info!(?reason, keys = keys.len(), "JWK set refreshed");
                state.keys = keys;
                state.fetched_at = Some(Instant::now());
                state.last_error = None;
                Ok(true)
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn is_expired(&self) -> bool {
        match self.state.read().await.fetched_at {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        }
    }

    async fn has_keys(&self) -> bool {
        !self.state.read().await.keys.is_empty()
    }

    async fn lookup(&self, kid: Option<&str>) -> Vec<DecodingKey> {
        let state = self.state.read().await;
        state
            .keys
            .iter()
            .filter(|cached| kid.is_none() || cached.kid.as_deref() == kid)
            .map(|cached| cached.key.clone())
            .collect()
    }
}

fn decode_key_set(set: &JwkSet) -> Vec<CachedKey> {
    set.keys
        .iter()
        .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
        .filter_map(|jwk| match DecodingKey::from_jwk(jwk) {
            Ok(key) => Some(CachedKey {
                kid: jwk.common.key_id.clone(),
                key,
            }),
            Err(e) => {
                warn!(kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                None
            }
        })
        .collect()
}

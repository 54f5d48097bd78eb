//! Bearer token validation
//!
//! Tokens are verified against the cached JWK set and then run through an
//! ordered chain of claim checks. The first failing check decides the error.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use super::jwks::{JwksCache, JwksError};

/// OAuth2 bearer error code for every token rejection.
pub const INVALID_TOKEN: &str = "invalid_token";

pub const ACCESS_TOKEN_TYPE: &str = "access";

pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub clock_skew: Duration,
    pub token_type: String,
}

impl JwtConfig {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        }
    }

    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default, deserialize_with = "lenient_user_id")]
    pub uid: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub typ: Option<String>,
}

/// `uid` is a number, but some issuers emit it as a string.
fn lenient_user_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(id)) => Some(id),
        Some(Raw::Text(text)) => text.trim().parse().ok(),
        Some(Raw::Other(_)) | None => None,
    })
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::One(aud)) => vec![aud],
        Some(Raw::Many(auds)) => auds,
        None => Vec::new(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description}")]
pub struct InvalidTokenError {
    pub code: &'static str,
    pub description: String,
}

impl InvalidTokenError {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            code: INVALID_TOKEN,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error(transparent)]
    Invalid(#[from] InvalidTokenError),

    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(JwksError),
}

impl From<JwksError> for TokenError {
    fn from(err: JwksError) -> Self {
        if err.is_unavailable() {
            TokenError::KeysUnavailable(err)
        } else {
            TokenError::Invalid(InvalidTokenError::new(err.to_string()))
        }
    }
}

/// A single post-signature check on the token claims.
trait ClaimsCheck: Send + Sync + fmt::Debug {
    fn check(&self, claims: &TokenClaims, now: i64) -> Result<(), InvalidTokenError>;
}

#[derive(Debug)]
struct TimestampCheck {
    skew: i64,
}

impl ClaimsCheck for TimestampCheck {
    fn check(&self, claims: &TokenClaims, now: i64) -> Result<(), InvalidTokenError> {
        let exp = claims
            .exp
            .ok_or_else(|| InvalidTokenError::new("Token has no expiry"))?;
        if now - self.skew > exp {
            return Err(InvalidTokenError::new(format!(
                "Token expired at {}",
                format_timestamp(exp)
            )));
        }

        if let Some(nbf) = claims.nbf {
            if now + self.skew < nbf {
                return Err(InvalidTokenError::new(format!(
                    "Token used before {}",
                    format_timestamp(nbf)
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct IssuerCheck {
    issuer: String,
}

impl ClaimsCheck for IssuerCheck {
    fn check(&self, claims: &TokenClaims, _now: i64) -> Result<(), InvalidTokenError> {
        match claims.iss.as_deref() {
            Some(iss) if iss == self.issuer => Ok(()),
            _ => Err(InvalidTokenError::new("The iss claim is not valid")),
        }
    }
}

#[derive(Debug)]
struct AudienceCheck {
    audience: String,
}

impl ClaimsCheck for AudienceCheck {
    fn check(&self, claims: &TokenClaims, _now: i64) -> Result<(), InvalidTokenError> {
        if claims.aud.iter().any(|aud| *aud == self.audience) {
            Ok(())
        } else {
            Err(InvalidTokenError::new("Invalid audience"))
        }
    }
}

#[derive(Debug)]
struct TokenTypeCheck {
    expected: String,
}

impl ClaimsCheck for TokenTypeCheck {
    fn check(&self, claims: &TokenClaims, _now: i64) -> Result<(), InvalidTokenError> {
        if claims.typ.as_deref() == Some(self.expected.as_str()) {
            Ok(())
        } else {
            Err(InvalidTokenError::new(format!(
                "Token typ must be '{}'",
                self.expected
            )))
        }
    }
}

fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Signature only; claim checks run afterwards in a fixed order.
fn signature_validation(alg: Algorithm) -> Validation {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation
}

fn decode_error(err: &JwtError) -> InvalidTokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => InvalidTokenError::new("Signature verification failed"),
        ErrorKind::Json(_) => InvalidTokenError::new("Malformed token claims"),
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
            InvalidTokenError::new("Malformed token")
        }
        _ => InvalidTokenError::new(format!("Invalid token: {err}")),
    }
}

/// Validates bearer tokens against the cached JWK set and the configured
/// issuer, audience and token type.
#[derive(Clone)]
pub struct TokenValidator {
    keys: Arc<JwksCache>,
    checks: Arc<Vec<Box<dyn ClaimsCheck>>>,
}

impl TokenValidator {
    pub fn new(keys: Arc<JwksCache>, config: JwtConfig) -> Self {
        let skew = i64::try_from(config.clock_skew.as_secs()).unwrap_or(i64::MAX / 2);
        let checks: Vec<Box<dyn ClaimsCheck>> = vec![
            Box::new(TimestampCheck { skew }),
            Box::new(IssuerCheck {
                issuer: config.issuer,
            }),
            Box::new(AudienceCheck {
                audience: config.audience,
            }),
            Box::new(TokenTypeCheck {
                expected: config.token_type,
            }),
        ];

        Self {
            keys,
            checks: Arc::new(checks),
        }
    }

    pub async fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let header =
            decode_header(token).map_err(|_| InvalidTokenError::new("Malformed token"))?;

        if !is_asymmetric(header.alg) {
            return Err(InvalidTokenError::new(format!(
                "Unsupported signing algorithm {:?}",
                header.alg
            ))
            .into());
        }

        let claims = self.verify_signature(token, &header).await?;

        let now = Utc::now().timestamp();
        for check in self.checks.iter() {
            if let Err(e) = check.check(&claims, now) {
                debug!(check = ?check, reason = %e, "Token claims rejected");
                return Err(e.into());
            }
        }

        Ok(claims)
    }

    async fn verify_signature(&self, token: &str, header: &Header) -> Result<TokenClaims, TokenError> {
        let kid = header.kid.as_deref();
        let validation = signature_validation(header.alg);
        let keys = self.keys.keys_for(kid).await?;

        match try_keys(token, &keys, &validation) {
            Ok(claims) => Ok(claims),
            // Without a kid a rotated key only shows up as a bad signature.
            Err(e) if kid.is_none() && matches!(e.kind(), ErrorKind::InvalidSignature) => {
                if self.keys.force_refresh().await? {
                    let keys = self.keys.keys_for(None).await?;
                    try_keys(token, &keys, &validation).map_err(|e| decode_error(&e).into())
                } else {
                    Err(decode_error(&e).into())
                }
            }
            Err(e) => Err(decode_error(&e).into()),
        }
    }
}

fn try_keys(token: &str, keys: &[DecodingKey], validation: &Validation) -> Result<TokenClaims, JwtError> {
    let mut last_error = JwtError::from(ErrorKind::InvalidSignature);
    for key in keys {
        match decode::<TokenClaims>(token, key, validation) {
            Ok(data) => return Ok(data.claims),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

//! Maps validated token claims to the local user they identify

use thiserror::Error;
use tracing::debug;

use crate::infrastructure::crypto::TokenClaims;

/// How the current user is looked up in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIdentity {
    UserId(i64),
    Email(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("token carries no usable user identifier (uid, numeric sub or email)")]
pub struct IdentityResolutionError;

/// Resolve the user a token speaks for. First match wins:
///
/// 1. `uid`
/// 2. `sub` made of ASCII digits that parses as a positive `i64`
/// 3. a non-blank `email`
/// 4. `sub` containing `@`
pub fn resolve_identity(claims: &TokenClaims) -> Result<ResolvedIdentity, IdentityResolutionError> {
    if let Some(uid) = claims.uid {
        return Ok(ResolvedIdentity::UserId(uid));
    }

    let sub = claims.sub.as_deref().map(str::trim).unwrap_or_default();

    if !sub.is_empty() && sub.bytes().all(|b| b.is_ascii_digit()) {
        match sub.parse::<i64>() {
            Ok(id) if id > 0 => return Ok(ResolvedIdentity::UserId(id)),
            Ok(_) => debug!(sub, "Numeric sub is not a positive id, trying other claims"),
            Err(e) => debug!(sub, error = %e, "Numeric sub does not fit an id, trying other claims"),
        }
    }

    if let Some(email) = claims.email.as_deref().map(str::trim) {
        if !email.is_empty() {
            return Ok(ResolvedIdentity::Email(email.to_string()));
        }
    }

    if sub.contains('@') {
        return Ok(ResolvedIdentity::Email(sub.to_string()));
    }

    Err(IdentityResolutionError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> TokenClaims {
        TokenClaims::default()
    }

    #[test]
    fn uid_wins_over_everything() {
        let claims = TokenClaims {
            uid: Some(7),
            sub: Some("99".into()),
            email: Some("jane@example.com".into()),
            ..claims()
        };
        assert_eq!(resolve_identity(&claims), Ok(ResolvedIdentity::UserId(7)));
    }

    #[test]
    fn numeric_sub_is_an_id() {
        let claims = TokenClaims {
            sub: Some("123".into()),
            email: Some("jane@example.com".into()),
            ..claims()
        };
        assert_eq!(resolve_identity(&claims), Ok(ResolvedIdentity::UserId(123)));
    }

    #[test]
    fn overflowing_or_zero_sub_falls_through_to_email() {
        for sub in ["99999999999999999999", "0"] {
            let claims = TokenClaims {
                sub: Some(sub.into()),
                email: Some("jane@example.com".into()),
                ..claims()
            };
            assert_eq!(
                resolve_identity(&claims),
                Ok(ResolvedIdentity::Email("jane@example.com".into()))
            );
        }
    }

    #[test]
    fn signed_sub_is_not_numeric() {
        let claims = TokenClaims {
            sub: Some("-5".into()),
            ..claims()
        };
        assert_eq!(resolve_identity(&claims), Err(IdentityResolutionError));
    }

    #[test]
    fn email_claim_only() {
        let claims = TokenClaims {
            email: Some("jane@example.com".into()),
            ..claims()
        };
        assert_eq!(
            resolve_identity(&claims),
            Ok(ResolvedIdentity::Email("jane@example.com".into()))
        );
    }

    #[test]
    fn blank_email_is_ignored() {
        let claims = TokenClaims {
            email: Some("   ".into()),
            sub: Some("jane@example.com".into()),
            ..claims()
        };
        assert_eq!(
            resolve_identity(&claims),
            Ok(ResolvedIdentity::Email("jane@example.com".into()))
        );
    }

    #[test]
    fn nothing_usable_fails() {
        let claims = TokenClaims {
            sub: Some("service-account".into()),
            ..claims()
        };
        assert_eq!(resolve_identity(&claims), Err(IdentityResolutionError));
        assert_eq!(resolve_identity(&TokenClaims::default()), Err(IdentityResolutionError));
    }
}

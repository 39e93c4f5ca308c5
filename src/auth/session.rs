//! Access and refresh session tokens.
//!
//! Both tokens are HS256 JWTs that carry only the account id and a kind
//! discriminator. They prove that the id authenticated recently, nothing
//! more: ban, verification and team state are always re-read from storage.
//!
//! Rotation is stateless. A redeemed refresh token stays valid until its own
//! expiry; there is no server-side revocation list.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::AuthConfig;
use crate::domain::AccountId;
use crate::errors::{AuthErrorType, HackathonError, Result};
use crate::observability::metrics;

/// Which of the pair a token is. Stops a refresh token from being replayed as
/// an access token and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenKind,
}

/// Freshly minted access and refresh tokens.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

pub struct SessionTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionTokenIssuer {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            Duration::seconds(config.access_token_ttl_seconds as i64),
            Duration::seconds(config.refresh_token_ttl_seconds as i64),
        )
    }

    fn sign(
        &self,
        account_id: &AccountId,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>)> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expires_at = now + ttl;
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            typ: kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| HackathonError::internal(format!("Failed to sign session token: {}", e)))?;
        Ok((token, expires_at))
    }

    /// Mint both tokens for `account_id` with the same issue time.
    pub fn issue_pair(&self, account_id: &AccountId) -> Result<TokenPair> {
        let now = Utc::now();
        let (access_token, access_expires_at) = self.sign(account_id, TokenKind::Access, now)?;
        let (refresh_token, refresh_expires_at) = self.sign(account_id, TokenKind::Refresh, now)?;

        Ok(TokenPair { access_token, access_expires_at, refresh_token, refresh_expires_at })
    }

    fn validate(&self, token: &str, expected: TokenKind) -> Result<AccountId> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;
        if claims.typ != expected {
            return Err(HackathonError::auth("Invalid or expired token", AuthErrorType::InvalidToken));
        }
        Ok(AccountId::from_string(claims.sub))
    }

    /// Resolve the account id behind an access token.
    pub fn validate_access(&self, token: &str) -> Result<AccountId> {
        self.validate(token, TokenKind::Access)
    }

    pub fn validate_refresh(&self, token: &str) -> Result<AccountId> {
        self.validate(token, TokenKind::Refresh)
    }

    /// Redeem a refresh token for a new pair.
    ///
    /// A missing token asks the caller to log in again; a bad or expired one
    /// gets the generic invalid-token error.
    #[instrument(skip_all)]
    pub fn rotate(&self, refresh_token: Option<&str>) -> Result<(AccountId, TokenPair)> {
        let Some(token) = refresh_token.filter(|t| !t.is_empty()) else {
            metrics::record_token_refresh("missing");
            return Err(HackathonError::auth("Please log in again", AuthErrorType::MissingToken));
        };

        let account_id = self.validate_refresh(token).inspect_err(|e| {
            warn!(error = %e, "Refresh token rejected");
            metrics::record_token_refresh("invalid");
        })?;

        let pair = self.issue_pair(&account_id)?;
        metrics::record_token_refresh("success");
        debug!(account_id = %account_id, "Session tokens rotated");
        Ok((account_id, pair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"an-adequately-long-test-signing-secret";

    fn issuer() -> SessionTokenIssuer {
        SessionTokenIssuer::new(SECRET, Duration::seconds(3600), Duration::seconds(7200))
    }

    #[test]
    fn pair_round_trips_account_id() {
        let id = AccountId::new();
        let pair = issuer().issue_pair(&id).unwrap();

        assert_eq!(issuer().validate_access(&pair.access_token).unwrap(), id);
        assert_eq!(issuer().validate_refresh(&pair.refresh_token).unwrap(), id);
        assert!(pair.refresh_expires_at > pair.access_expires_at);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let pair = issuer().issue_pair(&AccountId::new()).unwrap();
        assert!(issuer().validate_access(&pair.refresh_token).is_err());
        assert!(issuer().validate_refresh(&pair.access_token).is_err());
    }

    #[test]
    fn claims_carry_only_identity() {
        let pair = issuer().issue_pair(&AccountId::new()).unwrap();
        let decoded = decode::<serde_json::Value>(
            &pair.access_token,
            &DecodingKey::from_secret(SECRET),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;

        let mut keys: Vec<_> = decoded.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["exp", "iat", "sub", "typ"]);
    }

    #[test]
    fn expired_refresh_does_not_rotate() {
        let expired = SessionTokenIssuer::new(SECRET, Duration::seconds(-120), Duration::seconds(-60));
        let pair = expired.issue_pair(&AccountId::new()).unwrap();

        let err = issuer().rotate(Some(&pair.refresh_token)).unwrap_err();
        assert!(matches!(err, HackathonError::Auth { error_type: AuthErrorType::InvalidToken, .. }));
    }

    #[test]
    fn missing_refresh_asks_for_login() {
        let err = issuer().rotate(None).unwrap_err();
        assert!(matches!(err, HackathonError::Auth { error_type: AuthErrorType::MissingToken, .. }));
        assert!(err.to_string().contains("Please log in again"));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let other = SessionTokenIssuer::new(
            b"a-different-secret-of-sufficient-size",
            Duration::seconds(60),
            Duration::seconds(120),
        );
        let pair = other.issue_pair(&AccountId::new()).unwrap();

        let bad_sig = issuer().validate_access(&pair.access_token).unwrap_err();
        let expired = SessionTokenIssuer::new(SECRET, Duration::seconds(-120), Duration::seconds(-60))
            .issue_pair(&AccountId::new())
            .unwrap();
        let bad_exp = issuer().validate_access(&expired.access_token).unwrap_err();
        assert_eq!(bad_sig.to_string(), bad_exp.to_string());
    }

    #[test]
    fn rotation_returns_same_account() {
        let id = AccountId::new();
        let pair = issuer().issue_pair(&id).unwrap();
        let (rotated_id, rotated) = issuer().rotate(Some(&pair.refresh_token)).unwrap();
        assert_eq!(rotated_id, id);
        assert_eq!(issuer().validate_access(&rotated.access_token).unwrap(), id);
    }
}

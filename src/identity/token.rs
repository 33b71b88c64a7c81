use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use super::claims::{Claims, IssuedToken};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

const ALG: &str = "HS256";

/// Issues and verifies HS256 tokens under one process-wide secret.
///
/// Tokens are compact JWTs (`header.claims.signature`, base64url without padding).
/// There is no revocation list and no refresh: a token stays valid until its
/// `exp`, and only tokens signed with the current secret verify.
#[derive(Clone)]
pub struct TokenService {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").field("secret", &"<redacted>").finish()
    }
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self { Self { secret: secret.into() } }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| TokenError::Encoding(e.to_string()))
    }

    pub fn issue(&self, login: &str, ttl: chrono::Duration) -> Result<IssuedToken, TokenError> {
        self.issue_at(login, ttl, Utc::now())
    }

    pub fn issue_at(&self, login: &str, ttl: chrono::Duration, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Encoding(format!("expiry overflows for ttl {}", ttl)))?;
        let claims = Claims { login: login.to_string(), exp: expires_at.timestamp() };
        let header = Header { alg: ALG.to_string(), typ: "JWT".to_string() };
        let header_json = serde_json::to_vec(&header).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let claims_json = serde_json::to_vec(&claims).map_err(|e| TokenError::Encoding(e.to_string()))?;
        let signing_input = format!("{}.{}", URL_SAFE_NO_PAD.encode(header_json), URL_SAFE_NO_PAD.encode(claims_json));
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        let token = format!("{}.{}", signing_input, sig);
        debug!(target: "auth", login = %login, exp = claims.exp, "token.issue");
        Ok(IssuedToken { token, login: claims.login, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(h), Some(c), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
            return Err(TokenError::Malformed);
        };
        let sig = URL_SAFE_NO_PAD.decode(s).map_err(|_| TokenError::Malformed)?;

        // Signature first; nothing in an unauthenticated payload is trusted.
        let mut mac = self.mac()?;
        mac.update(h.as_bytes());
        mac.update(b".");
        mac.update(c.as_bytes());
        mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)?;

        let header: Header = URL_SAFE_NO_PAD
            .decode(h)
            .ok()
            .and_then(|b| serde_json::from_slice(&b).ok())
            .ok_or(TokenError::Malformed)?;
        if header.alg != ALG { return Err(TokenError::Malformed); }
        let claims: Claims = URL_SAFE_NO_PAD
            .decode(c)
            .ok()
            .and_then(|b| serde_json::from_slice(&b).ok())
            .ok_or(TokenError::Malformed)?;
        if claims.is_expired_at(now) { return Err(TokenError::Expired); }
        Ok(claims)
    }
}

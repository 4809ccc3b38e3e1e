//! Token claims and the issued pair handed back to clients.
//!
//! A token moves through one lifecycle: issued, active until `exp`, then
//! expired, unless its `jti` lands in the revocation store first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which half of the pair a token is. Verification requires the kind it
/// expects, so a refresh token can never pass as an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed claims payload, shared by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Role name at issue time.
    pub role: String,
    /// Flattened `action:resource:scope` grants at issue time.
    pub permissions: Vec<String>,
    /// Key-rotation epoch; tokens from an older epoch are rejected.
    pub token_version: u32,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: String,
    /// JWT ID (for revocation).
    pub jti: String,
    /// Access or refresh.
    pub kind: TokenKind,
}

impl TokenClaims {
    pub fn user_id(&self) -> Result<Uuid, uuid::Error> {
        Uuid::parse_str(&self.sub)
    }

    /// Seconds of validity left, clamped at zero. Used as the TTL when the
    /// token's `jti` is written to the revocation store.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.exp - now.timestamp()).max(0)
    }
}

/// Access/refresh pair returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPair {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

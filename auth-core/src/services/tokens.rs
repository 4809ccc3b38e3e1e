//! Token issuance and verification.
//!
//! Issues HS256-signed access/refresh pairs and verifies them: signature,
//! issuer, audience, expiry with leeway, token-version epoch, then the
//! revocation store behind the circuit breaker. Any trouble reaching the
//! revocation store rejects the token rather than letting it pass.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use service_core::breaker::CircuitBreaker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store_unavailable;
use crate::config::TokenConfig;
use crate::error::AuthError;
use crate::models::{Permission, TokenClaims, TokenKind, TokenPair, User};
use crate::store::RevocationStore;

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: TokenConfig,
    revocations: Arc<dyn RevocationStore>,
    breaker: Arc<CircuitBreaker>,
}

impl TokenService {
    pub fn new(
        config: TokenConfig,
        revocations: Arc<dyn RevocationStore>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        info!("Token service initialized with HS256 signing");

        Self {
            encoding_key,
            decoding_key,
            config,
            revocations,
            breaker,
        }
    }

    /// Issue an access/refresh pair carrying the user's role and flattened
    /// grants as they are right now.
    pub fn issue(&self, user: &User, permissions: &[Permission]) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access = self.sign(user, permissions, TokenKind::Access, now)?;
        let refresh = self.sign(user, permissions, TokenKind::Refresh, now)?;
        Ok(TokenPair::new(access, refresh, self.access_expiry_seconds()))
    }

    pub fn access_expiry_seconds(&self) -> i64 {
        self.config.access_expiry_minutes * 60
    }

    /// Verify a token of the expected kind and return its claims.
    pub async fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.leeway = self.config.leeway_seconds;

        let decoded =
            decode::<TokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    _ => {
                        debug!(error = %e, "Token failed validation");
                        AuthError::TokenInvalid
                    }
                }
            })?;
        let claims = decoded.claims;

        if claims.kind != expected {
            debug!(expected = ?expected, got = ?claims.kind, "Token kind mismatch");
            return Err(AuthError::TokenInvalid);
        }

        if claims.token_version != self.config.version {
            warn!(
                token_version = claims.token_version,
                current_version = self.config.version,
                "Token from a rotated epoch rejected"
            );
            return Err(AuthError::TokenInvalid);
        }

        if self.config.revocation_check && self.is_revoked(&claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Write the token's `jti` to the revocation store for its remaining
    /// lifetime. A no-op when revocation checking is disabled or the token
    /// has already expired on its own.
    pub async fn revoke(&self, claims: &TokenClaims) -> Result<(), AuthError> {
        if !self.config.revocation_check {
            debug!("Revocation checking disabled; skipping write");
            return Ok(());
        }

        let ttl = claims.remaining_seconds(Utc::now());
        if ttl == 0 {
            return Ok(());
        }

        let store = self.revocations.clone();
        let jti = claims.jti.clone();
        self.breaker
            .call("revocation_write", move || async move {
                store.revoke(&jti, ttl).await
            })
            .await
            .map_err(|err| store_unavailable("revocation_write", err))?;

        info!(jti = %claims.jti, "Token revoked");
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, AuthError> {
        let store = self.revocations.clone();
        let owned = jti.to_string();
        self.breaker
            .call("revocation_check", move || async move {
                store.is_revoked(&owned).await
            })
            .await
            .map_err(|err| store_unavailable("revocation_check", err))
    }

    fn sign(
        &self,
        user: &User,
        permissions: &[Permission],
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let ttl = match kind {
            TokenKind::Access => Duration::minutes(self.config.access_expiry_minutes),
            TokenKind::Refresh => Duration::days(self.config.refresh_expiry_days),
        };

        let claims = TokenClaims {
            sub: user.user_id.to_string(),
            role: user.role.clone(),
            permissions: permissions.iter().map(|p| p.flatten()).collect(),
            token_version: self.config.version,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            kind,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, Scope};
    use crate::store::memory::InMemoryRevocationStore;
    use service_core::breaker::BreakerConfig;

    fn test_config() -> TokenConfig {
        TokenConfig {
            secret: "unit-test-signing-secret-0123456789abcdef".to_string(),
            issuer: "taskhive-auth".to_string(),
            audience: "taskhive-api".to_string(),
            access_expiry_minutes: 15,
            refresh_expiry_days: 7,
            version: 1,
            leeway_seconds: 0,
            revocation_check: true,
        }
    }

    fn service_with(config: TokenConfig) -> TokenService {
        TokenService::new(
            config,
            Arc::new(InMemoryRevocationStore::new()),
            Arc::new(CircuitBreaker::new("revocation-store", BreakerConfig::default())),
        )
    }

    fn test_user() -> User {
        User::new("ada@example.com", "hash".to_string(), "member")
    }

    fn grants() -> Vec<Permission> {
        vec![
            Permission::new(Action::Read, "task", Scope::Team),
            Permission::new(Action::Manage, "project", Scope::Own),
        ]
    }

    #[tokio::test]
    async fn test_issue_and_verify_round_trip() {
        let svc = service_with(test_config());
        let user = test_user();

        let pair = svc.issue(&user, &grants()).unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 15 * 60);

        let claims = svc
            .verify(&pair.access_token, TokenKind::Access)
            .await
            .unwrap();
        assert_eq!(claims.sub, user.user_id.to_string());
        assert_eq!(claims.role, "member");
        assert_eq!(
            claims.permissions,
            vec!["read:task:team".to_string(), "manage:project:own".to_string()]
        );
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_access() {
        let svc = service_with(test_config());
        let pair = svc.issue(&test_user(), &grants()).unwrap();

        let outcome = svc.verify(&pair.refresh_token, TokenKind::Access).await;
        assert!(matches!(outcome, Err(AuthError::TokenInvalid)));

        // And it still verifies as what it is.
        assert!(svc.verify(&pair.refresh_token, TokenKind::Refresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let svc = service_with(test_config());
        let pair = svc.issue(&test_user(), &grants()).unwrap();

        let mut tampered = pair.access_token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        let outcome = svc.verify(&tampered, TokenKind::Access).await;
        assert!(matches!(outcome, Err(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_issuer_mismatch_rejected() {
        let svc = service_with(test_config());
        let pair = svc.issue(&test_user(), &grants()).unwrap();

        let mut other = test_config();
        other.issuer = "someone-else".to_string();
        let verifier = service_with(other);

        let outcome = verifier.verify(&pair.access_token, TokenKind::Access).await;
        assert!(matches!(outcome, Err(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_rotated_version_rejected() {
        let svc = service_with(test_config());
        let pair = svc.issue(&test_user(), &grants()).unwrap();

        let mut rotated = test_config();
        rotated.version = 2;
        let verifier = TokenService::new(
            rotated,
            Arc::new(InMemoryRevocationStore::new()),
            Arc::new(CircuitBreaker::new("revocation-store", BreakerConfig::default())),
        );

        let outcome = verifier.verify(&pair.access_token, TokenKind::Access).await;
        assert!(matches!(outcome, Err(AuthError::TokenInvalid)));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let config = test_config();
        let svc = service_with(config.clone());

        let past = Utc::now() - Duration::hours(2);
        let claims = TokenClaims {
            sub: Uuid::new_v4().to_string(),
            role: "member".to_string(),
            permissions: vec![],
            token_version: 1,
            iat: past.timestamp(),
            exp: (past + Duration::minutes(15)).timestamp(),
            iss: config.issuer.clone(),
            aud: config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            kind: TokenKind::Access,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        let outcome = svc.verify(&token, TokenKind::Access).await;
        assert!(matches!(outcome, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_revoked_token_rejected() {
        let svc = service_with(test_config());
        let pair = svc.issue(&test_user(), &grants()).unwrap();
        let claims = svc
            .verify(&pair.access_token, TokenKind::Access)
            .await
            .unwrap();

        svc.revoke(&claims).await.unwrap();

        let outcome = svc.verify(&pair.access_token, TokenKind::Access).await;
        assert!(matches!(outcome, Err(AuthError::TokenRevoked)));
    }
}

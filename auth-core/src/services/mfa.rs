//! MFA verification: TOTP provisioning and single-use backup codes.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{info, warn};

use crate::config::MfaConfig;
use crate::error::AuthError;
use crate::models::User;
use crate::store::UserStore;

/// URL-safe alphabet backup codes are drawn from.
const BACKUP_CODE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Provisioning payload returned once at setup time. The plaintext backup
/// codes exist only in this value; the store keeps digests.
#[derive(Debug, Clone)]
pub struct MfaSetup {
    /// Base32-encoded TOTP secret, for manual authenticator entry.
    pub secret: String,
    /// otpauth:// URL encoding secret, issuer, and account.
    pub otpauth_url: String,
    pub backup_codes: Vec<String>,
}

pub struct MfaService {
    users: Arc<dyn UserStore>,
    config: MfaConfig,
}

impl MfaService {
    pub fn new(users: Arc<dyn UserStore>, config: MfaConfig) -> Self {
        Self { users, config }
    }

    /// Provision TOTP for a user: fresh secret, fresh backup codes.
    ///
    /// MFA is enforced from the next login on; there is no confirmation
    /// round-trip. Running setup again replaces both secret and codes.
    pub async fn setup(&self, user: &User) -> Result<MfaSetup, AuthError> {
        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let backup_codes: Vec<String> = (0..self.config.backup_code_count)
            .map(|_| generate_backup_code(self.config.backup_code_length))
            .collect();
        let digests: Vec<String> = backup_codes.iter().map(|code| digest_code(code)).collect();

        let otpauth_url = self.totp_for(&secret_base32, &user.email)?.get_url();

        self.users
            .set_mfa(user.user_id, &secret_base32, &digests)
            .await?;
        info!(user_id = %user.user_id, "MFA enabled");

        Ok(MfaSetup {
            secret: secret_base32,
            otpauth_url,
            backup_codes,
        })
    }

    /// Verify a submitted code against the current clock. The TOTP path is
    /// tried first, then the single-use backup codes. Ok(false) means
    /// neither matched.
    pub async fn verify(&self, user: &User, code: &str) -> Result<bool, AuthError> {
        self.verify_at(user, code, Utc::now().timestamp() as u64)
            .await
    }

    /// Verification against an explicit Unix timestamp.
    pub async fn verify_at(
        &self,
        user: &User,
        code: &str,
        unix_time: u64,
    ) -> Result<bool, AuthError> {
        if !user.mfa_enabled {
            return Err(AuthError::MfaNotConfigured);
        }
        let secret = user
            .mfa_secret
            .as_deref()
            .ok_or(AuthError::MfaNotConfigured)?;

        let totp = self.totp_for(secret, &user.email)?;
        if totp.check(code, unix_time) {
            return Ok(true);
        }

        // The store consumes the digest atomically, so a replayed backup
        // code finds nothing on the second try.
        let consumed = self
            .users
            .consume_backup_code(user.user_id, &digest_code(code))
            .await?;
        if consumed {
            info!(user_id = %user.user_id, "Backup code consumed");
        }
        Ok(consumed)
    }

    /// Turn MFA off again. Requires one valid code, TOTP or backup.
    pub async fn disable(&self, user: &User, code: &str) -> Result<(), AuthError> {
        if !self.verify(user, code).await? {
            warn!(user_id = %user.user_id, "MFA disable rejected: invalid code");
            return Err(AuthError::MfaInvalid);
        }
        self.users.clear_mfa(user.user_id).await?;
        info!(user_id = %user.user_id, "MFA disabled");
        Ok(())
    }

    fn totp_for(&self, secret_base32: &str, account: &str) -> Result<TOTP, AuthError> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Invalid TOTP secret: {}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            self.config.digits,
            self.config.skew_steps,
            self.config.step_seconds,
            secret_bytes,
            Some(self.config.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| AuthError::Internal(anyhow::anyhow!("Failed to build TOTP: {}", e)))
    }
}

/// SHA-256 hex digest, the storage form of a backup code.
fn digest_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_backup_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..BACKUP_CODE_ALPHABET.len());
            BACKUP_CODE_ALPHABET[idx] as char
        })
        .collect()
}

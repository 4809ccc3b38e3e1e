//! Credential verification: complexity policy, reuse history, lockout.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::{LockoutPolicy, PasswordPolicy};
use crate::error::AuthError;
use crate::models::User;
use crate::store::UserStore;
use crate::utils::password::{hash_password, matches, Password, PasswordHashString};

pub struct CredentialService {
    users: Arc<dyn UserStore>,
    policy: PasswordPolicy,
    lockout: LockoutPolicy,
}

impl CredentialService {
    pub fn new(users: Arc<dyn UserStore>, policy: PasswordPolicy, lockout: LockoutPolicy) -> Self {
        Self {
            users,
            policy,
            lockout,
        }
    }

    /// Policy-check and hash a password for an account with no history yet.
    pub fn hash_new_password(&self, plaintext: &str) -> Result<String, AuthError> {
        self.check_complexity(plaintext)?;
        let hash = hash_password(&Password::new(plaintext.to_string()))?;
        Ok(hash.into_string())
    }

    /// Rotate a user's password: complexity gate, then the reuse gate
    /// against the stored history, then one write replacing hash and
    /// history together.
    pub async fn set_password(&self, user: &User, plaintext: &str) -> Result<(), AuthError> {
        self.check_complexity(plaintext)?;

        let candidate = Password::new(plaintext.to_string());
        for old_hash in user.password_history.iter().take(self.policy.history_depth) {
            if matches(&candidate, &PasswordHashString::new(old_hash.clone())) {
                warn!(user_id = %user.user_id, "Password change rejected: recent reuse");
                return Err(AuthError::PasswordReused);
            }
        }

        let new_hash = hash_password(&candidate)?.into_string();
        let mut history = Vec::with_capacity(self.policy.history_depth);
        history.push(new_hash.clone());
        history.extend(
            user.password_history
                .iter()
                .take(self.policy.history_depth - 1)
                .cloned(),
        );

        self.users
            .update_password(user.user_id, &new_hash, &history, Utc::now())
            .await?;
        info!(user_id = %user.user_id, "Password changed");
        Ok(())
    }

    /// Validate a login password under the lockout policy.
    ///
    /// The lockout window is checked before any hash comparison. A failed
    /// compare bumps the store-side counter; hitting the threshold locks
    /// the account and reports `AccountLocked` instead of
    /// `InvalidCredentials`. Success clears counter and lockout.
    pub async fn validate_password(&self, user: &User, plaintext: &str) -> Result<(), AuthError> {
        let now = Utc::now();
        if user.is_locked(now) {
            warn!(user_id = %user.user_id, "Login attempt against locked account");
            return Err(AuthError::AccountLocked);
        }

        let candidate = Password::new(plaintext.to_string());
        if !matches(
            &candidate,
            &PasswordHashString::new(user.password_hash.clone()),
        ) {
            let attempts = self.users.record_login_failure(user.user_id, now).await?;
            if attempts >= self.lockout.max_failed_attempts {
                let until = now + Duration::minutes(self.lockout.lockout_minutes);
                self.users.lock_account(user.user_id, until).await?;
                warn!(
                    user_id = %user.user_id,
                    attempts,
                    lockout_minutes = self.lockout.lockout_minutes,
                    "Account locked after repeated failures"
                );
                return Err(AuthError::AccountLocked);
            }
            return Err(AuthError::InvalidCredentials);
        }

        self.users.record_login_success(user.user_id, now).await?;
        Ok(())
    }

    /// First policy violation, or Ok when the password clears them all.
    fn check_complexity(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.policy.min_length {
            return Err(AuthError::WeakPassword(format!(
                "must be at least {} characters",
                self.policy.min_length
            )));
        }

        if self.policy.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err(AuthError::WeakPassword(
                "must contain an uppercase letter".to_string(),
            ));
        }

        if self.policy.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            return Err(AuthError::WeakPassword(
                "must contain a lowercase letter".to_string(),
            ));
        }

        if self.policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::WeakPassword(
                "must contain a digit".to_string(),
            ));
        }

        if self.policy.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err(AuthError::WeakPassword(
                "must contain a special character".to_string(),
            ));
        }

        Ok(())
    }
}

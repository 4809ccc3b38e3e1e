//! User accounts and the credential state attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User entity with credential, lockout, and MFA state.
///
/// `password_history` is most-recent-first and always starts with the
/// current hash, so reuse checks walk one list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub password_history: Vec<String>,
    pub password_changed_at: DateTime<Utc>,
    pub failed_login_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_failed_login_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub mfa_enabled: bool,
    /// Base32-encoded TOTP secret, present once MFA has been set up.
    pub mfa_secret: Option<String>,
    /// SHA-256 hex digests of the unused backup codes.
    pub backup_code_hashes: Vec<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a freshly hashed credential.
    pub fn new(email: impl Into<String>, password_hash: String, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email: email.into(),
            password_history: vec![password_hash.clone()],
            password_hash,
            password_changed_at: now,
            failed_login_attempts: 0,
            lockout_until: None,
            last_failed_login_at: None,
            last_login_at: None,
            mfa_enabled: false,
            mfa_secret: None,
            backup_code_hashes: Vec::new(),
            role: role.into(),
            created_at: now,
        }
    }

    /// Whether the account is inside an active lockout window.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        match self.lockout_until {
            Some(until) => now < until,
            None => false,
        }
    }

    /// Convert to the response shape (no credential material).
    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser::from(self.clone())
    }
}

/// User view safe to hand back to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub mfa_enabled: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for SanitizedUser {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            role: u.role,
            mfa_enabled: u.mfa_enabled,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

//! Storage traits the auth services operate against.
//!
//! Backends fail with `StoreError` only for infrastructure trouble; a
//! missing row comes back as `Ok(None)` or `Ok(false)`. The circuit
//! breaker counts every `StoreError` as a failure, so the split keeps
//! ordinary cache misses from tripping it.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Role, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation failed: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// User rows plus the atomic counter updates the lockout policy needs.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn insert(&self, user: &User) -> StoreResult<()>;

    /// Replace the stored credential material in one write.
    async fn update_password(
        &self,
        user_id: Uuid,
        hash: &str,
        history: &[String],
        changed_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Atomically bump the failed-login counter; returns the new count so
    /// the caller can apply the lockout threshold without a second read.
    async fn record_login_failure(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<u32>;

    async fn lock_account(&self, user_id: Uuid, until: DateTime<Utc>) -> StoreResult<()>;

    /// Clear the failure counter and any lockout after a successful
    /// authentication, stamping `last_login_at`.
    async fn record_login_success(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Install MFA material and mark the account MFA-enabled.
    async fn set_mfa(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
    ) -> StoreResult<()>;

    async fn clear_mfa(&self, user_id: Uuid) -> StoreResult<()>;

    /// Atomic compare-and-delete of one backup code digest. Returns true
    /// when the digest was present and is now gone; a second call with the
    /// same digest returns false.
    async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> StoreResult<bool>;

    async fn set_role(&self, user_id: Uuid, role: &str) -> StoreResult<()>;
}

/// Role definitions, keyed by name.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    async fn insert(&self, role: &Role) -> StoreResult<()>;
    async fn update(&self, role: &Role) -> StoreResult<()>;
    /// Returns true when a role was actually removed.
    async fn delete(&self, name: &str) -> StoreResult<bool>;
}

/// Revoked token identifiers with a bounded lifetime.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Mark `jti` revoked for `ttl_seconds`; after that the token has
    /// expired on its own and the entry may vanish.
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> StoreResult<()>;
    async fn is_revoked(&self, jti: &str) -> StoreResult<bool>;
}

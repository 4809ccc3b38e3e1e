//! In-memory store backends.
//!
//! Default backends for development and tests. Each mutation runs under
//! the map's per-entry lock, which is what makes the counter and
//! backup-code operations atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{RevocationStore, RoleStore, StoreError, StoreResult, UserStore};
use crate::models::{Role, User};

#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<Uuid, User>,
    email_index: DashMap<String, Uuid>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_user<T>(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut User) -> T,
    ) -> StoreResult<T> {
        match self.users.get_mut(&user_id) {
            Some(mut user) => Ok(f(&mut user)),
            None => Err(StoreError::Backend(anyhow::anyhow!(
                "user {} not found",
                user_id
            ))),
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        // Copy the id out so no map guard is held across the await.
        let user_id = self.email_index.get(email).map(|id| *id);
        match user_id {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn insert(&self, user: &User) -> StoreResult<()> {
        if self.email_index.contains_key(&user.email) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "email {} already registered",
                user.email
            )));
        }
        self.email_index.insert(user.email.clone(), user.user_id);
        self.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        hash: &str,
        history: &[String],
        changed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.with_user(user_id, |user| {
            user.password_hash = hash.to_string();
            user.password_history = history.to_vec();
            user.password_changed_at = changed_at;
        })
    }

    async fn record_login_failure(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<u32> {
        self.with_user(user_id, |user| {
            user.failed_login_attempts += 1;
            user.last_failed_login_at = Some(at);
            user.failed_login_attempts
        })
    }

    async fn lock_account(&self, user_id: Uuid, until: DateTime<Utc>) -> StoreResult<()> {
        self.with_user(user_id, |user| {
            user.lockout_until = Some(until);
        })
    }

    async fn record_login_success(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_user(user_id, |user| {
            user.failed_login_attempts = 0;
            user.lockout_until = None;
            user.last_login_at = Some(at);
        })
    }

    async fn set_mfa(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_code_hashes: &[String],
    ) -> StoreResult<()> {
        self.with_user(user_id, |user| {
            user.mfa_secret = Some(secret.to_string());
            user.backup_code_hashes = backup_code_hashes.to_vec();
            user.mfa_enabled = true;
        })
    }

    async fn clear_mfa(&self, user_id: Uuid) -> StoreResult<()> {
        self.with_user(user_id, |user| {
            user.mfa_secret = None;
            user.backup_code_hashes.clear();
            user.mfa_enabled = false;
        })
    }

    async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> StoreResult<bool> {
        self.with_user(user_id, |user| {
            let position = user.backup_code_hashes.iter().position(|stored| {
                stored.as_bytes().ct_eq(code_hash.as_bytes()).into()
            });
            match position {
                Some(index) => {
                    user.backup_code_hashes.remove(index);
                    true
                }
                None => false,
            }
        })
    }

    async fn set_role(&self, user_id: Uuid, role: &str) -> StoreResult<()> {
        self.with_user(user_id, |user| {
            user.role = role.to_string();
        })
    }
}

#[derive(Default)]
pub struct InMemoryRoleStore {
    roles: DashMap<String, Role>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self.roles.get(name).map(|r| r.clone()))
    }

    async fn insert(&self, role: &Role) -> StoreResult<()> {
        self.roles.insert(role.name.clone(), role.clone());
        Ok(())
    }

    async fn update(&self, role: &Role) -> StoreResult<()> {
        self.roles.insert(role.name.clone(), role.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        Ok(self.roles.remove(name).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryRevocationStore {
    revoked: DashMap<String, DateTime<Utc>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> StoreResult<()> {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds.max(0));
        self.revoked.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> StoreResult<bool> {
        let now = Utc::now();
        match self.revoked.get(jti).map(|entry| *entry) {
            Some(expires_at) if now < expires_at => Ok(true),
            Some(_) => {
                // Entry outlived the token it guards.
                self.revoked.remove(jti);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User::new("ada@example.com", "$argon2id$fake".to_string(), "member")
    }

    #[tokio::test]
    async fn test_failure_counter_increments_and_resets() {
        let store = InMemoryUserStore::new();
        let user = test_user();
        store.insert(&user).await.unwrap();

        let now = Utc::now();
        assert_eq!(store.record_login_failure(user.user_id, now).await.unwrap(), 1);
        assert_eq!(store.record_login_failure(user.user_id, now).await.unwrap(), 2);

        store.record_login_success(user.user_id, now).await.unwrap();
        let stored = store.find_by_id(user.user_id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.lockout_until.is_none());
        assert_eq!(stored.last_login_at, Some(now));
    }

    #[tokio::test]
    async fn test_backup_code_consumed_exactly_once() {
        let store = InMemoryUserStore::new();
        let user = test_user();
        store.insert(&user).await.unwrap();
        store
            .set_mfa(user.user_id, "SECRET", &["digest-a".to_string(), "digest-b".to_string()])
            .await
            .unwrap();

        assert!(store.consume_backup_code(user.user_id, "digest-a").await.unwrap());
        assert!(!store.consume_backup_code(user.user_id, "digest-a").await.unwrap());
        assert!(store.consume_backup_code(user.user_id, "digest-b").await.unwrap());

        let stored = store.find_by_id(user.user_id).await.unwrap().unwrap();
        assert!(stored.backup_code_hashes.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryUserStore::new();
        let user = test_user();
        store.insert(&user).await.unwrap();

        let twin = User::new("ada@example.com", "other".to_string(), "member");
        assert!(store.insert(&twin).await.is_err());
    }

    #[tokio::test]
    async fn test_revocation_entry_expires() {
        let store = InMemoryRevocationStore::new();
        store.revoke("jti-1", 3600).await.unwrap();
        assert!(store.is_revoked("jti-1").await.unwrap());

        store.revoke("jti-2", 0).await.unwrap();
        assert!(!store.is_revoked("jti-2").await.unwrap());
        assert!(!store.is_revoked("unknown").await.unwrap());
    }
}

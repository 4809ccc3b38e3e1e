//! Shared fixtures for auth-core integration tests.
//!
//! Everything runs against the in-memory stores; tests that need to
//! inject failures or count store traffic wrap them here.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use auth_core::config::AuthConfig;
use auth_core::models::{Role, SanitizedUser, TokenPair, User};
use auth_core::store::memory::{InMemoryRevocationStore, InMemoryRoleStore, InMemoryUserStore};
use auth_core::store::{RevocationStore, RoleStore, StoreError, StoreResult, UserStore};
use auth_core::utils::password::{hash_password, Password};
use auth_core::{AuthStack, MEMBER_ROLE};
use chrono::{DateTime, Utc};

/// Satisfies the default complexity policy.
pub const TEST_PASSWORD: &str = "Sup3r-Secret-Pw!";

/// A wired stack over in-memory stores, with the store handles kept so
/// tests can reach behind the facade.
pub struct TestStack {
    pub stack: AuthStack,
    pub users: Arc<InMemoryUserStore>,
    pub roles: Arc<InMemoryRoleStore>,
    pub revocations: Arc<InMemoryRevocationStore>,
    pub config: AuthConfig,
}

impl TestStack {
    pub async fn spawn() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AuthConfig) -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let roles = Arc::new(InMemoryRoleStore::new());
        let revocations = Arc::new(InMemoryRevocationStore::new());

        let stack = AuthStack::with_stores(
            config.clone(),
            users.clone(),
            roles.clone(),
            revocations.clone(),
        )
        .await
        .expect("Failed to assemble auth stack");

        Self {
            stack,
            users,
            roles,
            revocations,
            config,
        }
    }

    pub async fn register_member(&self, email: &str) -> SanitizedUser {
        self.stack
            .auth
            .register(email, TEST_PASSWORD, MEMBER_ROLE)
            .await
            .expect("Failed to register user")
    }

    pub async fn login(&self, email: &str) -> TokenPair {
        let (pair, _) = self
            .stack
            .auth
            .login(email, TEST_PASSWORD, None)
            .await
            .expect("Login failed");
        pair
    }

    /// Insert a user directly, bypassing the facade, for tests that need
    /// hand-crafted account state.
    pub async fn insert_user(&self, user: &User) {
        self.users.insert(user).await.expect("Failed to insert user");
    }
}

pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::for_dev();
    config.common.log_level = "error".to_string();
    config
}

pub fn hashed_test_password() -> String {
    hash_password(&Password::new(TEST_PASSWORD.to_string()))
        .expect("Failed to hash test password")
        .into_string()
}

pub fn member_user(email: &str) -> User {
    User::new(email, hashed_test_password(), MEMBER_ROLE)
}

/// Revocation store that fails every call until told otherwise.
pub struct FlakyRevocationStore {
    inner: InMemoryRevocationStore,
    failing: std::sync::atomic::AtomicBool,
    pub calls: AtomicUsize,
}

impl FlakyRevocationStore {
    pub fn new(failing: bool) -> Self {
        Self {
            inner: InMemoryRevocationStore::new(),
            failing: std::sync::atomic::AtomicBool::new(failing),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RevocationStore for FlakyRevocationStore {
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> StoreResult<()> {
        self.gate()?;
        self.inner.revoke(jti, ttl_seconds).await
    }

    async fn is_revoked(&self, jti: &str) -> StoreResult<bool> {
        self.gate()?;
        self.inner.is_revoked(jti).await
    }
}

/// Role store wrapper that counts lookups, for cache assertions.
pub struct CountingRoleStore {
    inner: InMemoryRoleStore,
    lookups: AtomicUsize,
}

impl CountingRoleStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRoleStore::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleStore for CountingRoleStore {
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_name(name).await
    }

    async fn insert(&self, role: &Role) -> StoreResult<()> {
        self.inner.insert(role).await
    }

    async fn update(&self, role: &Role) -> StoreResult<()> {
        self.inner.update(role).await
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        self.inner.delete(name).await
    }
}

/// Freeze a lockout into the past so expiry paths can run without
/// sleeping through real lockout windows.
pub fn expired_lockout(minutes_ago: i64) -> Option<DateTime<Utc>> {
    Some(Utc::now() - chrono::Duration::minutes(minutes_ago))
}

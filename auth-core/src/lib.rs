//! auth-core: authentication and authorization for taskhive services.
//!
//! Four services behind one facade: credential verification with
//! progressive lockout, TOTP-based MFA with single-use backup codes, JWT
//! access/refresh pairs checked against a revocation store, and
//! role-based permission evaluation with a TTL'd decision cache. Store
//! reads that gate security decisions go through the circuit breaker in
//! `service-core` and reject on outage rather than letting requests
//! through unchecked.
//!
//! [`AuthStack::bootstrap`] wires the whole graph from configuration;
//! [`AuthStack::with_stores`] does the same over injected stores.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::AuthConfig;
pub use error::AuthError;
pub use services::{AuthService, MfaSetup, PermissionService};

use std::sync::Arc;
use std::time::Duration;

use service_core::breaker::CircuitBreaker;
use service_core::observability::init_tracing;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::models::{Action, Permission, Role, Scope};
use crate::services::{CredentialService, MfaService, TokenService};
use crate::store::memory::{InMemoryRevocationStore, InMemoryRoleStore, InMemoryUserStore};
use crate::store::redis::RedisRevocationStore;
use crate::store::{RevocationStore, RoleStore, UserStore};

/// Role granted full control over every resource. Seeded at bootstrap.
pub const ADMIN_ROLE: &str = "admin";
/// Default role for new accounts. Seeded at bootstrap.
pub const MEMBER_ROLE: &str = "member";

/// The wired service graph plus the background work it owns.
///
/// Dropping the stack stops the cache sweeper; the services themselves
/// hold no background state.
pub struct AuthStack {
    pub auth: Arc<AuthService>,
    pub permissions: Arc<PermissionService>,
    sweep: Option<JoinHandle<()>>,
}

impl AuthStack {
    /// Assemble the stack from configuration: tracing, stores, breakers,
    /// services, system roles, cache sweeper.
    ///
    /// Users and roles live in process memory; the revocation store is
    /// Redis when configured so revocations survive a restart, otherwise
    /// in-memory as well.
    pub async fn bootstrap(config: AuthConfig) -> Result<Self, AuthError> {
        init_tracing(&config.common.service_name, &config.common.log_level);

        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let roles: Arc<dyn RoleStore> = Arc::new(InMemoryRoleStore::new());
        let revocations: Arc<dyn RevocationStore> = match &config.redis {
            Some(redis) => Arc::new(RedisRevocationStore::connect(&redis.url).await?),
            None => {
                info!("No Redis configured; using the in-memory revocation store");
                Arc::new(InMemoryRevocationStore::new())
            }
        };

        Self::with_stores(config, users, roles, revocations).await
    }

    /// Assemble the stack over caller-provided stores.
    pub async fn with_stores(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Result<Self, AuthError> {
        let breaker_config = config.breaker.to_breaker_config();
        let role_breaker = Arc::new(CircuitBreaker::new("role-store", breaker_config.clone()));
        let revocation_breaker = Arc::new(CircuitBreaker::new("revocation-store", breaker_config));

        seed_system_roles(roles.as_ref()).await?;

        let permissions = Arc::new(PermissionService::new(roles, role_breaker, &config.cache));
        let credentials = CredentialService::new(
            users.clone(),
            config.password.clone(),
            config.lockout.clone(),
        );
        let mfa = MfaService::new(users.clone(), config.mfa.clone());
        let tokens = TokenService::new(config.token.clone(), revocations, revocation_breaker);
        let auth = Arc::new(AuthService::new(
            users,
            credentials,
            mfa,
            tokens,
            permissions.clone(),
        ));

        let sweep = spawn_cache_sweeper(permissions.clone(), config.cache.sweep_interval_seconds);

        info!("Auth stack assembled");
        Ok(Self {
            auth,
            permissions,
            sweep: Some(sweep),
        })
    }

    /// Stop the cache sweeper. Dropping the stack does the same.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.sweep.take() {
            handle.abort();
        }
    }
}

impl Drop for AuthStack {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Insert the system roles that are missing. Existing roles are left
/// untouched, so operator edits to non-system roles survive restarts.
async fn seed_system_roles(roles: &dyn RoleStore) -> Result<(), AuthError> {
    for role in system_roles() {
        if roles.find_by_name(&role.name).await?.is_none() {
            info!(role = %role.name, "Seeding system role");
            roles.insert(&role).await?;
        }
    }
    Ok(())
}

fn system_roles() -> Vec<Role> {
    vec![
        Role::system(
            ADMIN_ROLE,
            vec![
                Permission::new(Action::Manage, "task", Scope::Global),
                Permission::new(Action::Manage, "project", Scope::Global),
                Permission::new(Action::Manage, "team", Scope::Global),
                Permission::new(Action::Manage, "user", Scope::Global),
                Permission::new(Action::Manage, "role", Scope::Global),
            ],
        ),
        Role::system(
            MEMBER_ROLE,
            vec![
                Permission::new(Action::Read, "task", Scope::Team),
                Permission::new(Action::Create, "task", Scope::Team),
                Permission::new(Action::Update, "task", Scope::Own),
                Permission::new(Action::Delete, "task", Scope::Own),
                Permission::new(Action::Read, "project", Scope::Team),
            ],
        ),
    ]
}

fn spawn_cache_sweeper(
    permissions: Arc<PermissionService>,
    interval_seconds: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let dropped = permissions.sweep_expired();
            if dropped > 0 {
                debug!(dropped, "Swept expired authorization decisions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_seeds_system_roles() {
        let stack = AuthStack::bootstrap(AuthConfig::for_dev()).await.unwrap();

        let admin = stack.permissions.get_role(ADMIN_ROLE).await.unwrap();
        assert!(admin.is_system);
        let member = stack.permissions.get_role(MEMBER_ROLE).await.unwrap();
        assert!(member.is_system);
        assert_eq!(member.permissions.len(), 5);
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent_and_preserves_edits() {
        let roles = Arc::new(InMemoryRoleStore::new());
        let custom = Role::new(
            "auditor",
            vec![Permission::new(Action::Read, "task", Scope::Global)],
        );
        roles.insert(&custom).await.unwrap();

        let users = Arc::new(InMemoryUserStore::new());
        let revocations = Arc::new(InMemoryRevocationStore::new());

        let first = AuthStack::with_stores(
            AuthConfig::for_dev(),
            users.clone(),
            roles.clone(),
            revocations.clone(),
        )
        .await
        .unwrap();
        drop(first);

        let second = AuthStack::with_stores(AuthConfig::for_dev(), users, roles, revocations)
            .await
            .unwrap();

        assert!(second.permissions.get_role("auditor").await.is_ok());
        let admin = second.permissions.get_role(ADMIN_ROLE).await.unwrap();
        assert_eq!(admin.version, 1);
    }
}

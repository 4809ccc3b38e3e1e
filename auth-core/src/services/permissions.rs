//! Permission evaluation over the role graph.
//!
//! Grants are resolved by walking a role's inheritance chain, then every
//! required (action, resource) pair must be satisfied at the requested
//! scope. Decisions are cached per (user, requirements, scope) for a short
//! TTL; any role write clears the whole cache rather than chasing which
//! entries a changed inheritance chain might touch.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use service_core::breaker::CircuitBreaker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store_unavailable;
use crate::config::CacheConfig;
use crate::error::AuthError;
use crate::models::{Permission, RequiredPermission, Role, Scope};
use crate::store::RoleStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: Uuid,
    /// Sorted, joined requirements so the same set always hits the same entry.
    required: String,
    scope: Scope,
}

impl CacheKey {
    fn new(user_id: Uuid, required: &[RequiredPermission], scope: Scope) -> Self {
        let mut parts: Vec<String> = required.iter().map(|r| r.to_string()).collect();
        parts.sort();
        Self {
            user_id,
            required: parts.join("|"),
            scope,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    allowed: bool,
    expires_at: DateTime<Utc>,
}

pub struct PermissionService {
    roles: Arc<dyn RoleStore>,
    breaker: Arc<CircuitBreaker>,
    cache: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl PermissionService {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        breaker: Arc<CircuitBreaker>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            roles,
            breaker,
            cache: DashMap::new(),
            ttl: Duration::seconds(config.ttl_seconds),
        }
    }

    /// Decide whether a user's role satisfies every required pair at the
    /// given scope. An empty requirement list is trivially satisfied.
    pub async fn check(
        &self,
        user_id: Uuid,
        role: &str,
        required: &[RequiredPermission],
        scope: Scope,
    ) -> Result<bool, AuthError> {
        let key = CacheKey::new(user_id, required, scope);
        let now = Utc::now();

        // Copy the decision out so no map guard is held across the await.
        let cached = self
            .cache
            .get(&key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.allowed);
        if let Some(allowed) = cached {
            debug!(user_id = %user_id, allowed, "Authorization decision served from cache");
            return Ok(allowed);
        }

        let grants = self.effective_permissions(role).await?;
        let allowed = required
            .iter()
            .all(|req| grants.iter().any(|grant| grant.satisfies(req, scope)));

        self.cache.insert(
            key,
            CacheEntry {
                allowed,
                expires_at: now + self.ttl,
            },
        );

        if !allowed {
            debug!(
                user_id = %user_id,
                role,
                scope = scope.as_str(),
                "Authorization denied"
            );
        }
        Ok(allowed)
    }

    /// Flatten a role and everything it inherits into one grant list.
    ///
    /// The walk is breadth-first with a visited set, so inheritance cycles
    /// terminate instead of recursing. A referenced role that no longer
    /// exists is skipped with a warning rather than failing the whole
    /// resolution.
    pub async fn effective_permissions(
        &self,
        role_name: &str,
    ) -> Result<Vec<Permission>, AuthError> {
        let mut grants: Vec<Permission> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        visited.insert(role_name.to_string());
        queue.push_back(role_name.to_string());

        while let Some(name) = queue.pop_front() {
            let Some(role) = self.load_role(&name).await? else {
                warn!(role = %name, "Role referenced but not found; skipping");
                continue;
            };
            for permission in role.permissions {
                if !grants.contains(&permission) {
                    grants.push(permission);
                }
            }
            for parent in role.inherits {
                if visited.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
        }

        Ok(grants)
    }

    pub async fn role_exists(&self, name: &str) -> Result<bool, AuthError> {
        Ok(self.load_role(name).await?.is_some())
    }

    pub async fn get_role(&self, name: &str) -> Result<Role, AuthError> {
        self.load_role(name).await?.ok_or(AuthError::RoleNotFound)
    }

    pub async fn create_role(
        &self,
        name: &str,
        permissions: Vec<Permission>,
        inherits: Vec<String>,
    ) -> Result<Role, AuthError> {
        validate_grants(&permissions)?;
        if self.load_role(name).await?.is_some() {
            return Err(AuthError::RoleExists);
        }
        self.validate_inherits(name, &inherits).await?;

        let role = Role::new(name, permissions).with_inherits(inherits);
        let store = self.roles.clone();
        let to_insert = role.clone();
        self.breaker
            .call("role_insert", move || async move {
                store.insert(&to_insert).await
            })
            .await
            .map_err(|err| store_unavailable("role_insert", err))?;

        self.invalidate_all();
        info!(role = %role.name, "Role created");
        Ok(role)
    }

    pub async fn update_role(
        &self,
        name: &str,
        permissions: Vec<Permission>,
        inherits: Vec<String>,
    ) -> Result<Role, AuthError> {
        validate_grants(&permissions)?;
        let mut role = self.get_role(name).await?;
        if role.is_system {
            return Err(AuthError::RoleImmutable);
        }
        self.validate_inherits(name, &inherits).await?;

        role.permissions = permissions;
        role.inherits = inherits;
        role.touch();

        let store = self.roles.clone();
        let to_update = role.clone();
        self.breaker
            .call("role_update", move || async move {
                store.update(&to_update).await
            })
            .await
            .map_err(|err| store_unavailable("role_update", err))?;

        self.invalidate_all();
        info!(role = %role.name, version = role.version, "Role updated");
        Ok(role)
    }

    pub async fn delete_role(&self, name: &str) -> Result<(), AuthError> {
        let role = self.get_role(name).await?;
        if role.is_system {
            return Err(AuthError::RoleImmutable);
        }

        let store = self.roles.clone();
        let owned = name.to_string();
        let deleted = self
            .breaker
            .call("role_delete", move || async move {
                store.delete(&owned).await
            })
            .await
            .map_err(|err| store_unavailable("role_delete", err))?;
        if !deleted {
            return Err(AuthError::RoleNotFound);
        }

        self.invalidate_all();
        info!(role = name, "Role deleted");
        Ok(())
    }

    /// Drop every cached decision. Called after any role write; decisions
    /// recompute lazily on the next check.
    pub fn invalidate_all(&self) {
        self.cache.clear();
        debug!("Authorization cache cleared");
    }

    /// Evict entries past their TTL. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.cache.len())
    }

    pub fn cached_decisions(&self) -> usize {
        self.cache.len()
    }

    async fn validate_inherits(&self, name: &str, inherits: &[String]) -> Result<(), AuthError> {
        for parent in inherits {
            if parent == name {
                return Err(AuthError::RoleInvalid(
                    "a role cannot inherit from itself".to_string(),
                ));
            }
            if self.load_role(parent).await?.is_none() {
                return Err(AuthError::RoleInvalid(format!(
                    "inherited role '{parent}' does not exist"
                )));
            }
        }
        Ok(())
    }

    async fn load_role(&self, name: &str) -> Result<Option<Role>, AuthError> {
        let store = self.roles.clone();
        let owned = name.to_string();
        self.breaker
            .call("role_lookup", move || async move {
                store.find_by_name(&owned).await
            })
            .await
            .map_err(|err| store_unavailable("role_lookup", err))
    }
}

fn validate_grants(permissions: &[Permission]) -> Result<(), AuthError> {
    let mut seen: HashSet<&Permission> = HashSet::new();
    for permission in permissions {
        if !seen.insert(permission) {
            return Err(AuthError::RoleInvalid(format!(
                "duplicate grant '{}'",
                permission.flatten()
            )));
        }
    }
    Ok(())
}

//! Roles and the permission tuples they grant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action verbs a permission can grant. `Manage` implies every other
/// action on the same resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Manage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Manage => "manage",
        }
    }

    /// Whether a grant of `self` satisfies a request for `required`.
    pub fn satisfies(&self, required: Action) -> bool {
        *self == Action::Manage || *self == required
    }
}

/// Authorization breadth. A grant at a broader scope satisfies a check at
/// any narrower one: global ⊇ project ⊇ team ⊇ own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Project,
    Team,
    Own,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Project => "project",
            Scope::Team => "team",
            Scope::Own => "own",
        }
    }

    fn breadth(&self) -> u8 {
        match self {
            Scope::Global => 3,
            Scope::Project => 2,
            Scope::Team => 1,
            Scope::Own => 0,
        }
    }

    /// Whether a grant at `self` covers a check at `required`.
    pub fn covers(&self, required: Scope) -> bool {
        self.breadth() >= required.breadth()
    }
}

/// One grant: an action on a resource kind at a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub action: Action,
    pub resource: String,
    pub scope: Scope,
}

impl Permission {
    pub fn new(action: Action, resource: impl Into<String>, scope: Scope) -> Self {
        Self {
            action,
            resource: resource.into(),
            scope,
        }
    }

    /// Flattened `action:resource:scope` form carried in token payloads.
    pub fn flatten(&self) -> String {
        format!(
            "{}:{}:{}",
            self.action.as_str(),
            self.resource,
            self.scope.as_str()
        )
    }

    /// Whether this grant satisfies `required` at `required_scope`.
    pub fn satisfies(&self, required: &RequiredPermission, required_scope: Scope) -> bool {
        self.resource == required.resource
            && self.action.satisfies(required.action)
            && self.scope.covers(required_scope)
    }
}

/// An (action, resource) pair a caller must hold; the scope of the check
/// is supplied alongside, once for the whole request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequiredPermission {
    pub resource: String,
    pub action: Action,
}

impl RequiredPermission {
    pub fn new(action: Action, resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action,
        }
    }
}

impl std::fmt::Display for RequiredPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.action.as_str(), self.resource)
    }
}

/// A named bundle of permissions, optionally inheriting from other roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<Permission>,
    /// Names of roles whose grants this role also carries.
    pub inherits: Vec<String>,
    /// System roles ship with the service and reject mutation.
    pub is_system: bool,
    /// Bumped on every write; cached authorization decisions keyed on the
    /// old version are discarded.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, permissions: Vec<Permission>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            permissions,
            inherits: Vec::new(),
            is_system: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_inherits(mut self, inherits: Vec<String>) -> Self {
        self.inherits = inherits;
        self
    }

    pub fn system(name: impl Into<String>, permissions: Vec<Permission>) -> Self {
        let mut role = Self::new(name, permissions);
        role.is_system = true;
        role
    }

    /// Record a mutation: bump the version and the update timestamp.
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

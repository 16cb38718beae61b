pub mod permissions;
pub mod roles;

use serde::{Deserialize, Serialize};

pub use permissions::{PermissionService, Permissions, RolePermissions, require_permission};
pub use roles::Role;

/// A principal acting on requests or versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub email: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Actor { id: id.into(), email: email.into() }
    }

    /// Reviewer stamped on auto-approved requests.
    pub fn system() -> Self {
        Actor::new("system", "system@scriptgate.local")
    }
}

/// The submitter of a change, with the role the auto-approval policy looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl Requester {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Requester { id: id.into(), email: email.into(), role }
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.email.clone())
    }
}

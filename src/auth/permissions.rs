use std::collections::HashMap;

use async_trait::async_trait;

use super::roles::Role;
use crate::errors::AppError;

pub const SCRIPT_READ: &str = "script.read";
pub const SCRIPT_CREATE: &str = "script.create";
pub const SCRIPT_EDIT: &str = "script.edit";
pub const SCRIPT_DELETE: &str = "script.delete";
pub const SCRIPT_EXECUTE: &str = "script.execute";
pub const SCRIPT_APPROVE: &str = "script.approve";
pub const SCRIPT_REJECT: &str = "script.reject";

/// Set of permission codes held by a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(pub Vec<String>);

impl Permissions {
    pub fn has(&self, code: &str) -> bool {
        self.0.iter().any(|p| p == code)
    }

    /// Default grant for a role.
    pub fn for_role(role: Role) -> Self {
        let codes: &[&str] = match role {
            Role::Admin => &[
                SCRIPT_READ,
                SCRIPT_CREATE,
                SCRIPT_EDIT,
                SCRIPT_DELETE,
                SCRIPT_EXECUTE,
                SCRIPT_APPROVE,
                SCRIPT_REJECT,
            ],
            Role::Developer => &[SCRIPT_READ, SCRIPT_CREATE, SCRIPT_EDIT, SCRIPT_DELETE, SCRIPT_EXECUTE],
            Role::User => &[SCRIPT_READ, SCRIPT_EXECUTE],
            Role::Viewer => &[SCRIPT_READ],
        };
        Permissions(codes.iter().map(|c| c.to_string()).collect())
    }
}

/// Answers whether a principal holds a permission.
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn has_permission(&self, actor_id: &str, permission: &str) -> Result<bool, AppError>;
}

/// Check permission; returns `Forbidden` if denied.
pub async fn require_permission(
    service: &dyn PermissionService,
    actor_id: &str,
    code: &str,
) -> Result<(), AppError> {
    if service.has_permission(actor_id, code).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden(code.to_string()))
    }
}

/// Permission lookup backed by an actor → role table. Unknown actors hold nothing.
#[derive(Debug, Default)]
pub struct RolePermissions {
    roles: HashMap<String, Role>,
}

impl RolePermissions {
    pub fn with_roles<I, S>(assignments: I) -> Self
    where
        I: IntoIterator<Item = (S, Role)>,
        S: Into<String>,
    {
        let roles = assignments
            .into_iter()
            .map(|(actor, role)| (actor.into(), role))
            .collect();
        RolePermissions { roles }
    }

    pub fn role_of(&self, actor_id: &str) -> Option<Role> {
        self.roles.get(actor_id).copied()
    }
}

#[async_trait]
impl PermissionService for RolePermissions {
    async fn has_permission(&self, actor_id: &str, permission: &str) -> Result<bool, AppError> {
        Ok(self
            .role_of(actor_id)
            .map(|role| Permissions::for_role(role).has(permission))
            .unwrap_or(false))
    }
}

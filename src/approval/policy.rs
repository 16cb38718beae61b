use std::collections::BTreeSet;

use crate::auth::Role;
use crate::models::approval_request::{OperationType, ScriptType};

/// Whether a submission skips human review.
///
/// Only administrators are trusted to self-approve; every other role waits
/// for a reviewer whatever the SQL looks like. Operation and script type are
/// accepted so the policy can widen without touching callers.
pub fn auto_approval_eligible(role: Role, _operation: OperationType, _script_type: ScriptType) -> bool {
    role == Role::Admin
}

pub fn required_approvers(_operation: OperationType, _script_type: ScriptType) -> BTreeSet<Role> {
    BTreeSet::from([Role::Admin])
}

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{Actor, Role};
use crate::errors::AppError;

/// Lifecycle of an approval request.
///
/// ```text
/// draft ──> pending ──> approved | rejected | withdrawn
///   └───────────────> approved        (auto-approval only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Withdrawn => "withdrawn",
        }
    }

    /// Whether `self -> next` is an edge of the request state machine.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Draft, Approved)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Withdrawn)
        )
    }

    /// Statuses listed as "completed" in review queues.
    pub fn completed() -> &'static [RequestStatus] {
        &[
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Withdrawn,
        ]
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RequestStatus::Draft),
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "withdrawn" => Ok(RequestStatus::Withdrawn),
            other => Err(AppError::Validation(format!("unknown request status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    /// Create and update carry the full proposed document.
    pub fn requires_payload(&self) -> bool {
        !matches!(self, OperationType::Delete)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            other => Err(AppError::Validation(format!("unknown operation type '{other}'"))),
        }
    }
}

/// What a script's SQL does, as inferred from its keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    ReadOnly,
    DataModification,
    StructureChange,
    SystemAdmin,
}

impl ScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::ReadOnly => "read_only",
            ScriptType::DataModification => "data_modification",
            ScriptType::StructureChange => "structure_change",
            ScriptType::SystemAdmin => "system_admin",
        }
    }
}

impl FromStr for ScriptType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_only" => Ok(ScriptType::ReadOnly),
            "data_modification" => Ok(ScriptType::DataModification),
            "structure_change" => Ok(ScriptType::StructureChange),
            "system_admin" => Ok(ScriptType::SystemAdmin),
            other => Err(AppError::Validation(format!("unknown script type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(AppError::Validation(format!("unknown priority '{other}'"))),
        }
    }
}

/// One proposed change to a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub script_id: String,
    pub operation_type: OperationType,
    pub script_type: ScriptType,
    pub status: RequestStatus,
    pub auto_approval_eligible: bool,
    pub required_approvers: BTreeSet<Role>,
    /// Full proposed document for create/update; absent for delete.
    pub original_data: Option<serde_json::Value>,
    pub sql_content: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub requester_id: String,
    pub requester_email: String,
    pub requester_role: Role,
    pub requested_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub reviewed_by_email: Option<String>,
    pub review_comment: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub current_approvers: Vec<String>,
}

impl ApprovalRequest {
    /// Stamp `transition` onto this request. Callers have already checked the source status.
    pub fn apply_transition(&mut self, transition: &StatusTransition) {
        self.status = transition.to;
        self.updated_at = transition.at;
        if transition.stamps_review() {
            self.reviewed_at = Some(transition.at);
            self.reviewed_by = Some(transition.actor.id.clone());
            self.reviewed_by_email = Some(transition.actor.email.clone());
            self.review_comment = transition.comment.clone();
        }
        if transition.to == RequestStatus::Approved
            && !self.current_approvers.contains(&transition.actor.id)
        {
            self.current_approvers.push(transition.actor.id.clone());
        }
    }
}

/// A guarded status change: applied only while the request is still in `from`.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub request_id: String,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub actor: Actor,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusTransition {
    /// Review fields are set iff the request ends approved or rejected.
    pub fn stamps_review(&self) -> bool {
        matches!(self.to, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

/// Sort order for request listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrder {
    /// Newest submissions first.
    RequestedAtDesc,
    /// Most recently decided first.
    UpdatedAtDesc,
}

/// Optional narrowing of request listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFilter {
    pub script_id: Option<String>,
    pub requester_id: Option<String>,
}

impl RequestFilter {
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        self.script_id.as_deref().is_none_or(|id| id == request.script_id)
            && self
                .requester_id
                .as_deref()
                .is_none_or(|id| id == request.requester_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for from in RequestStatus::completed() {
            for to in [
                RequestStatus::Draft,
                RequestStatus::Pending,
                RequestStatus::Approved,
                RequestStatus::Rejected,
                RequestStatus::Withdrawn,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn draft_cannot_be_rejected_directly() {
        assert!(RequestStatus::Draft.can_transition_to(RequestStatus::Approved));
        assert!(!RequestStatus::Draft.can_transition_to(RequestStatus::Rejected));
        assert!(!RequestStatus::Draft.can_transition_to(RequestStatus::Withdrawn));
    }

    #[test]
    fn status_parses_its_own_names() {
        for s in ["draft", "pending", "approved", "rejected", "withdrawn"] {
            assert_eq!(s.parse::<RequestStatus>().unwrap().as_str(), s);
        }
        assert!("done".parse::<RequestStatus>().is_err());
    }
}

//! Request lifecycle for script changes.
//!
//! A submission is classified, checked against the auto-approval policy and
//! either applied at once (administrators) or parked as `pending` for a
//! reviewer. Decisions are compare-and-set on the stored status, so two
//! concurrent reviewers can never both succeed and an approved change is
//! applied exactly once.

mod apply;
pub mod classify;
pub mod policy;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::audit::{ApprovalEvent, Sinks};
use crate::auth::permissions::{SCRIPT_APPROVE, SCRIPT_REJECT};
use crate::auth::{Actor, PermissionService, Requester, require_permission};
use crate::errors::AppError;
use crate::history::{self, HistoryRecorder};
use crate::ids;
use crate::models::approval_history::{ApprovalHistoryEntry, HistoryAction};
use crate::models::approval_request::{
    ApprovalRequest, OperationType, Priority, RequestFilter, RequestOrder, RequestStatus,
    StatusTransition,
};
use crate::models::paging::{PageRequest, Paged};
use crate::models::script::ScriptContent;
use crate::store::DocumentStore;
use crate::versioning::VersionService;

pub use classify::classify;
pub use policy::{auto_approval_eligible, required_approvers};

const AUTO_APPROVED_COMMENT: &str = "auto-approved";

/// Input to [`ApprovalEngine::submit`].
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub script_id: String,
    pub requester: Requester,
    pub operation_type: OperationType,
    pub sql_content: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    /// Full proposed document; required for create and update.
    pub original_data: Option<serde_json::Value>,
}

/// Result of an approval. The approval itself always committed; applying it
/// to the script record may not have.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Committed {
        request_id: String,
        version_id: Option<String>,
    },
    CommittedWithExecutionError {
        request_id: String,
        error: String,
    },
}

impl ApprovalOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            ApprovalOutcome::Committed { request_id, .. }
            | ApprovalOutcome::CommittedWithExecutionError { request_id, .. } => request_id,
        }
    }

    pub fn version_id(&self) -> Option<&str> {
        match self {
            ApprovalOutcome::Committed { version_id, .. } => version_id.as_deref(),
            ApprovalOutcome::CommittedWithExecutionError { .. } => None,
        }
    }

    pub fn execution_error(&self) -> Option<&str> {
        match self {
            ApprovalOutcome::CommittedWithExecutionError { error, .. } => Some(error),
            ApprovalOutcome::Committed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub request_id: String,
    pub status: RequestStatus,
    /// Present when the submission was auto-approved and applied.
    pub outcome: Option<ApprovalOutcome>,
}

#[derive(Clone)]
pub struct ApprovalEngine {
    store: Arc<dyn DocumentStore>,
    permissions: Arc<dyn PermissionService>,
    versions: VersionService,
    history: HistoryRecorder,
    sinks: Sinks,
}

impl ApprovalEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        permissions: Arc<dyn PermissionService>,
        sinks: Sinks,
    ) -> Self {
        ApprovalEngine {
            versions: VersionService::new(store.clone(), sinks.clone()),
            history: HistoryRecorder::new(store.clone()),
            store,
            permissions,
            sinks,
        }
    }

    pub fn versions(&self) -> &VersionService {
        &self.versions
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    pub async fn submit(&self, input: SubmitRequest) -> Result<Submission, AppError> {
        validate_submission(&input)?;

        let script_type = classify(&input.sql_content);
        let auto = auto_approval_eligible(input.requester.role, input.operation_type, script_type);
        let now = Utc::now();

        let mut request = ApprovalRequest {
            request_id: ids::request_id(),
            script_id: input.script_id,
            operation_type: input.operation_type,
            script_type,
            status: RequestStatus::Pending,
            auto_approval_eligible: auto,
            required_approvers: required_approvers(input.operation_type, script_type),
            original_data: input.original_data,
            sql_content: input.sql_content,
            title: input.title,
            description: input.description,
            priority: input.priority,
            requester_id: input.requester.id.clone(),
            requester_email: input.requester.email.clone(),
            requester_role: input.requester.role,
            requested_at: now,
            submitted_at: Some(now),
            reviewed_at: None,
            reviewed_by: None,
            reviewed_by_email: None,
            review_comment: None,
            updated_at: now,
            current_approvers: Vec::new(),
        };

        let system = Actor::system();
        let (action, comment) = if auto {
            request.apply_transition(&StatusTransition {
                request_id: request.request_id.clone(),
                from: RequestStatus::Draft,
                to: RequestStatus::Approved,
                actor: system.clone(),
                comment: Some(AUTO_APPROVED_COMMENT.to_string()),
                at: now,
            });
            (HistoryAction::Approve, Some(AUTO_APPROVED_COMMENT.to_string()))
        } else {
            (HistoryAction::Submit, None)
        };

        let mut entry = history::entry_for(
            &request.request_id,
            &request.script_id,
            action,
            &input.requester.actor(),
            RequestStatus::Draft,
            request.status,
            comment,
            now,
        );
        entry.metadata = Some(json!({
            "operation_type": request.operation_type.as_str(),
            "script_type": request.script_type.as_str(),
            "auto_approved": auto,
        }));
        self.history.record_submission(&request, entry).await?;

        log::info!(
            "Request {} for script {} submitted by {} as {} ({})",
            request.request_id,
            request.script_id,
            request.requester_id,
            request.status,
            request.script_type.as_str()
        );

        let outcome = if auto {
            Some(self.execute(&request, &system).await)
        } else {
            None
        };

        self.sinks
            .notify(ApprovalEvent::Submitted {
                request_id: request.request_id.clone(),
                script_id: request.script_id.clone(),
                status: request.status,
                requester_id: request.requester_id.clone(),
            })
            .await;

        Ok(Submission {
            request_id: request.request_id,
            status: request.status,
            outcome,
        })
    }

    pub async fn approve(
        &self,
        request_id: &str,
        approver: &Actor,
        comment: Option<String>,
    ) -> Result<ApprovalOutcome, AppError> {
        require_permission(self.permissions.as_ref(), &approver.id, SCRIPT_APPROVE).await?;

        let request = self
            .decide(request_id, RequestStatus::Approved, HistoryAction::Approve, approver, comment)
            .await?;
        let outcome = self.execute(&request, approver).await;

        self.sinks
            .notify(ApprovalEvent::Decided {
                request_id: request.request_id.clone(),
                script_id: request.script_id.clone(),
                status: request.status,
                reviewer_id: approver.id.clone(),
            })
            .await;
        Ok(outcome)
    }

    pub async fn reject(
        &self,
        request_id: &str,
        reviewer: &Actor,
        comment: &str,
    ) -> Result<ApprovalRequest, AppError> {
        require_permission(self.permissions.as_ref(), &reviewer.id, SCRIPT_REJECT).await?;

        let request = self
            .decide(
                request_id,
                RequestStatus::Rejected,
                HistoryAction::Reject,
                reviewer,
                Some(comment.to_string()),
            )
            .await?;

        self.sinks
            .notify(ApprovalEvent::Decided {
                request_id: request.request_id.clone(),
                script_id: request.script_id.clone(),
                status: request.status,
                reviewer_id: reviewer.id.clone(),
            })
            .await;
        Ok(request)
    }

    /// Pull back a pending request. Only its requester may do this.
    pub async fn withdraw(
        &self,
        request_id: &str,
        requester: &Actor,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, AppError> {
        let request = self.get_request(request_id).await?;
        if request.requester_id != requester.id {
            return Err(AppError::Forbidden(format!(
                "only the requester may withdraw {request_id}"
            )));
        }
        self.decide(
            request_id,
            RequestStatus::Withdrawn,
            HistoryAction::Withdraw,
            requester,
            reason,
        )
        .await
    }

    pub async fn get_request(&self, request_id: &str) -> Result<ApprovalRequest, AppError> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or_else(|| AppError::not_found("approval request", request_id))
    }

    /// Pending requests, newest submission first.
    pub async fn get_pending(&self, filter: &RequestFilter, page: PageRequest) -> Result<Paged<ApprovalRequest>, AppError> {
        self.store
            .list_requests(&[RequestStatus::Pending], filter, RequestOrder::RequestedAtDesc, page)
            .await
    }

    /// Decided or withdrawn requests, most recent decision first.
    pub async fn get_completed(&self, filter: &RequestFilter, page: PageRequest) -> Result<Paged<ApprovalRequest>, AppError> {
        self.store
            .list_requests(RequestStatus::completed(), filter, RequestOrder::UpdatedAtDesc, page)
            .await
    }

    pub async fn get_history(&self, request_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        self.history.query_by_request(request_id).await
    }

    pub async fn get_script_history(&self, script_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        self.history.query_by_script(script_id).await
    }

    pub async fn count_by_status(&self, status: RequestStatus) -> Result<i64, AppError> {
        self.store.count_requests(status).await
    }

    /// Move a pending request to `to` and log it.
    async fn decide(
        &self,
        request_id: &str,
        to: RequestStatus,
        action: HistoryAction,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<ApprovalRequest, AppError> {
        let current = self.get_request(request_id).await?;
        if current.status != RequestStatus::Pending {
            return Err(AppError::StaleState {
                expected: RequestStatus::Pending,
                actual: current.status,
            });
        }

        let now = Utc::now();
        let transition = StatusTransition {
            request_id: request_id.to_string(),
            from: RequestStatus::Pending,
            to,
            actor: actor.clone(),
            comment: comment.clone(),
            at: now,
        };
        let entry = history::entry_for(
            request_id,
            &current.script_id,
            action,
            actor,
            RequestStatus::Pending,
            to,
            comment,
            now,
        );
        let updated = self.history.record_transition(&transition, entry).await?;

        log::info!("Request {} {} by {}", request_id, to, actor.id);
        Ok(updated)
    }

    async fn execute(&self, request: &ApprovalRequest, approver: &Actor) -> ApprovalOutcome {
        match apply::apply_approved_change(
            self.store.as_ref(),
            &self.versions,
            &self.sinks,
            request,
            approver,
        )
        .await
        {
            Ok(version_id) => ApprovalOutcome::Committed {
                request_id: request.request_id.clone(),
                version_id,
            },
            Err(e) => {
                log::error!(
                    "Approved request {} could not be applied to script {}: {}",
                    request.request_id,
                    request.script_id,
                    e
                );
                ApprovalOutcome::CommittedWithExecutionError {
                    request_id: request.request_id.clone(),
                    error: e.to_string(),
                }
            }
        }
    }
}

fn validate_submission(input: &SubmitRequest) -> Result<(), AppError> {
    if input.script_id.trim().is_empty() {
        return Err(AppError::Validation("script id is required".into()));
    }
    if input.operation_type.requires_payload() {
        let document = input.original_data.as_ref().ok_or_else(|| {
            AppError::Validation(format!("{} requires the proposed script document", input.operation_type))
        })?;
        let content = ScriptContent::from_document(document)?;
        if content.sql_content != input.sql_content {
            return Err(AppError::Validation(
                "sql_content does not match the proposed script document".into(),
            ));
        }
    }
    Ok(())
}

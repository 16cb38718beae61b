use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::Actor;
use crate::errors::AppError;
use crate::ids;
use crate::models::approval_history::{ApprovalHistoryEntry, HistoryAction};
use crate::models::approval_request::{ApprovalRequest, RequestStatus, StatusTransition};
use crate::store::DocumentStore;

/// Append-only log of request transitions.
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn DocumentStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        HistoryRecorder { store }
    }

    /// Insert `entry` after checking it continues the request's recorded walk.
    pub async fn append(&self, entry: ApprovalHistoryEntry) -> Result<ApprovalHistoryEntry, AppError> {
        let existing = self.store.history_for_request(&entry.request_id).await?;
        let last = existing
            .first()
            .map(|e| e.new_status)
            .unwrap_or(RequestStatus::Draft);
        entry.follows(last)?;

        self.store.append_history(&entry).await?;
        log::debug!(
            "History {} for request {}: {} -> {}",
            entry.action,
            entry.request_id,
            entry.previous_status,
            entry.new_status
        );
        Ok(entry)
    }

    /// Store a new request together with the entry for its first move.
    /// Neither is persisted if either write fails.
    pub async fn record_submission(
        &self,
        request: &ApprovalRequest,
        entry: ApprovalHistoryEntry,
    ) -> Result<ApprovalHistoryEntry, AppError> {
        self.store.insert_request(request, &entry).await?;
        log::debug!(
            "History {} for new request {}: {} -> {}",
            entry.action,
            entry.request_id,
            entry.previous_status,
            entry.new_status
        );
        Ok(entry)
    }

    /// Compare-and-set a request's status and log the move in one step.
    pub async fn record_transition(
        &self,
        transition: &StatusTransition,
        entry: ApprovalHistoryEntry,
    ) -> Result<ApprovalRequest, AppError> {
        let updated = self.store.transition_request(transition, &entry).await?;
        log::debug!(
            "History {} for request {}: {} -> {}",
            entry.action,
            entry.request_id,
            entry.previous_status,
            entry.new_status
        );
        Ok(updated)
    }

    /// Newest first.
    pub async fn query_by_request(&self, request_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        self.store.history_for_request(request_id).await
    }

    /// Newest first.
    pub async fn query_by_script(&self, script_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        self.store.history_for_script(script_id).await
    }
}

/// Build an entry for a move `from -> to` on a request.
#[allow(clippy::too_many_arguments)]
pub fn entry_for(
    request_id: &str,
    script_id: &str,
    action: HistoryAction,
    actor: &Actor,
    from: RequestStatus,
    to: RequestStatus,
    comment: Option<String>,
    at: DateTime<Utc>,
) -> ApprovalHistoryEntry {
    ApprovalHistoryEntry {
        history_id: ids::history_id(),
        request_id: request_id.to_string(),
        script_id: script_id.to_string(),
        action,
        action_by: actor.id.clone(),
        action_by_email: actor.email.clone(),
        action_at: at,
        previous_status: from,
        new_status: to,
        comment,
        metadata: None,
    }
}

/// Check that oldest-first `entries` for one request form a legal walk starting at draft.
pub fn validate_walk(entries: &[ApprovalHistoryEntry]) -> Result<(), AppError> {
    let mut last = RequestStatus::Draft;
    for entry in entries {
        entry.follows(last)?;
        last = entry.new_status;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(action: HistoryAction, from: RequestStatus, to: RequestStatus) -> ApprovalHistoryEntry {
        entry_for(
            "req_1",
            "script-1",
            action,
            &Actor::new("u1", "u1@example.com"),
            from,
            to,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn submit_then_approve_is_a_walk() {
        let walk = vec![
            step(HistoryAction::Submit, RequestStatus::Draft, RequestStatus::Pending),
            step(HistoryAction::Approve, RequestStatus::Pending, RequestStatus::Approved),
        ];
        assert!(validate_walk(&walk).is_ok());
    }

    #[test]
    fn auto_approval_is_a_single_step() {
        let walk = vec![step(HistoryAction::Approve, RequestStatus::Draft, RequestStatus::Approved)];
        assert!(validate_walk(&walk).is_ok());
    }

    #[test]
    fn broken_continuity_is_stale() {
        let walk = vec![
            step(HistoryAction::Submit, RequestStatus::Draft, RequestStatus::Pending),
            step(HistoryAction::Approve, RequestStatus::Pending, RequestStatus::Approved),
            step(HistoryAction::Reject, RequestStatus::Pending, RequestStatus::Rejected),
        ];
        let err = validate_walk(&walk).unwrap_err();
        assert!(err.is_stale(), "got {err}");
    }

    #[test]
    fn illegal_edge_is_rejected() {
        let walk = vec![step(HistoryAction::Reject, RequestStatus::Draft, RequestStatus::Rejected)];
        assert!(matches!(validate_walk(&walk), Err(AppError::Validation(_))));
    }
}

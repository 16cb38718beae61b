use chrono::Utc;

use crate::audit::{EditHistoryRecord, EditOperation, Sinks};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::approval_request::{ApprovalRequest, OperationType, RequestStatus};
use crate::models::script::{Script, ScriptContent};
use crate::models::script_version::{ChangeType, NewScriptVersion, VersionBump};
use crate::store::DocumentStore;
use crate::versioning::VersionService;

/// Carry out an approved request against the script record.
///
/// Returns the id of the version it created, if any. Every failure comes back
/// as [`AppError::Execution`]; the approval itself has already committed.
pub(crate) async fn apply_approved_change(
    store: &dyn DocumentStore,
    versions: &VersionService,
    sinks: &Sinks,
    request: &ApprovalRequest,
    approver: &Actor,
) -> Result<Option<String>, AppError> {
    let result = match request.operation_type {
        OperationType::Create => apply_create(store, versions, sinks, request, approver).await,
        OperationType::Update => apply_update(store, versions, sinks, request, approver).await,
        OperationType::Delete => apply_delete(store, sinks, request, approver).await,
    };
    sinks.clear_cache().await;

    result.map_err(|e| match e {
        AppError::Execution(_) => e,
        other => AppError::Execution(other.to_string()),
    })
}

fn proposed_content(request: &ApprovalRequest) -> Result<ScriptContent, AppError> {
    let document = request.original_data.as_ref().ok_or_else(|| {
        AppError::Execution(format!("request {} carries no script document", request.request_id))
    })?;
    ScriptContent::from_document(document)
}

fn stamp_approved(script: &mut Script, request: &ApprovalRequest, approver: &Actor) {
    let now = Utc::now();
    script.approval_status = Some(RequestStatus::Approved);
    script.approval_request_id = Some(request.request_id.clone());
    script.approved_by = Some(approver.id.clone());
    script.approved_at = Some(now);
    script.updated_at = now;
}

fn new_version(request: &ApprovalRequest, content: ScriptContent, change_type: ChangeType, bump: VersionBump) -> NewScriptVersion {
    NewScriptVersion {
        script_id: request.script_id.clone(),
        content,
        author: Actor::new(request.requester_id.clone(), request.requester_email.clone()),
        change_type,
        change_description: Some(request.title.clone()).filter(|t| !t.is_empty()),
        bump,
        approval_request_id: Some(request.request_id.clone()),
        approval_status: Some(RequestStatus::Approved),
    }
}

async fn apply_create(
    store: &dyn DocumentStore,
    versions: &VersionService,
    sinks: &Sinks,
    request: &ApprovalRequest,
    approver: &Actor,
) -> Result<Option<String>, AppError> {
    let content = proposed_content(request)?;
    let mut script = Script::new(request.script_id.clone(), content.clone(), Utc::now());
    stamp_approved(&mut script, request, approver);
    store.insert_script(&script).await?;

    sinks
        .record_edit(EditHistoryRecord {
            script_id: script.script_id.clone(),
            operation: EditOperation::Create,
            old_data: None,
            new_data: Some(script.to_document()),
            actor_id: approver.id.clone(),
            recorded_at: script.updated_at,
        })
        .await;

    let version = versions
        .create_version(new_version(request, content, ChangeType::Create, VersionBump::Minor))
        .await?;
    Ok(Some(version.version_id))
}

async fn apply_update(
    store: &dyn DocumentStore,
    versions: &VersionService,
    sinks: &Sinks,
    request: &ApprovalRequest,
    approver: &Actor,
) -> Result<Option<String>, AppError> {
    let content = proposed_content(request)?;
    let mut script = store.find_script(&request.script_id).await?.ok_or_else(|| {
        AppError::Execution(format!("script {} no longer exists", request.script_id))
    })?;
    let old_data = script.to_document();

    script.content = content.clone();
    stamp_approved(&mut script, request, approver);
    if !store.replace_script(&script).await? {
        return Err(AppError::Execution(format!(
            "script {} disappeared during update",
            request.script_id
        )));
    }

    sinks
        .record_edit(EditHistoryRecord {
            script_id: script.script_id.clone(),
            operation: EditOperation::Update,
            old_data: Some(old_data),
            new_data: Some(script.to_document()),
            actor_id: approver.id.clone(),
            recorded_at: script.updated_at,
        })
        .await;

    let version = versions
        .create_version(new_version(request, content, ChangeType::Update, VersionBump::Patch))
        .await?;
    Ok(Some(version.version_id))
}

async fn apply_delete(
    store: &dyn DocumentStore,
    sinks: &Sinks,
    request: &ApprovalRequest,
    approver: &Actor,
) -> Result<Option<String>, AppError> {
    let script = store.find_script(&request.script_id).await?.ok_or_else(|| {
        AppError::Execution(format!("script {} no longer exists", request.script_id))
    })?;
    if !store.delete_script(&script.script_id).await? {
        return Err(AppError::Execution(format!(
            "script {} disappeared during delete",
            request.script_id
        )));
    }

    sinks
        .record_edit(EditHistoryRecord {
            script_id: script.script_id.clone(),
            operation: EditOperation::Delete,
            old_data: Some(script.to_document()),
            new_data: None,
            actor_id: approver.id.clone(),
            recorded_at: Utc::now(),
        })
        .await;

    Ok(None)
}

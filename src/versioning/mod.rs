//! Semantically-versioned snapshots of script content.
//!
//! Numbering and the single current-version pointer are owned by the
//! store (see [`DocumentStore::create_version`]); this layer adds rollback,
//! comparison, and the post-commit side effects.

pub mod diff;

use std::sync::Arc;

use chrono::Utc;

use crate::audit::{ApprovalEvent, EditHistoryRecord, EditOperation, Sinks};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::paging::{PageRequest, Paged};
use crate::models::script_version::{
    ChangeType, NewScriptVersion, ScriptVersion, VersionBump, VersionStatistics,
};
use crate::store::DocumentStore;

pub use diff::{ChangeKind, FieldChange, LineDiff, VersionDiff};

#[derive(Clone)]
pub struct VersionService {
    store: Arc<dyn DocumentStore>,
    sinks: Sinks,
}

impl VersionService {
    pub fn new(store: Arc<dyn DocumentStore>, sinks: Sinks) -> Self {
        VersionService { store, sinks }
    }

    pub async fn create_version(&self, new: NewScriptVersion) -> Result<ScriptVersion, AppError> {
        if new.script_id.trim().is_empty() {
            return Err(AppError::Validation("script id is required".into()));
        }
        let version = self.store.create_version(new).await?;
        log::info!(
            "Created version {} of script {} ({})",
            version.version,
            version.script_id,
            version.change_type
        );
        Ok(version)
    }

    /// Re-publish the content of `target_version` as a new patch version.
    ///
    /// Not gated by the approval workflow.
    pub async fn rollback(
        &self,
        script_id: &str,
        target_version: &str,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<ScriptVersion, AppError> {
        let target = self.get_version(script_id, target_version).await?;

        let description = reason.unwrap_or_else(|| format!("Rollback to version {}", target.version));
        let version = self
            .create_version(NewScriptVersion {
                script_id: script_id.to_string(),
                content: target.content.clone(),
                author: actor.clone(),
                change_type: ChangeType::Rollback,
                change_description: Some(description),
                bump: VersionBump::Patch,
                approval_request_id: None,
                approval_status: None,
            })
            .await?;

        // The version is committed; everything below is best-effort.
        if let Err(e) = self.store.increment_rollback_count(&target.version_id).await {
            log::warn!(
                "Could not count rollback on {} of script {}: {}",
                target.version,
                script_id,
                e
            );
        }
        if let Err(e) = self.restore_script(&version, actor).await {
            log::warn!(
                "Rolled back script {} to {} but could not restore its record: {}",
                script_id,
                version.version,
                e
            );
        }

        self.sinks.clear_cache().await;
        self.sinks
            .notify(ApprovalEvent::RolledBack {
                script_id: script_id.to_string(),
                version: version.version.clone(),
                actor_id: actor.id.clone(),
            })
            .await;

        log::info!(
            "Rolled back script {} to {} as {}",
            script_id,
            target.version,
            version.version
        );
        Ok(version)
    }

    /// Copy a rollback version's content onto the script record.
    async fn restore_script(&self, version: &ScriptVersion, actor: &Actor) -> Result<(), AppError> {
        let Some(mut script) = self.store.find_script(&version.script_id).await? else {
            log::warn!("Rolled back script {} has no script record to restore", version.script_id);
            return Ok(());
        };
        let old_data = script.to_document();
        script.content = version.content.clone();
        script.updated_at = version.created_at;
        if self.store.replace_script(&script).await? {
            self.sinks
                .record_edit(EditHistoryRecord {
                    script_id: version.script_id.clone(),
                    operation: EditOperation::Rollback,
                    old_data: Some(old_data),
                    new_data: Some(script.to_document()),
                    actor_id: actor.id.clone(),
                    recorded_at: version.created_at,
                })
                .await;
        }
        Ok(())
    }

    pub async fn compare(
        &self,
        script_id: &str,
        from_version: &str,
        to_version: &str,
    ) -> Result<VersionDiff, AppError> {
        let from = self.get_version(script_id, from_version).await?;
        let to = self.get_version(script_id, to_version).await?;
        Ok(VersionDiff::between(&from, &to))
    }

    pub async fn list_versions(&self, script_id: &str, page: PageRequest) -> Result<Paged<ScriptVersion>, AppError> {
        self.store.list_versions(script_id, page).await
    }

    pub async fn get_version(&self, script_id: &str, version: &str) -> Result<ScriptVersion, AppError> {
        self.store
            .find_version(script_id, version)
            .await?
            .ok_or_else(|| AppError::not_found("script version", &format!("{script_id}@{version}")))
    }

    pub async fn current_version(&self, script_id: &str) -> Result<Option<ScriptVersion>, AppError> {
        self.store.current_version(script_id).await
    }

    pub async fn get_statistics(&self, script_id: &str) -> Result<VersionStatistics, AppError> {
        self.store.version_statistics(script_id).await
    }

    /// Count one execution against the script's current version.
    pub async fn record_execution(&self, script_id: &str) -> Result<ScriptVersion, AppError> {
        self.store
            .record_execution(script_id, Utc::now())
            .await?
            .ok_or_else(|| AppError::not_found("current version of script", script_id))
    }
}

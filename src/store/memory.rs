use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::DocumentStore;
use crate::errors::AppError;
use crate::ids;
use crate::models::approval_history::ApprovalHistoryEntry;
use crate::models::approval_request::{
    ApprovalRequest, RequestFilter, RequestOrder, RequestStatus, StatusTransition,
};
use crate::models::paging::{PageRequest, Paged};
use crate::models::script::Script;
use crate::models::script_version::{NewScriptVersion, ScriptVersion, SemVer, VersionStatistics};

#[derive(Debug, Default)]
struct Collections {
    scripts: HashMap<String, Script>,
    requests: HashMap<String, ApprovalRequest>,
    /// Insertion order.
    history: Vec<ApprovalHistoryEntry>,
    /// Insertion order.
    versions: Vec<ScriptVersion>,
}

impl Collections {
    /// Status the request's recorded history ends at.
    fn last_status(&self, request_id: &str) -> RequestStatus {
        newest_history_first(self.history.iter().filter(|e| e.request_id == request_id))
            .first()
            .map(|e| e.new_status)
            .unwrap_or(RequestStatus::Draft)
    }
}

/// In-process document store. Every mutation runs under one write lock, so
/// the compare-and-set and per-script version serialization are trivially
/// atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every version of a script in creation order.
    pub async fn versions_of(&self, script_id: &str) -> Vec<ScriptVersion> {
        self.inner
            .read()
            .await
            .versions
            .iter()
            .filter(|v| v.script_id == script_id)
            .cloned()
            .collect()
    }
}

fn newest_history_first<'a>(
    entries: impl DoubleEndedIterator<Item = &'a ApprovalHistoryEntry>,
) -> Vec<ApprovalHistoryEntry> {
    // Reverse insertion order first so equal timestamps keep newest-first after the stable sort.
    let mut out: Vec<ApprovalHistoryEntry> = entries.rev().cloned().collect();
    out.sort_by(|a, b| b.action_at.cmp(&a.action_at));
    out
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_script(&self, script_id: &str) -> Result<Option<Script>, AppError> {
        Ok(self.inner.read().await.scripts.get(script_id).cloned())
    }

    async fn insert_script(&self, script: &Script) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.scripts.contains_key(&script.script_id) {
            return Err(AppError::Validation(format!(
                "script '{}' already exists",
                script.script_id
            )));
        }
        inner.scripts.insert(script.script_id.clone(), script.clone());
        Ok(())
    }

    async fn replace_script(&self, script: &Script) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        match inner.scripts.get_mut(&script.script_id) {
            Some(existing) => {
                existing.content = script.content.clone();
                existing.approval_status = script.approval_status;
                existing.approval_request_id = script.approval_request_id.clone();
                existing.approved_by = script.approved_by.clone();
                existing.approved_at = script.approved_at;
                existing.updated_at = script.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_script(&self, script_id: &str) -> Result<bool, AppError> {
        Ok(self.inner.write().await.scripts.remove(script_id).is_some())
    }

    async fn insert_request(&self, request: &ApprovalRequest, entry: &ApprovalHistoryEntry) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.requests.contains_key(&request.request_id) {
            return Err(AppError::Validation(format!(
                "request '{}' already exists",
                request.request_id
            )));
        }
        entry.follows(inner.last_status(&request.request_id))?;
        inner.requests.insert(request.request_id.clone(), request.clone());
        inner.history.push(entry.clone());
        Ok(())
    }

    async fn find_request(&self, request_id: &str) -> Result<Option<ApprovalRequest>, AppError> {
        Ok(self.inner.read().await.requests.get(request_id).cloned())
    }

    async fn transition_request(
        &self,
        transition: &StatusTransition,
        entry: &ApprovalHistoryEntry,
    ) -> Result<ApprovalRequest, AppError> {
        let mut inner = self.inner.write().await;
        let last = inner.last_status(&transition.request_id);
        let request = inner
            .requests
            .get_mut(&transition.request_id)
            .ok_or_else(|| AppError::not_found("approval request", &transition.request_id))?;
        if request.status != transition.from {
            return Err(AppError::StaleState {
                expected: transition.from,
                actual: request.status,
            });
        }
        entry.follows(last)?;
        request.apply_transition(transition);
        let updated = request.clone();
        inner.history.push(entry.clone());
        Ok(updated)
    }

    async fn list_requests(
        &self,
        statuses: &[RequestStatus],
        filter: &RequestFilter,
        order: RequestOrder,
        page: PageRequest,
    ) -> Result<Paged<ApprovalRequest>, AppError> {
        let inner = self.inner.read().await;
        let mut matching: Vec<ApprovalRequest> = inner
            .requests
            .values()
            .filter(|r| statuses.contains(&r.status) && filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            let key = match order {
                RequestOrder::RequestedAtDesc => b.requested_at.cmp(&a.requested_at),
                RequestOrder::UpdatedAtDesc => b.updated_at.cmp(&a.updated_at),
            };
            key.then_with(|| a.request_id.cmp(&b.request_id))
        });
        Ok(Paged::from_sorted(matching, page))
    }

    async fn count_requests(&self, status: RequestStatus) -> Result<i64, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.requests.values().filter(|r| r.status == status).count() as i64)
    }

    async fn append_history(&self, entry: &ApprovalHistoryEntry) -> Result<(), AppError> {
        self.inner.write().await.history.push(entry.clone());
        Ok(())
    }

    async fn history_for_request(&self, request_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        let inner = self.inner.read().await;
        Ok(newest_history_first(
            inner.history.iter().filter(|e| e.request_id == request_id),
        ))
    }

    async fn history_for_script(&self, script_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        let inner = self.inner.read().await;
        Ok(newest_history_first(
            inner.history.iter().filter(|e| e.script_id == script_id),
        ))
    }

    async fn create_version(&self, new: NewScriptVersion) -> Result<ScriptVersion, AppError> {
        let mut inner = self.inner.write().await;

        let highest = inner
            .versions
            .iter()
            .filter(|v| v.script_id == new.script_id)
            .map(ScriptVersion::semver)
            .max();

        let mut previous_version_id = None;
        for v in inner
            .versions
            .iter_mut()
            .filter(|v| v.script_id == new.script_id && v.is_current_version)
        {
            v.demote();
            previous_version_id = Some(v.version_id.clone());
        }

        let number = SemVer::next_after(highest, new.bump);
        let version = new.into_version(ids::version_id(), number, previous_version_id, Utc::now());

        if let Some(script) = inner.scripts.get_mut(&version.script_id) {
            script.current_version_id = Some(version.version_id.clone());
            script.current_version = Some(version.version.clone());
            script.updated_at = version.created_at;
        }
        inner.versions.push(version.clone());

        Ok(version)
    }

    async fn find_version(&self, script_id: &str, version: &str) -> Result<Option<ScriptVersion>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .versions
            .iter()
            .find(|v| v.script_id == script_id && v.version == version)
            .cloned())
    }

    async fn current_version(&self, script_id: &str) -> Result<Option<ScriptVersion>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .versions
            .iter()
            .find(|v| v.script_id == script_id && v.is_current_version)
            .cloned())
    }

    async fn list_versions(&self, script_id: &str, page: PageRequest) -> Result<Paged<ScriptVersion>, AppError> {
        let mut versions = self.versions_of(script_id).await;
        versions.sort_by_key(|v| std::cmp::Reverse(v.semver()));
        Ok(Paged::from_sorted(versions, page))
    }

    async fn increment_rollback_count(&self, version_id: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let version = inner
            .versions
            .iter_mut()
            .find(|v| v.version_id == version_id)
            .ok_or_else(|| AppError::not_found("script version", version_id))?;
        version.rollback_count += 1;
        Ok(())
    }

    async fn record_execution(&self, script_id: &str, at: DateTime<Utc>) -> Result<Option<ScriptVersion>, AppError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .versions
            .iter_mut()
            .find(|v| v.script_id == script_id && v.is_current_version)
            .map(|v| {
                v.execution_count += 1;
                v.last_executed_at = Some(at);
                v.clone()
            }))
    }

    async fn version_statistics(&self, script_id: &str) -> Result<VersionStatistics, AppError> {
        let versions = self.versions_of(script_id).await;
        Ok(VersionStatistics::from_versions(script_id, &versions))
    }
}

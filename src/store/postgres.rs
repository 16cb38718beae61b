use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::DocumentStore;
use crate::errors::AppError;
use crate::ids;
use crate::models::approval_history::{self, ApprovalHistoryEntry};
use crate::models::approval_request::{
    self, ApprovalRequest, RequestFilter, RequestOrder, RequestStatus, StatusTransition,
};
use crate::models::paging::{PageRequest, Paged};
use crate::models::script::{self, Script};
use crate::models::script_version::{self, NewScriptVersion, ScriptVersion, VersionStatistics};

/// Postgres-backed document store. Each collection is a table; see `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

fn is_unique_violation(e: &AppError) -> bool {
    match e {
        AppError::Db(sqlx::Error::Database(db)) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find_script(&self, script_id: &str) -> Result<Option<Script>, AppError> {
        script::queries::find_by_id(&self.pool, script_id).await
    }

    async fn insert_script(&self, script: &Script) -> Result<(), AppError> {
        script::queries::insert(&self.pool, script).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation(format!("script '{}' already exists", script.script_id))
            } else {
                e
            }
        })
    }

    async fn replace_script(&self, script: &Script) -> Result<bool, AppError> {
        script::queries::replace(&self.pool, script).await
    }

    async fn delete_script(&self, script_id: &str) -> Result<bool, AppError> {
        script::queries::delete(&self.pool, script_id).await
    }

    async fn insert_request(&self, request: &ApprovalRequest, entry: &ApprovalHistoryEntry) -> Result<(), AppError> {
        entry.follows(RequestStatus::Draft)?;
        let mut tx = self.pool.begin().await?;
        approval_request::queries::insert(&mut *tx, request).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation(format!("request '{}' already exists", request.request_id))
            } else {
                e
            }
        })?;
        approval_history::queries::insert(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_request(&self, request_id: &str) -> Result<Option<ApprovalRequest>, AppError> {
        approval_request::queries::find_by_id(&self.pool, request_id).await
    }

    async fn transition_request(
        &self,
        transition: &StatusTransition,
        entry: &ApprovalHistoryEntry,
    ) -> Result<ApprovalRequest, AppError> {
        let mut tx = self.pool.begin().await?;
        // The conditional UPDATE holds the row lock until commit, so the
        // history read below cannot race another transition.
        let updated = approval_request::queries::transition(&mut *tx, transition).await?;
        let last = approval_history::queries::last_status(&mut *tx, &transition.request_id).await?;
        entry.follows(last)?;
        approval_history::queries::insert(&mut *tx, entry).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn list_requests(
        &self,
        statuses: &[RequestStatus],
        filter: &RequestFilter,
        order: RequestOrder,
        page: PageRequest,
    ) -> Result<Paged<ApprovalRequest>, AppError> {
        approval_request::queries::find_paginated(&self.pool, statuses, filter, order, page).await
    }

    async fn count_requests(&self, status: RequestStatus) -> Result<i64, AppError> {
        approval_request::queries::count_by_status(&self.pool, status).await
    }

    async fn append_history(&self, entry: &ApprovalHistoryEntry) -> Result<(), AppError> {
        approval_history::queries::insert(&self.pool, entry).await
    }

    async fn history_for_request(&self, request_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        approval_history::queries::find_by_request(&self.pool, request_id).await
    }

    async fn history_for_script(&self, script_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        approval_history::queries::find_by_script(&self.pool, script_id).await
    }

    async fn create_version(&self, new: NewScriptVersion) -> Result<ScriptVersion, AppError> {
        script_version::queries::create_next(&self.pool, new, ids::version_id()).await
    }

    async fn find_version(&self, script_id: &str, version: &str) -> Result<Option<ScriptVersion>, AppError> {
        script_version::queries::find_by_version(&self.pool, script_id, version).await
    }

    async fn current_version(&self, script_id: &str) -> Result<Option<ScriptVersion>, AppError> {
        script_version::queries::find_current(&self.pool, script_id).await
    }

    async fn list_versions(&self, script_id: &str, page: PageRequest) -> Result<Paged<ScriptVersion>, AppError> {
        script_version::queries::find_paginated(&self.pool, script_id, page).await
    }

    async fn increment_rollback_count(&self, version_id: &str) -> Result<(), AppError> {
        script_version::queries::increment_rollback_count(&self.pool, version_id).await
    }

    async fn record_execution(&self, script_id: &str, at: DateTime<Utc>) -> Result<Option<ScriptVersion>, AppError> {
        script_version::queries::record_execution(&self.pool, script_id, at).await
    }

    async fn version_statistics(&self, script_id: &str) -> Result<VersionStatistics, AppError> {
        script_version::queries::statistics(&self.pool, script_id).await
    }
}

//! Side-effect sinks invoked after a state change has committed.
//!
//! Callers go through [`Sinks`], which swallows and logs every failure: a
//! sink can never undo an approval or a version that is already stored.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::approval_request::{OperationType, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOperation {
    Create,
    Update,
    Delete,
    Rollback,
}

impl EditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditOperation::Create => "create",
            EditOperation::Update => "update",
            EditOperation::Delete => "delete",
            EditOperation::Rollback => "rollback",
        }
    }
}

impl From<OperationType> for EditOperation {
    fn from(op: OperationType) -> Self {
        match op {
            OperationType::Create => EditOperation::Create,
            OperationType::Update => EditOperation::Update,
            OperationType::Delete => EditOperation::Delete,
        }
    }
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after snapshot of one mutation of a script record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditHistoryRecord {
    pub script_id: String,
    pub operation: EditOperation,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub actor_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// Something worth telling reviewers about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ApprovalEvent {
    Submitted {
        request_id: String,
        script_id: String,
        status: RequestStatus,
        requester_id: String,
    },
    Decided {
        request_id: String,
        script_id: String,
        status: RequestStatus,
        reviewer_id: String,
    },
    RolledBack {
        script_id: String,
        version: String,
        actor_id: String,
    },
}

#[async_trait]
pub trait EditHistorySink: Send + Sync {
    async fn record(&self, record: &EditHistoryRecord) -> Result<(), AppError>;
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn clear_scripts_cache(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &ApprovalEvent) -> Result<(), AppError>;
}

/// Writes edit-history records to the application log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEditHistory;

#[async_trait]
impl EditHistorySink for LogEditHistory {
    async fn record(&self, record: &EditHistoryRecord) -> Result<(), AppError> {
        log::info!(
            "edit history: {} {} by {}",
            record.operation,
            record.script_id,
            record.actor_id
        );
        Ok(())
    }
}

/// Persists edit-history records to `script_edit_history`.
#[derive(Debug, Clone)]
pub struct PgEditHistory {
    pool: PgPool,
}

impl PgEditHistory {
    pub fn new(pool: PgPool) -> Self {
        PgEditHistory { pool }
    }
}

#[async_trait]
impl EditHistorySink for PgEditHistory {
    async fn record(&self, record: &EditHistoryRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO script_edit_history (script_id, operation, old_data, new_data, actor_id, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.script_id)
        .bind(record.operation.as_str())
        .bind(&record.old_data)
        .bind(&record.new_data)
        .bind(&record.actor_id)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// There is no scripts cache in this process; clearing only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheInvalidator for NoopCache {
    async fn clear_scripts_cache(&self) -> Result<(), AppError> {
        log::debug!("scripts cache cleared");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &ApprovalEvent) -> Result<(), AppError> {
        let body = serde_json::to_string(event)?;
        log::info!("notify: {body}");
        Ok(())
    }
}

/// The three post-commit collaborators bundled together.
#[derive(Clone)]
pub struct Sinks {
    pub edit_history: Arc<dyn EditHistorySink>,
    pub cache: Arc<dyn CacheInvalidator>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for Sinks {
    fn default() -> Self {
        Sinks {
            edit_history: Arc::new(LogEditHistory),
            cache: Arc::new(NoopCache),
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl Sinks {
    pub async fn record_edit(&self, record: EditHistoryRecord) {
        if let Err(e) = self.edit_history.record(&record).await {
            log::warn!(
                "Failed to record edit history for script {}: {}",
                record.script_id,
                e
            );
        }
    }

    pub async fn clear_cache(&self) {
        if let Err(e) = self.cache.clear_scripts_cache().await {
            log::warn!("Failed to clear scripts cache: {}", e);
        }
    }

    pub async fn notify(&self, event: ApprovalEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            log::warn!("Failed to send notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DownNotifier;

    #[async_trait]
    impl Notifier for DownNotifier {
        async fn notify(&self, _event: &ApprovalEvent) -> Result<(), AppError> {
            Err(AppError::Execution("webhook timed out".into()))
        }
    }

    #[tokio::test]
    async fn failing_sinks_are_swallowed() {
        let sinks = Sinks {
            notifier: Arc::new(DownNotifier),
            ..Sinks::default()
        };
        sinks
            .record_edit(EditHistoryRecord {
                script_id: "s1".into(),
                operation: OperationType::Delete.into(),
                old_data: None,
                new_data: None,
                actor_id: "u1".into(),
                recorded_at: Utc::now(),
            })
            .await;
        sinks.clear_cache().await;
        sinks
            .notify(ApprovalEvent::RolledBack {
                script_id: "s1".into(),
                version: "1.0.1".into(),
                actor_id: "u1".into(),
            })
            .await;
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let event = ApprovalEvent::Decided {
            request_id: "req_1".into(),
            script_id: "s1".into(),
            status: RequestStatus::Rejected,
            reviewer_id: "admin".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "decided");
        assert_eq!(value["status"], "rejected");
    }
}

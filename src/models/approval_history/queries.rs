use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use super::types::*;
use crate::models::approval_request::RequestStatus;
use crate::errors::AppError;

const HISTORY_COLUMNS: &str = "\
    history_id, request_id, script_id, action, action_by, action_by_email, \
    action_at, previous_status, new_status, comment, metadata";

#[derive(sqlx::FromRow)]
struct Row {
    history_id: String,
    request_id: String,
    script_id: String,
    action: String,
    action_by: String,
    action_by_email: String,
    action_at: DateTime<Utc>,
    previous_status: String,
    new_status: String,
    comment: Option<String>,
    metadata: Option<serde_json::Value>,
}

impl TryFrom<Row> for ApprovalHistoryEntry {
    type Error = AppError;

    fn try_from(r: Row) -> Result<Self, AppError> {
        Ok(ApprovalHistoryEntry {
            history_id: r.history_id,
            request_id: r.request_id,
            script_id: r.script_id,
            action: r.action.parse()?,
            action_by: r.action_by,
            action_by_email: r.action_by_email,
            action_at: r.action_at,
            previous_status: r.previous_status.parse()?,
            new_status: r.new_status.parse()?,
            comment: r.comment,
            metadata: r.metadata,
        })
    }
}

/// Append one entry. Entries are never updated or deleted.
pub async fn insert<'c, E: PgExecutor<'c>>(executor: E, entry: &ApprovalHistoryEntry) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO approval_history (
            history_id, request_id, script_id, action, action_by, action_by_email,
            action_at, previous_status, new_status, comment, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(&entry.history_id)
    .bind(&entry.request_id)
    .bind(&entry.script_id)
    .bind(entry.action.as_str())
    .bind(&entry.action_by)
    .bind(&entry.action_by_email)
    .bind(entry.action_at)
    .bind(entry.previous_status.as_str())
    .bind(entry.new_status.as_str())
    .bind(&entry.comment)
    .bind(&entry.metadata)
    .execute(executor)
    .await?;

    Ok(())
}

/// Status the request's recorded history ends at; draft if it has none.
pub async fn last_status<'c, E: PgExecutor<'c>>(executor: E, request_id: &str) -> Result<RequestStatus, AppError> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT new_status FROM approval_history \
         WHERE request_id = $1 ORDER BY action_at DESC, seq DESC LIMIT 1",
    )
    .bind(request_id)
    .fetch_optional(executor)
    .await?;
    match row {
        Some((status,)) => status.parse(),
        None => Ok(RequestStatus::Draft),
    }
}

/// All entries for a request, newest first.
pub async fn find_by_request(pool: &PgPool, request_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
    let sql = format!(
        "SELECT {HISTORY_COLUMNS} FROM approval_history \
         WHERE request_id = $1 ORDER BY action_at DESC, seq DESC"
    );
    let rows = sqlx::query_as::<_, Row>(&sql)
        .bind(request_id)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(ApprovalHistoryEntry::try_from).collect()
}

/// All entries for a script across its requests, newest first.
pub async fn find_by_script(pool: &PgPool, script_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
    let sql = format!(
        "SELECT {HISTORY_COLUMNS} FROM approval_history \
         WHERE script_id = $1 ORDER BY action_at DESC, seq DESC"
    );
    let rows = sqlx::query_as::<_, Row>(&sql)
        .bind(script_id)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(ApprovalHistoryEntry::try_from).collect()
}

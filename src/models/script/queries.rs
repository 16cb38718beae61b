use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use super::types::*;
use crate::errors::AppError;

const SCRIPT_COLUMNS: &str = "\
    script_id, name, name_en, description, description_en, scope, scope_en, author, \
    hashtags, sql_content, approval_status, approval_request_id, approved_by, approved_at, \
    current_version_id, current_version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct Row {
    script_id: String,
    name: String,
    name_en: Option<String>,
    description: Option<String>,
    description_en: Option<String>,
    scope: Option<String>,
    scope_en: Option<String>,
    author: String,
    hashtags: Vec<String>,
    sql_content: String,
    approval_status: Option<String>,
    approval_request_id: Option<String>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    current_version_id: Option<String>,
    current_version: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<Row> for Script {
    type Error = AppError;

    fn try_from(r: Row) -> Result<Self, AppError> {
        Ok(Script {
            script_id: r.script_id,
            content: ScriptContent {
                name: r.name,
                name_en: r.name_en,
                description: r.description,
                description_en: r.description_en,
                scope: r.scope,
                scope_en: r.scope_en,
                author: r.author,
                hashtags: r.hashtags,
                sql_content: r.sql_content,
            },
            approval_status: r.approval_status.map(|s| s.parse()).transpose()?,
            approval_request_id: r.approval_request_id,
            approved_by: r.approved_by,
            approved_at: r.approved_at,
            current_version_id: r.current_version_id,
            current_version: r.current_version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Find a script record by id.
pub async fn find_by_id(pool: &PgPool, script_id: &str) -> Result<Option<Script>, AppError> {
    let sql = format!("SELECT {SCRIPT_COLUMNS} FROM scripts WHERE script_id = $1");
    let row = sqlx::query_as::<_, Row>(&sql)
        .bind(script_id)
        .fetch_optional(pool)
        .await?;
    row.map(Script::try_from).transpose()
}

/// Insert a new script record. Fails if the id is already taken.
pub async fn insert(pool: &PgPool, script: &Script) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO scripts (
            script_id, name, name_en, description, description_en, scope, scope_en, author,
            hashtags, sql_content, approval_status, approval_request_id, approved_by, approved_at,
            current_version_id, current_version, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
    )
    .bind(&script.script_id)
    .bind(&script.content.name)
    .bind(&script.content.name_en)
    .bind(&script.content.description)
    .bind(&script.content.description_en)
    .bind(&script.content.scope)
    .bind(&script.content.scope_en)
    .bind(&script.content.author)
    .bind(&script.content.hashtags)
    .bind(&script.content.sql_content)
    .bind(script.approval_status.map(|s| s.as_str()))
    .bind(&script.approval_request_id)
    .bind(&script.approved_by)
    .bind(script.approved_at)
    .bind(&script.current_version_id)
    .bind(&script.current_version)
    .bind(script.created_at)
    .bind(script.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite content and approval stamps. The id, creation time and version
/// pointer are left alone. Returns false if no such script exists.
pub async fn replace(pool: &PgPool, script: &Script) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE scripts SET
            name = $2, name_en = $3, description = $4, description_en = $5,
            scope = $6, scope_en = $7, author = $8, hashtags = $9, sql_content = $10,
            approval_status = $11, approval_request_id = $12, approved_by = $13,
            approved_at = $14, updated_at = $15
         WHERE script_id = $1",
    )
    .bind(&script.script_id)
    .bind(&script.content.name)
    .bind(&script.content.name_en)
    .bind(&script.content.description)
    .bind(&script.content.description_en)
    .bind(&script.content.scope)
    .bind(&script.content.scope_en)
    .bind(&script.content.author)
    .bind(&script.content.hashtags)
    .bind(&script.content.sql_content)
    .bind(script.approval_status.map(|s| s.as_str()))
    .bind(&script.approval_request_id)
    .bind(&script.approved_by)
    .bind(script.approved_at)
    .bind(script.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a script record. Returns false if it did not exist.
pub async fn delete(pool: &PgPool, script_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM scripts WHERE script_id = $1")
        .bind(script_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Point the script's denormalized current-version fields at a new version.
pub async fn set_current_version<'c, E: PgExecutor<'c>>(
    executor: E,
    script_id: &str,
    version_id: &str,
    version: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE scripts SET current_version_id = $2, current_version = $3, updated_at = NOW() \
         WHERE script_id = $1",
    )
    .bind(script_id)
    .bind(version_id)
    .bind(version)
    .execute(executor)
    .await?;
    Ok(())
}

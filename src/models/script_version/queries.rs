use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use super::semver::SemVer;
use super::types::*;
use crate::errors::AppError;
use crate::models::paging::{PageRequest, Paged};
use crate::models::script;
use crate::models::script::ScriptContent;

const VERSION_COLUMNS: &str = "\
    version_id, script_id, version, major_version, minor_version, patch_version, status, \
    is_current_version, name, name_en, description, description_en, scope, scope_en, author, \
    hashtags, sql_content, created_by, created_by_email, created_at, approval_status, \
    approval_request_id, change_type, change_description, previous_version_id, \
    execution_count, last_executed_at, rollback_count";

const NEWEST_FIRST: &str = "major_version DESC, minor_version DESC, patch_version DESC";

#[derive(sqlx::FromRow)]
struct Row {
    version_id: String,
    script_id: String,
    version: String,
    major_version: i32,
    minor_version: i32,
    patch_version: i32,
    status: String,
    is_current_version: bool,
    name: String,
    name_en: Option<String>,
    description: Option<String>,
    description_en: Option<String>,
    scope: Option<String>,
    scope_en: Option<String>,
    author: String,
    hashtags: Vec<String>,
    sql_content: String,
    created_by: String,
    created_by_email: String,
    created_at: DateTime<Utc>,
    approval_status: Option<String>,
    approval_request_id: Option<String>,
    change_type: String,
    change_description: Option<String>,
    previous_version_id: Option<String>,
    execution_count: i64,
    last_executed_at: Option<DateTime<Utc>>,
    rollback_count: i64,
}

impl TryFrom<Row> for ScriptVersion {
    type Error = AppError;

    fn try_from(r: Row) -> Result<Self, AppError> {
        Ok(ScriptVersion {
            version_id: r.version_id,
            script_id: r.script_id,
            version: r.version,
            major_version: r.major_version,
            minor_version: r.minor_version,
            patch_version: r.patch_version,
            status: r.status.parse()?,
            is_current_version: r.is_current_version,
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
            created_by: r.created_by,
            created_by_email: r.created_by_email,
            created_at: r.created_at,
            approval_status: r.approval_status.map(|s| s.parse()).transpose()?,
            approval_request_id: r.approval_request_id,
            change_type: r.change_type.parse()?,
            change_description: r.change_description,
            previous_version_id: r.previous_version_id,
            execution_count: r.execution_count,
            last_executed_at: r.last_executed_at,
            rollback_count: r.rollback_count,
        })
    }
}

async fn insert<'c, E: PgExecutor<'c>>(executor: E, v: &ScriptVersion) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO script_versions (
            version_id, script_id, version, major_version, minor_version, patch_version, status,
            is_current_version, name, name_en, description, description_en, scope, scope_en,
            author, hashtags, sql_content, created_by, created_by_email, created_at,
            approval_status, approval_request_id, change_type, change_description,
            previous_version_id, execution_count, last_executed_at, rollback_count)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                 $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)",
    )
    .bind(&v.version_id)
    .bind(&v.script_id)
    .bind(&v.version)
    .bind(v.major_version)
    .bind(v.minor_version)
    .bind(v.patch_version)
    .bind(v.status.as_str())
    .bind(v.is_current_version)
    .bind(&v.content.name)
    .bind(&v.content.name_en)
    .bind(&v.content.description)
    .bind(&v.content.description_en)
    .bind(&v.content.scope)
    .bind(&v.content.scope_en)
    .bind(&v.content.author)
    .bind(&v.content.hashtags)
    .bind(&v.content.sql_content)
    .bind(&v.created_by)
    .bind(&v.created_by_email)
    .bind(v.created_at)
    .bind(v.approval_status.map(|s| s.as_str()))
    .bind(&v.approval_request_id)
    .bind(v.change_type.as_str())
    .bind(&v.change_description)
    .bind(&v.previous_version_id)
    .bind(v.execution_count)
    .bind(v.last_executed_at)
    .bind(v.rollback_count)
    .execute(executor)
    .await?;
    Ok(())
}

/// Mint the next version for a script in one transaction.
///
/// A transaction-scoped advisory lock keyed on the script id serializes
/// version creation per script; the partial unique index on
/// `is_current_version` backs the single-current invariant.
pub async fn create_next(
    pool: &PgPool,
    new: NewScriptVersion,
    version_id: String,
) -> Result<ScriptVersion, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&new.script_id)
        .execute(&mut *tx)
        .await?;

    let highest: Option<(i32, i32, i32)> = sqlx::query_as(&format!(
        "SELECT major_version, minor_version, patch_version FROM script_versions \
         WHERE script_id = $1 ORDER BY {NEWEST_FIRST} LIMIT 1"
    ))
    .bind(&new.script_id)
    .fetch_optional(&mut *tx)
    .await?;

    let previous: Option<(String,)> = sqlx::query_as(
        "UPDATE script_versions SET is_current_version = FALSE, status = 'archived' \
         WHERE script_id = $1 AND is_current_version \
         RETURNING version_id",
    )
    .bind(&new.script_id)
    .fetch_optional(&mut *tx)
    .await?;

    let number = SemVer::next_after(
        highest.map(|(major, minor, patch)| SemVer::new(major, minor, patch)),
        new.bump,
    );
    let version = new.into_version(version_id, number, previous.map(|p| p.0), Utc::now());

    insert(&mut *tx, &version).await?;
    script::queries::set_current_version(&mut *tx, &version.script_id, &version.version_id, &version.version)
        .await?;

    tx.commit().await?;
    Ok(version)
}

/// Find a version of a script by its version string.
pub async fn find_by_version(
    pool: &PgPool,
    script_id: &str,
    version: &str,
) -> Result<Option<ScriptVersion>, AppError> {
    let sql = format!(
        "SELECT {VERSION_COLUMNS} FROM script_versions WHERE script_id = $1 AND version = $2"
    );
    let row = sqlx::query_as::<_, Row>(&sql)
        .bind(script_id)
        .bind(version)
        .fetch_optional(pool)
        .await?;
    row.map(ScriptVersion::try_from).transpose()
}

/// The script's current version, if it has one.
pub async fn find_current(pool: &PgPool, script_id: &str) -> Result<Option<ScriptVersion>, AppError> {
    let sql = format!(
        "SELECT {VERSION_COLUMNS} FROM script_versions WHERE script_id = $1 AND is_current_version"
    );
    let row = sqlx::query_as::<_, Row>(&sql)
        .bind(script_id)
        .fetch_optional(pool)
        .await?;
    row.map(ScriptVersion::try_from).transpose()
}

/// Versions of a script, newest first, paginated.
pub async fn find_paginated(
    pool: &PgPool,
    script_id: &str,
    page: PageRequest,
) -> Result<Paged<ScriptVersion>, AppError> {
    let (total_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM script_versions WHERE script_id = $1")
            .bind(script_id)
            .fetch_one(pool)
            .await?;

    let sql = format!(
        "SELECT {VERSION_COLUMNS} FROM script_versions WHERE script_id = $1 \
         ORDER BY {NEWEST_FIRST} LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query_as::<_, Row>(&sql)
        .bind(script_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
    let items = rows
        .into_iter()
        .map(ScriptVersion::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paged::new(items, page, total_count))
}

/// Bump the rollback counter of a version.
pub async fn increment_rollback_count(pool: &PgPool, version_id: &str) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE script_versions SET rollback_count = rollback_count + 1 WHERE version_id = $1",
    )
    .bind(version_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("script version", version_id));
    }
    Ok(())
}

/// Count one execution against the script's current version.
pub async fn record_execution(
    pool: &PgPool,
    script_id: &str,
    at: DateTime<Utc>,
) -> Result<Option<ScriptVersion>, AppError> {
    let sql = format!(
        "UPDATE script_versions \
         SET execution_count = execution_count + 1, last_executed_at = $2 \
         WHERE script_id = $1 AND is_current_version \
         RETURNING {VERSION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, Row>(&sql)
        .bind(script_id)
        .bind(at)
        .fetch_optional(pool)
        .await?;
    row.map(ScriptVersion::try_from).transpose()
}

/// Aggregate counters over all versions of a script.
pub async fn statistics(pool: &PgPool, script_id: &str) -> Result<VersionStatistics, AppError> {
    #[derive(sqlx::FromRow)]
    struct Totals {
        total_versions: i64,
        latest_created_at: Option<DateTime<Utc>>,
        total_rollbacks: i64,
        total_executions: i64,
    }

    let totals = sqlx::query_as::<_, Totals>(
        "SELECT COUNT(*) AS total_versions, \
                MAX(created_at) AS latest_created_at, \
                COALESCE(SUM(rollback_count), 0)::BIGINT AS total_rollbacks, \
                COALESCE(SUM(execution_count), 0)::BIGINT AS total_executions \
         FROM script_versions WHERE script_id = $1",
    )
    .bind(script_id)
    .fetch_one(pool)
    .await?;

    let by_type: Vec<(String, i64)> = sqlx::query_as(
        "SELECT change_type, COUNT(*) FROM script_versions \
         WHERE script_id = $1 GROUP BY change_type",
    )
    .bind(script_id)
    .fetch_all(pool)
    .await?;

    let mut by_change_type = BTreeMap::new();
    for (change_type, count) in by_type {
        by_change_type.insert(change_type.parse::<ChangeType>()?, count);
    }

    let current: Option<(String,)> = sqlx::query_as(
        "SELECT version FROM script_versions WHERE script_id = $1 AND is_current_version",
    )
    .bind(script_id)
    .fetch_optional(pool)
    .await?;

    Ok(VersionStatistics {
        script_id: script_id.to_string(),
        total_versions: totals.total_versions,
        current_version: current.map(|c| c.0),
        latest_created_at: totals.latest_created_at,
        total_rollbacks: totals.total_rollbacks,
        total_executions: totals.total_executions,
        by_change_type,
    })
}

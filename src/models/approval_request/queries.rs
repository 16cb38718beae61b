use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};

use super::types::*;
use crate::auth::Role;
use crate::errors::AppError;
use crate::models::paging::{PageRequest, Paged};

const REQUEST_COLUMNS: &str = "\
    request_id, script_id, operation_type, script_type, status, \
    auto_approval_eligible, required_approvers, original_data, sql_content, \
    title, description, priority, requester_id, requester_email, requester_role, \
    requested_at, submitted_at, reviewed_at, reviewed_by, reviewed_by_email, \
    review_comment, updated_at, current_approvers";

#[derive(sqlx::FromRow)]
struct Row {
    request_id: String,
    script_id: String,
    operation_type: String,
    script_type: String,
    status: String,
    auto_approval_eligible: bool,
    required_approvers: Vec<String>,
    original_data: Option<serde_json::Value>,
    sql_content: String,
    title: String,
    description: String,
    priority: String,
    requester_id: String,
    requester_email: String,
    requester_role: String,
    requested_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    reviewed_at: Option<DateTime<Utc>>,
    reviewed_by: Option<String>,
    reviewed_by_email: Option<String>,
    review_comment: Option<String>,
    updated_at: DateTime<Utc>,
    current_approvers: Vec<String>,
}

impl TryFrom<Row> for ApprovalRequest {
    type Error = AppError;

    fn try_from(r: Row) -> Result<Self, AppError> {
        let required_approvers = r
            .required_approvers
            .iter()
            .map(|role| role.parse::<Role>())
            .collect::<Result<_, _>>()?;
        Ok(ApprovalRequest {
            request_id: r.request_id,
            script_id: r.script_id,
            operation_type: r.operation_type.parse()?,
            script_type: r.script_type.parse()?,
            status: r.status.parse()?,
            auto_approval_eligible: r.auto_approval_eligible,
            required_approvers,
            original_data: r.original_data,
            sql_content: r.sql_content,
            title: r.title,
            description: r.description,
            priority: r.priority.parse()?,
            requester_id: r.requester_id,
            requester_email: r.requester_email,
            requester_role: r.requester_role.parse()?,
            requested_at: r.requested_at,
            submitted_at: r.submitted_at,
            reviewed_at: r.reviewed_at,
            reviewed_by: r.reviewed_by,
            reviewed_by_email: r.reviewed_by_email,
            review_comment: r.review_comment,
            updated_at: r.updated_at,
            current_approvers: r.current_approvers,
        })
    }
}

fn order_sql(order: RequestOrder) -> &'static str {
    match order {
        RequestOrder::RequestedAtDesc => "requested_at DESC, request_id",
        RequestOrder::UpdatedAtDesc => "updated_at DESC, request_id",
    }
}

/// Insert a fully formed request.
pub async fn insert<'c, E: PgExecutor<'c>>(executor: E, request: &ApprovalRequest) -> Result<(), AppError> {
    let required: Vec<String> = request
        .required_approvers
        .iter()
        .map(|r| r.as_str().to_string())
        .collect();

    sqlx::query(
        "INSERT INTO approval_requests (
            request_id, script_id, operation_type, script_type, status,
            auto_approval_eligible, required_approvers, original_data, sql_content,
            title, description, priority, requester_id, requester_email, requester_role,
            requested_at, submitted_at, reviewed_at, reviewed_by, reviewed_by_email,
            review_comment, updated_at, current_approvers)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                 $16, $17, $18, $19, $20, $21, $22, $23)",
    )
    .bind(&request.request_id)
    .bind(&request.script_id)
    .bind(request.operation_type.as_str())
    .bind(request.script_type.as_str())
    .bind(request.status.as_str())
    .bind(request.auto_approval_eligible)
    .bind(&required)
    .bind(&request.original_data)
    .bind(&request.sql_content)
    .bind(&request.title)
    .bind(&request.description)
    .bind(request.priority.as_str())
    .bind(&request.requester_id)
    .bind(&request.requester_email)
    .bind(request.requester_role.as_str())
    .bind(request.requested_at)
    .bind(request.submitted_at)
    .bind(request.reviewed_at)
    .bind(&request.reviewed_by)
    .bind(&request.reviewed_by_email)
    .bind(&request.review_comment)
    .bind(request.updated_at)
    .bind(&request.current_approvers)
    .execute(executor)
    .await?;

    Ok(())
}

/// Find a single request by id.
pub async fn find_by_id<'c, E: PgExecutor<'c>>(
    executor: E,
    request_id: &str,
) -> Result<Option<ApprovalRequest>, AppError> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM approval_requests WHERE request_id = $1");
    let row = sqlx::query_as::<_, Row>(&sql)
        .bind(request_id)
        .fetch_optional(executor)
        .await?;
    row.map(ApprovalRequest::try_from).transpose()
}

/// Apply `transition` only if the request is still in `transition.from`.
///
/// Zero rows updated means another caller got there first (or the request does
/// not exist); the current row is re-read to report which. Runs on the
/// caller's connection so it can share a transaction with the history insert.
pub async fn transition(conn: &mut PgConnection, transition: &StatusTransition) -> Result<ApprovalRequest, AppError> {
    let sql = format!(
        "UPDATE approval_requests SET \
            status = $3, \
            updated_at = $4, \
            reviewed_at = CASE WHEN $5 THEN $4 ELSE reviewed_at END, \
            reviewed_by = CASE WHEN $5 THEN $6 ELSE reviewed_by END, \
            reviewed_by_email = CASE WHEN $5 THEN $7 ELSE reviewed_by_email END, \
            review_comment = CASE WHEN $5 THEN $8 ELSE review_comment END, \
            current_approvers = CASE \
                WHEN $3 = 'approved' AND NOT ($6 = ANY(current_approvers)) \
                THEN array_append(current_approvers, $6) \
                ELSE current_approvers END \
         WHERE request_id = $1 AND status = $2 \
         RETURNING {REQUEST_COLUMNS}"
    );

    let row = sqlx::query_as::<_, Row>(&sql)
        .bind(&transition.request_id)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(transition.at)
        .bind(transition.stamps_review())
        .bind(&transition.actor.id)
        .bind(&transition.actor.email)
        .bind(&transition.comment)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => ApprovalRequest::try_from(row),
        None => match find_by_id(&mut *conn, &transition.request_id).await? {
            Some(current) => Err(AppError::StaleState {
                expected: transition.from,
                actual: current.status,
            }),
            None => Err(AppError::not_found("approval request", &transition.request_id)),
        },
    }
}

/// List requests whose status is one of `statuses`, filtered and paginated.
pub async fn find_paginated(
    pool: &PgPool,
    statuses: &[RequestStatus],
    filter: &RequestFilter,
    order: RequestOrder,
    page: PageRequest,
) -> Result<Paged<ApprovalRequest>, AppError> {
    let status_codes: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
    let where_clause = "WHERE status = ANY($1) \
                          AND ($2::TEXT IS NULL OR script_id = $2) \
                          AND ($3::TEXT IS NULL OR requester_id = $3)";

    let count_sql = format!("SELECT COUNT(*) FROM approval_requests {where_clause}");
    let (total_count,): (i64,) = sqlx::query_as(&count_sql)
        .bind(&status_codes)
        .bind(&filter.script_id)
        .bind(&filter.requester_id)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM approval_requests {where_clause} \
         ORDER BY {} LIMIT $4 OFFSET $5",
        order_sql(order)
    );
    let rows = sqlx::query_as::<_, Row>(&sql)
        .bind(&status_codes)
        .bind(&filter.script_id)
        .bind(&filter.requester_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    let items = rows
        .into_iter()
        .map(ApprovalRequest::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paged::new(items, page, total_count))
}

/// Count requests with a given status.
pub async fn count_by_status(pool: &PgPool, status: RequestStatus) -> Result<i64, AppError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM approval_requests WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(pool)
            .await?;
    Ok(count)
}

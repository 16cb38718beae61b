//! Persistence port for the four collections the core works on: script
//! records, approval requests, approval history and script versions.
//!
//! Two adapters implement it: [`PgStore`] over sqlx/Postgres and
//! [`MemoryStore`] for embedding and tests. Both honor the same atomicity
//! contract:
//!
//! - [`DocumentStore::insert_request`] and
//!   [`DocumentStore::transition_request`] write the request and its history
//!   entry together or not at all.
//! - [`DocumentStore::transition_request`] is a compare-and-set on status.
//! - [`DocumentStore::create_version`] numbers, demotes and inserts as one
//!   step serialized per script.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::approval_history::ApprovalHistoryEntry;
use crate::models::approval_request::{
    ApprovalRequest, RequestFilter, RequestOrder, RequestStatus, StatusTransition,
};
use crate::models::paging::{PageRequest, Paged};
use crate::models::script::Script;
use crate::models::script_version::{NewScriptVersion, ScriptVersion, VersionStatistics};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // --- scripts ---

    async fn find_script(&self, script_id: &str) -> Result<Option<Script>, AppError>;

    /// Insert a new script record; `Validation` if the id is taken.
    async fn insert_script(&self, script: &Script) -> Result<(), AppError>;

    /// Overwrite an existing record's content and approval stamps.
    /// Returns false if the script does not exist.
    async fn replace_script(&self, script: &Script) -> Result<bool, AppError>;

    /// Returns false if the script did not exist.
    async fn delete_script(&self, script_id: &str) -> Result<bool, AppError>;

    // --- approval requests ---

    /// Insert a new request and the history entry for its first move.
    /// `Validation` if the id is taken or the entry is not a legal first step.
    async fn insert_request(&self, request: &ApprovalRequest, entry: &ApprovalHistoryEntry) -> Result<(), AppError>;

    async fn find_request(&self, request_id: &str) -> Result<Option<ApprovalRequest>, AppError>;

    /// Apply `transition` iff the stored status still equals `transition.from`,
    /// appending `entry` in the same step. `NotFound` if the request is absent,
    /// `StaleState` if its status moved or `entry` does not continue its history.
    async fn transition_request(
        &self,
        transition: &StatusTransition,
        entry: &ApprovalHistoryEntry,
    ) -> Result<ApprovalRequest, AppError>;

    async fn list_requests(
        &self,
        statuses: &[RequestStatus],
        filter: &RequestFilter,
        order: RequestOrder,
        page: PageRequest,
    ) -> Result<Paged<ApprovalRequest>, AppError>;

    async fn count_requests(&self, status: RequestStatus) -> Result<i64, AppError>;

    // --- approval history ---

    async fn append_history(&self, entry: &ApprovalHistoryEntry) -> Result<(), AppError>;

    /// Newest first.
    async fn history_for_request(&self, request_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError>;

    /// Newest first.
    async fn history_for_script(&self, script_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError>;

    // --- script versions ---

    /// Assign the next number after the script's highest version, demote the
    /// prior current version, insert the new one as current and update the
    /// script record's pointer.
    async fn create_version(&self, new: NewScriptVersion) -> Result<ScriptVersion, AppError>;

    async fn find_version(&self, script_id: &str, version: &str) -> Result<Option<ScriptVersion>, AppError>;

    async fn current_version(&self, script_id: &str) -> Result<Option<ScriptVersion>, AppError>;

    /// Newest version number first.
    async fn list_versions(&self, script_id: &str, page: PageRequest) -> Result<Paged<ScriptVersion>, AppError>;

    async fn increment_rollback_count(&self, version_id: &str) -> Result<(), AppError>;

    /// Count an execution on the current version; `None` if there is none.
    async fn record_execution(&self, script_id: &str, at: DateTime<Utc>) -> Result<Option<ScriptVersion>, AppError>;

    async fn version_statistics(&self, script_id: &str) -> Result<VersionStatistics, AppError>;
}

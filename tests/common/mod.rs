//! Shared test infrastructure for the approval and versioning tests.
//!
//! # Setup
//! - `setup_engine()` - engine over an in-memory store with recording sinks;
//!   `TestEngine::faults` switches individual store writes into failure
//! - `setup_pg_pool()` - migrated Postgres pool, only when
//!   `SCRIPTGATE_TEST_DATABASE_URL` is set

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::PgPool;

use scriptgate::approval::{ApprovalEngine, SubmitRequest};
use scriptgate::audit::{
    ApprovalEvent, CacheInvalidator, EditHistoryRecord, EditHistorySink, NoopCache, Notifier, Sinks,
};
use scriptgate::auth::{Actor, RolePermissions, Role, Requester};
use scriptgate::errors::AppError;
use scriptgate::models::approval_history::ApprovalHistoryEntry;
use scriptgate::models::approval_request::{
    ApprovalRequest, OperationType, Priority, RequestFilter, RequestOrder, RequestStatus,
    StatusTransition,
};
use scriptgate::models::paging::{PageRequest, Paged};
use scriptgate::models::script::Script;
use scriptgate::models::script_version::{NewScriptVersion, ScriptVersion, VersionStatistics};
use scriptgate::store::{DocumentStore, MemoryStore};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

pub const ADMIN_ID: &str = "admin-1";
pub const REVIEWER_ID: &str = "admin-2";
pub const DEVELOPER_ID: &str = "dev-1";
pub const OTHER_DEVELOPER_ID: &str = "dev-2";
pub const VIEWER_ID: &str = "viewer-1";

pub fn email_for(id: &str) -> String {
    format!("{id}@example.com")
}

pub fn admin() -> Requester {
    Requester::new(ADMIN_ID, email_for(ADMIN_ID), Role::Admin)
}

pub fn developer() -> Requester {
    Requester::new(DEVELOPER_ID, email_for(DEVELOPER_ID), Role::Developer)
}

pub fn reviewer() -> Actor {
    Actor::new(REVIEWER_ID, email_for(REVIEWER_ID))
}

pub fn actor(id: &str) -> Actor {
    Actor::new(id, email_for(id))
}

// ============================================================================
// RECORDING SINKS
// ============================================================================

#[derive(Default)]
pub struct RecordingEdits {
    pub records: Mutex<Vec<EditHistoryRecord>>,
}

impl RecordingEdits {
    pub fn snapshot(&self) -> Vec<EditHistoryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl EditHistorySink for RecordingEdits {
    async fn record(&self, record: &EditHistoryRecord) -> Result<(), AppError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<ApprovalEvent>>,
}

impl RecordingNotifier {
    pub fn snapshot(&self) -> Vec<ApprovalEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &ApprovalEvent) -> Result<(), AppError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A cache that is always down.
pub struct BrokenCache;

#[async_trait]
impl CacheInvalidator for BrokenCache {
    async fn clear_scripts_cache(&self) -> Result<(), AppError> {
        Err(AppError::Execution("cache unreachable".into()))
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Switches for [`FaultyStore`]. All off by default.
#[derive(Default)]
pub struct StoreFaults {
    history_down: AtomicBool,
    replace_down: AtomicBool,
}

impl StoreFaults {
    /// Every write touching approval history fails, as if its table were unavailable.
    pub fn set_history_down(&self, down: bool) {
        self.history_down.store(down, Ordering::SeqCst);
    }

    pub fn set_replace_down(&self, down: bool) {
        self.replace_down.store(down, Ordering::SeqCst);
    }

    fn check_history(&self) -> Result<(), AppError> {
        if self.history_down.load(Ordering::SeqCst) {
            return Err(AppError::Execution("approval_history unavailable".into()));
        }
        Ok(())
    }
}

/// In-memory store whose writes can be made to fail on demand.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    faults: Arc<StoreFaults>,
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn find_script(&self, script_id: &str) -> Result<Option<Script>, AppError> {
        self.inner.find_script(script_id).await
    }

    async fn insert_script(&self, script: &Script) -> Result<(), AppError> {
        self.inner.insert_script(script).await
    }

    async fn replace_script(&self, script: &Script) -> Result<bool, AppError> {
        if self.faults.replace_down.load(Ordering::SeqCst) {
            return Err(AppError::Execution("scripts unavailable".into()));
        }
        self.inner.replace_script(script).await
    }

    async fn delete_script(&self, script_id: &str) -> Result<bool, AppError> {
        self.inner.delete_script(script_id).await
    }

    async fn insert_request(&self, request: &ApprovalRequest, entry: &ApprovalHistoryEntry) -> Result<(), AppError> {
        self.faults.check_history()?;
        self.inner.insert_request(request, entry).await
    }

    async fn find_request(&self, request_id: &str) -> Result<Option<ApprovalRequest>, AppError> {
        self.inner.find_request(request_id).await
    }

    async fn transition_request(
        &self,
        transition: &StatusTransition,
        entry: &ApprovalHistoryEntry,
    ) -> Result<ApprovalRequest, AppError> {
        self.faults.check_history()?;
        self.inner.transition_request(transition, entry).await
    }

    async fn list_requests(
        &self,
        statuses: &[RequestStatus],
        filter: &RequestFilter,
        order: RequestOrder,
        page: PageRequest,
    ) -> Result<Paged<ApprovalRequest>, AppError> {
        self.inner.list_requests(statuses, filter, order, page).await
    }

    async fn count_requests(&self, status: RequestStatus) -> Result<i64, AppError> {
        self.inner.count_requests(status).await
    }

    async fn append_history(&self, entry: &ApprovalHistoryEntry) -> Result<(), AppError> {
        self.faults.check_history()?;
        self.inner.append_history(entry).await
    }

    async fn history_for_request(&self, request_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        self.inner.history_for_request(request_id).await
    }

    async fn history_for_script(&self, script_id: &str) -> Result<Vec<ApprovalHistoryEntry>, AppError> {
        self.inner.history_for_script(script_id).await
    }

    async fn create_version(&self, new: NewScriptVersion) -> Result<ScriptVersion, AppError> {
        self.inner.create_version(new).await
    }

    async fn find_version(&self, script_id: &str, version: &str) -> Result<Option<ScriptVersion>, AppError> {
        self.inner.find_version(script_id, version).await
    }

    async fn current_version(&self, script_id: &str) -> Result<Option<ScriptVersion>, AppError> {
        self.inner.current_version(script_id).await
    }

    async fn list_versions(&self, script_id: &str, page: PageRequest) -> Result<Paged<ScriptVersion>, AppError> {
        self.inner.list_versions(script_id, page).await
    }

    async fn increment_rollback_count(&self, version_id: &str) -> Result<(), AppError> {
        self.inner.increment_rollback_count(version_id).await
    }

    async fn record_execution(&self, script_id: &str, at: DateTime<Utc>) -> Result<Option<ScriptVersion>, AppError> {
        self.inner.record_execution(script_id, at).await
    }

    async fn version_statistics(&self, script_id: &str) -> Result<VersionStatistics, AppError> {
        self.inner.version_statistics(script_id).await
    }
}

// ============================================================================
// ENGINE SETUP
// ============================================================================

pub struct TestEngine {
    pub engine: ApprovalEngine,
    /// The backing store, reachable without the fault switches.
    pub store: Arc<MemoryStore>,
    pub faults: Arc<StoreFaults>,
    pub permissions: Arc<RolePermissions>,
    pub edits: Arc<RecordingEdits>,
    pub events: Arc<RecordingNotifier>,
}

impl TestEngine {
    pub async fn store_script_opt(&self, script_id: &str) -> Option<Script> {
        self.store.find_script(script_id).await.unwrap()
    }

    pub async fn store_script(&self, script_id: &str) -> Script {
        self.store_script_opt(script_id)
            .await
            .unwrap_or_else(|| panic!("script {script_id} should exist"))
    }
}

fn role_table() -> RolePermissions {
    RolePermissions::with_roles([
        (ADMIN_ID, Role::Admin),
        (REVIEWER_ID, Role::Admin),
        (DEVELOPER_ID, Role::Developer),
        (OTHER_DEVELOPER_ID, Role::Developer),
        (VIEWER_ID, Role::Viewer),
    ])
}

fn build(cache: Arc<dyn CacheInvalidator>) -> TestEngine {
    let store = Arc::new(MemoryStore::new());
    let faults = Arc::new(StoreFaults::default());
    let faulty = Arc::new(FaultyStore {
        inner: store.clone(),
        faults: faults.clone(),
    });
    let permissions = Arc::new(role_table());
    let edits = Arc::new(RecordingEdits::default());
    let events = Arc::new(RecordingNotifier::default());
    let sinks = Sinks {
        edit_history: edits.clone(),
        cache,
        notifier: events.clone(),
    };
    let engine = ApprovalEngine::new(faulty, permissions.clone(), sinks);
    TestEngine {
        engine,
        store,
        faults,
        permissions,
        edits,
        events,
    }
}

/// Engine over a fresh in-memory store. Admins: `admin-1`, `admin-2`;
/// developers: `dev-1`, `dev-2`; viewer: `viewer-1`.
pub fn setup_engine() -> TestEngine {
    build(Arc::new(NoopCache))
}

/// Same as `setup_engine` but every cache invalidation fails.
pub fn setup_engine_with_broken_cache() -> TestEngine {
    build(Arc::new(BrokenCache))
}

// ============================================================================
// FIXTURES
// ============================================================================

pub fn script_doc(name: &str, sql: &str) -> Value {
    json!({
        "name": name,
        "name_en": format!("{name} (en)"),
        "description": "Monthly figures",
        "author": "Finance",
        "hashtags": ["finance"],
        "sql_content": sql,
    })
}

pub fn change(script_id: &str, requester: Requester, op: OperationType, sql: &str) -> SubmitRequest {
    let original_data = op
        .requires_payload()
        .then(|| script_doc(&format!("{script_id} report"), sql));
    SubmitRequest {
        script_id: script_id.to_string(),
        requester,
        operation_type: op,
        sql_content: sql.to_string(),
        title: format!("{op} {script_id}"),
        description: String::new(),
        priority: Priority::Normal,
        original_data,
    }
}

/// Have an admin create `script_id` so later updates and deletes have a target.
pub async fn seed_script(t: &TestEngine, script_id: &str, sql: &str) {
    let submission = t
        .engine
        .submit(change(script_id, admin(), OperationType::Create, sql))
        .await
        .expect("seed submit");
    let outcome = submission.outcome.expect("admin submissions apply immediately");
    assert!(outcome.execution_error().is_none(), "seed failed: {outcome:?}");
}

// ============================================================================
// POSTGRES
// ============================================================================

/// Migrated pool for `SCRIPTGATE_TEST_DATABASE_URL`, or `None` to skip.
pub async fn setup_pg_pool() -> Option<PgPool> {
    let url = std::env::var("SCRIPTGATE_TEST_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.expect("connect to test database");
    scriptgate::db::run_migrations(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

/// Script id that will not collide with other runs against the same database.
pub fn unique_script_id(prefix: &str) -> String {
    scriptgate::ids::new_id(prefix)
}

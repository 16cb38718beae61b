//! Integration tests for script versioning over the in-memory store

mod common;

use common::*;
use scriptgate::audit::{ApprovalEvent, EditOperation};
use scriptgate::errors::AppError;
use scriptgate::models::approval_request::OperationType;
use scriptgate::models::paging::PageRequest;
use scriptgate::models::script::ScriptContent;
use scriptgate::models::script_version::{ChangeType, NewScriptVersion, VersionBump, VersionStatus};
use scriptgate::versioning::ChangeKind;

fn content(sql: &str) -> ScriptContent {
    ScriptContent {
        name: "daily totals".into(),
        author: "Finance".into(),
        sql_content: sql.into(),
        ..Default::default()
    }
}

fn new_version(script_id: &str, sql: &str, change_type: ChangeType, bump: VersionBump) -> NewScriptVersion {
    NewScriptVersion {
        script_id: script_id.to_string(),
        content: content(sql),
        author: actor(DEVELOPER_ID),
        change_type,
        change_description: None,
        bump,
        approval_request_id: None,
        approval_status: None,
    }
}

#[tokio::test]
async fn test_version_numbering_and_rollback() {
    let t = setup_engine();
    let versions = t.engine.versions();

    let v1 = versions
        .create_version(new_version("totals", "SELECT 1;", ChangeType::Create, VersionBump::Minor))
        .await
        .unwrap();
    let v2 = versions
        .create_version(new_version("totals", "SELECT 2;", ChangeType::Update, VersionBump::Patch))
        .await
        .unwrap();
    let v3 = versions
        .create_version(new_version("totals", "SELECT 3;", ChangeType::Update, VersionBump::Patch))
        .await
        .unwrap();
    assert_eq!(
        [v1.version.as_str(), v2.version.as_str(), v3.version.as_str()],
        ["1.1.0", "1.1.1", "1.1.2"]
    );

    let rolled = versions
        .rollback("totals", "1.1.0", &actor(ADMIN_ID), None)
        .await
        .unwrap();
    assert_eq!(rolled.version, "1.1.3");
    assert_eq!(rolled.content, v1.content);
    assert_eq!(rolled.change_type, ChangeType::Rollback);
    assert_eq!(rolled.previous_version_id.as_deref(), Some(v3.version_id.as_str()));
    assert_ne!(rolled.version_id, v1.version_id);

    let target = versions.get_version("totals", "1.1.0").await.unwrap();
    assert_eq!(target.rollback_count, 1);
    assert_eq!(target.status, VersionStatus::Archived);
    assert!(!target.is_current_version);

    let current = versions.current_version("totals").await.unwrap().unwrap();
    assert_eq!(current.version_id, rolled.version_id);
    assert_eq!(current.status, VersionStatus::Active);
}

#[tokio::test]
async fn test_exactly_one_current_version() {
    let t = setup_engine();
    let versions = t.engine.versions();

    for i in 0..5 {
        versions
            .create_version(new_version("one", &format!("SELECT {i};"), ChangeType::Update, VersionBump::Patch))
            .await
            .unwrap();
    }
    versions
        .create_version(new_version("other", "SELECT 0;", ChangeType::Create, VersionBump::Major))
        .await
        .unwrap();

    let all = t.store.versions_of("one").await;
    assert_eq!(all.len(), 5);
    assert_eq!(all.iter().filter(|v| v.is_current_version).count(), 1);
    assert!(all.last().unwrap().is_current_version);

    let other = versions.current_version("other").await.unwrap().unwrap();
    assert_eq!(other.version, "2.0.0");
    assert!(other.previous_version_id.is_none());
}

#[tokio::test]
async fn test_concurrent_creates_serialize_per_script() {
    let t = setup_engine();
    let versions = t.engine.versions();

    let (a, b, c, d) = tokio::join!(
        versions.create_version(new_version("busy", "SELECT 'a';", ChangeType::Update, VersionBump::Patch)),
        versions.create_version(new_version("busy", "SELECT 'b';", ChangeType::Update, VersionBump::Patch)),
        versions.create_version(new_version("busy", "SELECT 'c';", ChangeType::Update, VersionBump::Patch)),
        versions.create_version(new_version("busy", "SELECT 'd';", ChangeType::Update, VersionBump::Patch)),
    );
    let mut numbers: Vec<String> = [a, b, c, d]
        .into_iter()
        .map(|r| r.unwrap().version)
        .collect();
    numbers.sort();
    assert_eq!(numbers, ["1.0.1", "1.0.2", "1.0.3", "1.0.4"]);

    let all = t.store.versions_of("busy").await;
    assert_eq!(all.iter().filter(|v| v.is_current_version).count(), 1);
}

#[tokio::test]
async fn test_numeric_ordering_past_nine() {
    let t = setup_engine();
    let versions = t.engine.versions();

    for _ in 0..10 {
        versions
            .create_version(new_version("many", "SELECT 1;", ChangeType::Update, VersionBump::Minor))
            .await
            .unwrap();
    }
    let latest = versions.current_version("many").await.unwrap().unwrap();
    assert_eq!(latest.version, "1.10.0");

    let next = versions
        .create_version(new_version("many", "SELECT 1;", ChangeType::Update, VersionBump::Patch))
        .await
        .unwrap();
    assert_eq!(next.version, "1.10.1");

    let page = versions.list_versions("many", PageRequest::new(1, 3)).await.unwrap();
    let listed: Vec<_> = page.items.iter().map(|v| v.version.as_str()).collect();
    assert_eq!(listed, ["1.10.1", "1.10.0", "1.9.0"]);
    assert_eq!(page.total_count, 11);
    assert_eq!(page.total_pages, 4);
}

#[tokio::test]
async fn test_compare_reports_line_set_difference() {
    let t = setup_engine();
    let versions = t.engine.versions();

    versions
        .create_version(new_version("cmp", "SELECT 1;\nSELECT 2;", ChangeType::Create, VersionBump::Minor))
        .await
        .unwrap();
    let mut second = new_version("cmp", "SELECT 2;\nSELECT 3;", ChangeType::Update, VersionBump::Patch);
    second.content.description = Some("now with three".into());
    versions.create_version(second).await.unwrap();

    let diff = versions.compare("cmp", "1.1.0", "1.1.1").await.unwrap();
    assert_eq!(diff.sql.deletions, vec!["SELECT 1;"]);
    assert_eq!(diff.sql.additions, vec!["SELECT 3;"]);
    assert!(diff.sql.modifications.is_empty());
    assert!(diff.has_changes());

    let kind = |field: &str| diff.fields.iter().find(|f| f.field == field).unwrap().kind;
    assert_eq!(kind("sql_content"), ChangeKind::Modified);
    assert_eq!(kind("description"), ChangeKind::Added);
    assert_eq!(kind("name"), ChangeKind::Unchanged);

    assert!(matches!(
        versions.compare("cmp", "1.1.0", "9.9.9").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_rollback_restores_script_record() {
    let t = setup_engine();
    seed_script(&t, "restore", "SELECT 'original';").await;
    let s = t
        .engine
        .submit(change("restore", admin(), OperationType::Update, "SELECT 'changed';"))
        .await
        .unwrap();
    assert!(s.outcome.unwrap().execution_error().is_none());
    assert_eq!(t.store_script("restore").await.content.sql_content, "SELECT 'changed';");

    let rolled = t
        .engine
        .versions()
        .rollback("restore", "1.1.0", &actor(ADMIN_ID), Some("bad numbers".into()))
        .await
        .unwrap();
    assert_eq!(rolled.version, "1.1.2");
    assert_eq!(rolled.change_description.as_deref(), Some("bad numbers"));

    let script = t.store_script("restore").await;
    assert_eq!(script.content.sql_content, "SELECT 'original';");
    assert_eq!(script.current_version.as_deref(), Some("1.1.2"));
    assert_eq!(script.current_version_id.as_deref(), Some(rolled.version_id.as_str()));

    let rollbacks = t
        .edits
        .snapshot()
        .into_iter()
        .filter(|r| r.operation == EditOperation::Rollback)
        .count();
    assert_eq!(rollbacks, 1);
}

#[tokio::test]
async fn test_rollback_to_unknown_version_is_not_found() {
    let t = setup_engine();
    let err = t
        .engine
        .versions()
        .rollback("nothing", "1.0.0", &actor(ADMIN_ID), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(t.store.versions_of("nothing").await.is_empty());
}

#[tokio::test]
async fn test_statistics_and_execution_counters() {
    let t = setup_engine();
    let versions = t.engine.versions();

    versions
        .create_version(new_version("stats", "SELECT 1;", ChangeType::Create, VersionBump::Minor))
        .await
        .unwrap();
    versions
        .create_version(new_version("stats", "SELECT 2;", ChangeType::Update, VersionBump::Patch))
        .await
        .unwrap();
    versions.record_execution("stats").await.unwrap();
    let executed = versions.record_execution("stats").await.unwrap();
    assert_eq!(executed.execution_count, 2);
    assert!(executed.last_executed_at.is_some());
    versions
        .rollback("stats", "1.1.0", &actor(ADMIN_ID), None)
        .await
        .unwrap();

    let stats = versions.get_statistics("stats").await.unwrap();
    assert_eq!(stats.total_versions, 3);
    assert_eq!(stats.current_version.as_deref(), Some("1.1.2"));
    assert_eq!(stats.total_rollbacks, 1);
    assert_eq!(stats.total_executions, 2);
    assert_eq!(stats.by_change_type.get(&ChangeType::Rollback), Some(&1));
    assert_eq!(stats.by_change_type.get(&ChangeType::Update), Some(&1));

    assert!(matches!(
        versions.record_execution("unversioned").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_blank_script_id_is_rejected() {
    let t = setup_engine();
    let err = t
        .engine
        .versions()
        .create_version(new_version("", "SELECT 1;", ChangeType::Create, VersionBump::Minor))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_rollback_commits_even_if_record_restore_fails() {
    let t = setup_engine();
    seed_script(&t, "fragile", "SELECT 'v1';").await;
    let s = t
        .engine
        .submit(change("fragile", admin(), OperationType::Update, "SELECT 'v2';"))
        .await
        .unwrap();
    assert!(s.outcome.unwrap().execution_error().is_none());

    t.faults.set_replace_down(true);
    let rolled = t
        .engine
        .versions()
        .rollback("fragile", "1.1.0", &actor(ADMIN_ID), None)
        .await
        .unwrap();
    assert_eq!(rolled.version, "1.1.2");
    assert_eq!(rolled.content.sql_content, "SELECT 'v1';");

    let current = t.engine.versions().current_version("fragile").await.unwrap().unwrap();
    assert_eq!(current.version_id, rolled.version_id);
    assert_eq!(t.engine.versions().get_version("fragile", "1.1.0").await.unwrap().rollback_count, 1);

    // The record keeps the last approved content; only the version moved.
    let script = t.store_script("fragile").await;
    assert_eq!(script.content.sql_content, "SELECT 'v2';");
    assert_eq!(script.current_version.as_deref(), Some("1.1.2"));
    assert!(
        !t.edits
            .snapshot()
            .iter()
            .any(|r| r.operation == EditOperation::Rollback)
    );
    assert!(t.events.snapshot().iter().any(|e| matches!(
        e,
        ApprovalEvent::RolledBack { version, .. } if version == "1.1.2"
    )));
}

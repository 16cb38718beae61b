use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::semver::{SemVer, VersionBump};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::approval_request::RequestStatus;
use crate::models::script::ScriptContent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Active,
    Archived,
    Deprecated,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "draft",
            VersionStatus::Active => "active",
            VersionStatus::Archived => "archived",
            VersionStatus::Deprecated => "deprecated",
        }
    }
}

impl FromStr for VersionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(VersionStatus::Draft),
            "active" => Ok(VersionStatus::Active),
            "archived" => Ok(VersionStatus::Archived),
            "deprecated" => Ok(VersionStatus::Deprecated),
            other => Err(AppError::Validation(format!("unknown version status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Rollback,
    Merge,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Rollback => "rollback",
            ChangeType::Merge => "merge",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            "rollback" => Ok(ChangeType::Rollback),
            "merge" => Ok(ChangeType::Merge),
            other => Err(AppError::Validation(format!("unknown change type '{other}'"))),
        }
    }
}

/// An immutable snapshot of a script's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptVersion {
    pub version_id: String,
    pub script_id: String,
    pub version: String,
    pub major_version: i32,
    pub minor_version: i32,
    pub patch_version: i32,
    pub status: VersionStatus,
    pub is_current_version: bool,
    #[serde(flatten)]
    pub content: ScriptContent,
    pub created_by: String,
    pub created_by_email: String,
    pub created_at: DateTime<Utc>,
    pub approval_status: Option<RequestStatus>,
    pub approval_request_id: Option<String>,
    pub change_type: ChangeType,
    pub change_description: Option<String>,
    pub previous_version_id: Option<String>,
    pub execution_count: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub rollback_count: i64,
}

impl ScriptVersion {
    pub fn semver(&self) -> SemVer {
        SemVer::new(self.major_version, self.minor_version, self.patch_version)
    }

    /// Applied to the prior current version when a newer one is inserted.
    pub fn demote(&mut self) {
        self.is_current_version = false;
        self.status = VersionStatus::Archived;
    }
}

/// Everything needed to mint a version except its number and lineage,
/// which the store assigns under the per-script lock.
#[derive(Debug, Clone)]
pub struct NewScriptVersion {
    pub script_id: String,
    pub content: ScriptContent,
    pub author: Actor,
    pub change_type: ChangeType,
    pub change_description: Option<String>,
    pub bump: VersionBump,
    pub approval_request_id: Option<String>,
    pub approval_status: Option<RequestStatus>,
}

impl NewScriptVersion {
    pub fn into_version(
        self,
        version_id: String,
        number: SemVer,
        previous_version_id: Option<String>,
        now: DateTime<Utc>,
    ) -> ScriptVersion {
        ScriptVersion {
            version_id,
            script_id: self.script_id,
            version: number.to_string(),
            major_version: number.major,
            minor_version: number.minor,
            patch_version: number.patch,
            status: VersionStatus::Active,
            is_current_version: true,
            content: self.content,
            created_by: self.author.id,
            created_by_email: self.author.email,
            created_at: now,
            approval_status: self.approval_status,
            approval_request_id: self.approval_request_id,
            change_type: self.change_type,
            change_description: self.change_description,
            previous_version_id,
            execution_count: 0,
            last_executed_at: None,
            rollback_count: 0,
        }
    }
}

/// Aggregate view over all versions of one script.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VersionStatistics {
    pub script_id: String,
    pub total_versions: i64,
    pub current_version: Option<String>,
    pub latest_created_at: Option<DateTime<Utc>>,
    pub total_rollbacks: i64,
    pub total_executions: i64,
    pub by_change_type: BTreeMap<ChangeType, i64>,
}

impl VersionStatistics {
    pub fn from_versions(script_id: &str, versions: &[ScriptVersion]) -> Self {
        let mut stats = VersionStatistics {
            script_id: script_id.to_string(),
            ..Default::default()
        };
        for v in versions {
            stats.total_versions += 1;
            stats.total_rollbacks += v.rollback_count;
            stats.total_executions += v.execution_count;
            *stats.by_change_type.entry(v.change_type).or_insert(0) += 1;
            if v.is_current_version {
                stats.current_version = Some(v.version.clone());
            }
            if stats.latest_created_at.is_none_or(|t| v.created_at > t) {
                stats.latest_created_at = Some(v.created_at);
            }
        }
        stats
    }
}

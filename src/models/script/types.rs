use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::approval_request::RequestStatus;

/// The versioned content of a script. Snapshots copy exactly these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptContent {
    pub name: String,
    #[serde(default)]
    pub name_en: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub description_en: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub scope_en: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub sql_content: String,
}

impl ScriptContent {
    /// Parse a proposed document (`original_data`) into content.
    pub fn from_document(document: &serde_json::Value) -> Result<Self, AppError> {
        serde_json::from_value(document.clone())
            .map_err(|e| AppError::Validation(format!("malformed script document: {e}")))
    }
}

/// A script record as stored in the `scripts` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub script_id: String,
    #[serde(flatten)]
    pub content: ScriptContent,
    pub approval_status: Option<RequestStatus>,
    pub approval_request_id: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub current_version_id: Option<String>,
    pub current_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Script {
    pub fn new(script_id: impl Into<String>, content: ScriptContent, now: DateTime<Utc>) -> Self {
        Script {
            script_id: script_id.into(),
            content,
            approval_status: None,
            approval_request_id: None,
            approved_by: None,
            approved_at: None,
            current_version_id: None,
            current_version: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// JSON form used for edit-history records.
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

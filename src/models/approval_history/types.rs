use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::approval_request::RequestStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Submit,
    Approve,
    Reject,
    Withdraw,
    RequestChanges,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Submit => "submit",
            HistoryAction::Approve => "approve",
            HistoryAction::Reject => "reject",
            HistoryAction::Withdraw => "withdraw",
            HistoryAction::RequestChanges => "request_changes",
        }
    }

    /// The action recorded for a move into `status`.
    pub fn for_status(status: RequestStatus) -> Option<Self> {
        match status {
            RequestStatus::Pending => Some(HistoryAction::Submit),
            RequestStatus::Approved => Some(HistoryAction::Approve),
            RequestStatus::Rejected => Some(HistoryAction::Reject),
            RequestStatus::Withdrawn => Some(HistoryAction::Withdraw),
            RequestStatus::Draft => None,
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submit" => Ok(HistoryAction::Submit),
            "approve" => Ok(HistoryAction::Approve),
            "reject" => Ok(HistoryAction::Reject),
            "withdraw" => Ok(HistoryAction::Withdraw),
            "request_changes" => Ok(HistoryAction::RequestChanges),
            other => Err(AppError::Validation(format!("unknown history action '{other}'"))),
        }
    }
}

/// Immutable record of one request transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalHistoryEntry {
    pub history_id: String,
    pub request_id: String,
    pub script_id: String,
    pub action: HistoryAction,
    pub action_by: String,
    pub action_by_email: String,
    pub action_at: DateTime<Utc>,
    pub previous_status: RequestStatus,
    pub new_status: RequestStatus,
    pub comment: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl ApprovalHistoryEntry {
    /// Check this entry continues a walk whose latest status is `last`.
    ///
    /// `StaleState` if it starts from a different status, `Validation` if the
    /// move itself is not an edge of the request state machine.
    pub fn follows(&self, last: RequestStatus) -> Result<(), AppError> {
        if self.previous_status != last {
            return Err(AppError::StaleState {
                expected: self.previous_status,
                actual: last,
            });
        }
        if !self.previous_status.can_transition_to(self.new_status) {
            return Err(AppError::Validation(format!(
                "illegal transition {} -> {} for request {}",
                self.previous_status, self.new_status, self.request_id
            )));
        }
        Ok(())
    }
}

use std::fmt;

use crate::models::approval_request::RequestStatus;

#[derive(Debug)]
pub enum AppError {
    Db(sqlx::Error),
    Migrate(sqlx::migrate::MigrateError),
    Json(serde_json::Error),
    Config(String),
    NotFound(String),
    Forbidden(String),
    /// A transition was attempted from a status other than the one it requires.
    StaleState {
        expected: RequestStatus,
        actual: RequestStatus,
    },
    Validation(String),
    /// The approval committed but applying it to the script record failed.
    Execution(String),
}

impl AppError {
    pub fn not_found(what: &str, id: &str) -> Self {
        AppError::NotFound(format!("{what} '{id}'"))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, AppError::StaleState { .. })
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Db(e) => write!(f, "Database error: {e}"),
            AppError::Migrate(e) => write!(f, "Migration error: {e}"),
            AppError::Json(e) => write!(f, "JSON error: {e}"),
            AppError::Config(e) => write!(f, "Configuration error: {e}"),
            AppError::NotFound(what) => write!(f, "Not found: {what}"),
            AppError::Forbidden(perm) => write!(f, "Permission denied: {perm}"),
            AppError::StaleState { expected, actual } => write!(
                f,
                "Stale state: expected '{}', request is '{}'",
                expected.as_str(),
                actual.as_str()
            ),
            AppError::Validation(e) => write!(f, "Validation error: {e}"),
            AppError::Execution(e) => write!(f, "Execution error: {e}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Db(e) => Some(e),
            AppError::Migrate(e) => Some(e),
            AppError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Db(e)
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::Migrate(e)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Json(e)
    }
}

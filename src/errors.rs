//! Error taxonomy for the habit core.
//!
//! Validation failures are raised before any query is issued. Storage errors
//! are passed through untouched; nothing in this crate retries them.
//! Ordering drift is not an error value, it is reported by
//! [`crate::habits::repair_ordering`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HabitError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("encoding failure: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HabitError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn malformed(what: impl Into<String>) -> Self {
        Self::MalformedInput(what.into())
    }

    /// HTTP status the dashboard reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            HabitError::NotFound(_) => 404,
            HabitError::MalformedInput(_) => 400,
            HabitError::Storage(_) | HabitError::Encode(_) => 500,
        }
    }
}

pub type HabitResult<T> = Result<T, HabitError>;

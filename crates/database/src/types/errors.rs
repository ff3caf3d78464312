//! Error types for the database layer

use thiserror::Error;

use crate::entities::ReportState;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: ReportState, to: ReportState },

    #[error("Missing required fields")]
    MissingRequiredFields,

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map a unique-constraint violation onto `Conflict`, everything else onto `Sqlx`.
    pub(crate) fn conflict_or(err: sqlx::Error, message: &str) -> Self {
        let unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            Self::Conflict(message.to_string())
        } else {
            Self::Sqlx(err)
        }
    }
}

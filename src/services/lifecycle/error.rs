use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::services::events::EventError;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistence constraint violation, e.g. a duplicate public id.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DbErr),

    #[error("Object store delete failed: {0}")]
    StorageDelete(String),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

impl LifecycleError {
    /// Maps unique-constraint violations to `Conflict`, everything else to `Persistence`.
    pub fn from_db(err: DbErr, context: &str) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                LifecycleError::Conflict(format!("{}: {}", context, detail))
            }
            _ => LifecycleError::Persistence(err),
        }
    }
}

impl From<validator::ValidationErrors> for LifecycleError {
    fn from(errors: validator::ValidationErrors) -> Self {
        LifecycleError::Validation(errors.to_string())
    }
}

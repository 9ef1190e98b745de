//! Error taxonomy for marketplace operations.
//!
//! Every core operation fails fast and leaves state untouched: guard checks
//! run as part of the same conditional update or transaction that performs
//! the write. `Conflict` marks an expected, retry-worthy outcome (a lost
//! reservation race, an applicant cap) and must stay distinguishable from
//! `Validation` failures, which are not retry-worthy.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or missing input (non-positive pay, missing proof fields).
    #[error("{0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Caller lacks the required role or ownership.
    #[error("{0}")]
    Forbidden(String),

    /// A state guard failed at write time: the task was not in the expected
    /// status, the applicant cap was reached, or a concurrent writer won.
    #[error("{0}")]
    Conflict(String),

    /// The escrow or resolution was already finalized by an earlier call.
    #[error("{0}")]
    AlreadyProcessed(String),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::Conflict(_) | CoreError::AlreadyProcessed(_) => StatusCode::CONFLICT,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for (StatusCode, String) {
    fn from(err: CoreError) -> Self {
        let status = err.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {}", err);
            (status, "Internal server error".to_string())
        } else {
            (status, err.to_string())
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Decode failure for an enum column read back from the store.
#[derive(Debug, Error)]
#[error("invalid {what}: {value}")]
pub struct ParseEnumError {
    pub what: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

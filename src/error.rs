//! Error types for the circulation service

use thiserror::Error;

/// Stable numeric codes reported alongside each error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    BorrowerIneligible = 5,
    CopyNotAvailable = 6,
    LoanNotActive = 7,
    ReservationNotActive = 8,
    DuplicateReservation = 9,
    Conflict = 10,
    InvalidReference = 11,
    InvalidTransition = 12,
    BadValue = 13,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Borrower ineligible: {0}")]
    BorrowerIneligible(String),

    #[error("Copy not available: {0}")]
    CopyNotAvailable(String),

    #[error("Loan {0} is not active")]
    LoanNotActive(i32),

    #[error("Reservation {0} is not active")]
    ReservationNotActive(i32),

    #[error("Duplicate reservation: {0}")]
    DuplicateReservation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Lock contention or serialization failure; the whole transaction may be retried
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::BorrowerIneligible(_) => ErrorCode::BorrowerIneligible,
            AppError::CopyNotAvailable(_) => ErrorCode::CopyNotAvailable,
            AppError::LoanNotActive(_) => ErrorCode::LoanNotActive,
            AppError::ReservationNotActive(_) => ErrorCode::ReservationNotActive,
            AppError::DuplicateReservation(_) => ErrorCode::DuplicateReservation,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::InvalidReference(_) => ErrorCode::InvalidReference,
            AppError::InvalidTransition(_) => ErrorCode::InvalidTransition,
            AppError::Forbidden(_) => ErrorCode::NotAuthorized,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// Only contention errors are eligible for automatic retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

/// SQLSTATE codes that signal contention rather than a genuine failure
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        let contention = match &e {
            sqlx::Error::RowNotFound => return AppError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut => Some("Connection pool timed out".to_string()),
            sqlx::Error::Database(db) => {
                let code = db.code();
                match code.as_deref() {
                    Some(SERIALIZATION_FAILURE)
                    | Some(DEADLOCK_DETECTED)
                    | Some(LOCK_NOT_AVAILABLE)
                    | Some(UNIQUE_VIOLATION) => Some(db.message().to_string()),
                    _ => None,
                }
            }
            _ => None,
        };

        match contention {
            Some(message) => AppError::Conflict(message),
            None => AppError::Database(e),
        }
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

//! Loan (borrow) model and related types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::LoanStatus;
use crate::error::{AppError, AppResult};

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: i32,
    pub borrower_id: i32,
    pub copy_id: i32,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    /// Fixed when the loan is closed, zero while active
    pub fine: Decimal,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now > self.due_at
    }

    /// Close the loan; one-way, a returned loan is never reopened
    pub fn close(&mut self, returned_at: DateTime<Utc>, fine: Decimal) -> AppResult<()> {
        if !self.is_active() {
            return Err(AppError::LoanNotActive(self.id));
        }
        self.returned_at = Some(returned_at);
        self.status = LoanStatus::Returned;
        self.fine = fine;
        Ok(())
    }
}

/// Loan about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub borrower_id: i32,
    pub copy_id: i32,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

impl NewLoan {
    pub fn new(borrower_id: i32, copy_id: i32, issued_at: DateTime<Utc>, loan_period_days: i64) -> Self {
        Self {
            borrower_id,
            copy_id,
            issued_at,
            due_at: issued_at + Duration::days(loan_period_days),
        }
    }
}

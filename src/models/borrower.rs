//! Borrower model and the acting identity behind each request

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::Role;
use crate::error::{AppError, AppResult};

/// Borrower account from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Borrower {
    pub id: i32,
    pub username: String,
    pub role: Role,
    /// Never negative
    pub outstanding_fines: Decimal,
    pub suspended: bool,
}

impl Borrower {
    /// Add an accrued fine to the outstanding balance
    pub fn charge(&mut self, amount: Decimal) {
        if amount > Decimal::ZERO {
            self.outstanding_fines += amount;
        }
    }

    /// Settle part or all of the outstanding balance
    pub fn settle(&mut self, amount: Decimal) -> AppResult<()> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("Payment amount must be positive".to_string()));
        }
        if amount > self.outstanding_fines {
            return Err(AppError::Validation(format!(
                "Payment of {} exceeds outstanding fines of {}",
                amount, self.outstanding_fines
            )));
        }
        self.outstanding_fines -= amount;
        Ok(())
    }
}

/// Authenticated caller, as resolved by the authentication layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub borrower_id: i32,
    pub role: Role,
}

impl Actor {
    pub fn new(borrower_id: i32, role: Role) -> Self {
        Self { borrower_id, role }
    }

    /// Staff act for anyone, regular borrowers only for themselves
    pub fn ensure_can_act_for(&self, borrower_id: i32) -> AppResult<()> {
        if self.role.can_issue_loans() || self.borrower_id == borrower_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Borrower {} cannot act on behalf of borrower {}",
                self.borrower_id, borrower_id
            )))
        }
    }

    pub fn ensure_can_manage_catalog(&self) -> AppResult<()> {
        if self.role.can_manage_catalog() {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Borrower {} is not allowed to manage the catalog",
                self.borrower_id
            )))
        }
    }
}

impl From<&Borrower> for Actor {
    fn from(borrower: &Borrower) -> Self {
        Self::new(borrower.id, borrower.role)
    }
}

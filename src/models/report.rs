//! Read-only circulation reports

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::borrower::Borrower;

/// Active loan past its due date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueLoan {
    pub loan_id: i32,
    pub borrower_id: i32,
    pub copy_id: i32,
    pub due_at: DateTime<Utc>,
    pub days_overdue: i64,
    /// Fine the loan would accrue if returned now
    pub estimated_fine: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueReport {
    pub generated_at: DateTime<Utc>,
    pub loans: Vec<OverdueLoan>,
    pub total_estimated_fines: Decimal,
}

/// Account overview for one borrower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorrowerSummary {
    pub borrower: Borrower,
    pub can_borrow: bool,
    pub can_reserve: bool,
    pub total_loans: usize,
    pub active_loans: usize,
    pub returned_loans: usize,
    pub loans_with_fine: usize,
    pub total_fines: Decimal,
    pub active_reservations: usize,
    pub fulfilled_reservations: usize,
    pub cancelled_reservations: usize,
    pub expired_reservations: usize,
}

/// System-wide circulation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CirculationStats {
    pub active_loans: i64,
    pub overdue_loans: i64,
    /// Active loans due within the next few days, overdue ones included
    pub due_soon_loans: i64,
    pub active_reservations: i64,
    pub available_copies: i64,
    pub borrowers_with_fines: i64,
}

/// Title ranked by how many times its copies were lent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PopularTitle {
    pub title_id: i32,
    pub title: String,
    pub author: String,
    pub total_loans: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BorrowerFine {
    pub borrower_id: i32,
    pub username: String,
    pub outstanding_fines: Decimal,
}

//! Borrower-level gate for loans and reservations

use rust_decimal::Decimal;

use crate::models::Borrower;

/// Why a borrower was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    Suspended,
    OutstandingFines,
    LoanLimitReached { active: i64, limit: i64 },
}

impl std::fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ineligibility::Suspended => write!(f, "account is suspended"),
            Ineligibility::OutstandingFines => write!(f, "outstanding fines must be paid first"),
            Ineligibility::LoanLimitReached { active, limit } => {
                write!(f, "maximum loans reached ({}/{})", active, limit)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityPolicy {
    max_active_loans: i64,
}

impl EligibilityPolicy {
    pub fn new(max_active_loans: i64) -> Self {
        Self { max_active_loans }
    }

    pub fn can_borrow(&self, borrower: &Borrower, active_loans: i64) -> bool {
        self.borrow_denial(borrower, active_loans).is_none()
    }

    pub fn can_reserve(&self, borrower: &Borrower) -> bool {
        self.reserve_denial(borrower).is_none()
    }

    pub fn borrow_denial(&self, borrower: &Borrower, active_loans: i64) -> Option<Ineligibility> {
        self.reserve_denial(borrower).or_else(|| {
            (active_loans >= self.max_active_loans).then_some(Ineligibility::LoanLimitReached {
                active: active_loans,
                limit: self.max_active_loans,
            })
        })
    }

    pub fn reserve_denial(&self, borrower: &Borrower) -> Option<Ineligibility> {
        if borrower.suspended {
            Some(Ineligibility::Suspended)
        } else if borrower.outstanding_fines > Decimal::ZERO {
            Some(Ineligibility::OutstandingFines)
        } else {
            None
        }
    }
}

//! Overdue fine computation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Pure days-overdue to penalty conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineCalculator {
    per_day_rate: Decimal,
}

impl FineCalculator {
    pub fn new(per_day_rate: Decimal) -> Self {
        Self { per_day_rate }
    }

    /// Whole 24-hour periods elapsed between `due_at` and `at`, zero when not late.
    /// Partial days are truncated, never rounded.
    pub fn days_overdue(&self, due_at: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
        if at <= due_at {
            return 0;
        }
        (at - due_at).num_days()
    }

    pub fn compute(&self, due_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> Decimal {
        Decimal::from(self.days_overdue(due_at, returned_at)) * self.per_day_rate
    }
}

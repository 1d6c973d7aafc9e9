//! Read-only circulation reports

use chrono::Duration;
use rust_decimal::Decimal;

use super::ServiceContext;
use crate::{
    error::{AppError, AppResult},
    models::{
        Actor, BorrowerFine, BorrowerSummary, CirculationStats, LoanStatus, OverdueLoan,
        OverdueReport, PopularTitle, ReservationStatus,
    },
};

/// Loans due within this many days count as due soon
const DUE_SOON_DAYS: i64 = 3;

const POPULAR_TITLES_LIMIT: i64 = 10;

fn ensure_staff(actor: &Actor, report: &str) -> AppResult<()> {
    if actor.role.can_issue_loans() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Borrower {} is not allowed to view {}",
            actor.borrower_id, report
        )))
    }
}

#[derive(Clone)]
pub struct ReportsService {
    context: ServiceContext,
}

impl ReportsService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Active loans past due with the fine each would accrue if returned now
    pub async fn overdue(&self, actor: &Actor) -> AppResult<OverdueReport> {
        ensure_staff(actor, "overdue loans")?;

        let now = self.context.clock.now();
        let mut tx = self.context.repository.begin().await?;
        let overdue = tx.overdue_loans(now).await?;
        tx.commit().await?;

        let fines = &self.context.fines;
        let loans: Vec<OverdueLoan> = overdue
            .into_iter()
            .map(|loan| OverdueLoan {
                loan_id: loan.id,
                borrower_id: loan.borrower_id,
                copy_id: loan.copy_id,
                due_at: loan.due_at,
                days_overdue: fines.days_overdue(loan.due_at, now),
                estimated_fine: fines.compute(loan.due_at, now),
            })
            .collect();
        let total_estimated_fines = loans.iter().map(|l| l.estimated_fine).sum::<Decimal>();

        Ok(OverdueReport {
            generated_at: now,
            loans,
            total_estimated_fines,
        })
    }

    /// Account overview: eligibility, loan and reservation counts
    pub async fn borrower_summary(&self, actor: &Actor, borrower_id: i32) -> AppResult<BorrowerSummary> {
        actor.ensure_can_act_for(borrower_id)?;

        let mut tx = self.context.repository.begin().await?;
        let borrower = tx.get_borrower(borrower_id).await?;
        let loans = tx.loans_for_borrower(borrower_id).await?;
        let reservations = tx.reservations_for_borrower(borrower_id).await?;
        tx.commit().await?;

        let active_loans = loans.iter().filter(|l| l.status == LoanStatus::Active).count();
        let count_reservations =
            |status: ReservationStatus| reservations.iter().filter(|r| r.status == status).count();
        let policy = &self.context.eligibility;

        Ok(BorrowerSummary {
            can_borrow: policy.can_borrow(&borrower, active_loans as i64),
            can_reserve: policy.can_reserve(&borrower),
            total_loans: loans.len(),
            active_loans,
            returned_loans: loans.iter().filter(|l| l.status == LoanStatus::Returned).count(),
            loans_with_fine: loans.iter().filter(|l| l.fine > Decimal::ZERO).count(),
            total_fines: loans.iter().map(|l| l.fine).sum(),
            active_reservations: count_reservations(ReservationStatus::Active),
            fulfilled_reservations: count_reservations(ReservationStatus::Fulfilled),
            cancelled_reservations: count_reservations(ReservationStatus::Cancelled),
            expired_reservations: count_reservations(ReservationStatus::Expired),
            borrower,
        })
    }

    pub async fn circulation_stats(&self) -> AppResult<CirculationStats> {
        let now = self.context.clock.now();
        let mut tx = self.context.repository.begin().await?;
        let stats = tx
            .circulation_stats(now, now + Duration::days(DUE_SOON_DAYS))
            .await?;
        tx.commit().await?;
        Ok(stats)
    }

    /// The most lent titles, ties broken by catalog order
    pub async fn popular_titles(&self, actor: &Actor) -> AppResult<Vec<PopularTitle>> {
        ensure_staff(actor, "popular titles")?;
        let mut tx = self.context.repository.begin().await?;
        let titles = tx.popular_titles(POPULAR_TITLES_LIMIT).await?;
        tx.commit().await?;
        Ok(titles)
    }

    pub async fn borrowers_with_fines(&self, actor: &Actor) -> AppResult<Vec<BorrowerFine>> {
        ensure_staff(actor, "outstanding fines")?;
        let mut tx = self.context.repository.begin().await?;
        let owing = tx.borrowers_with_fines().await?;
        tx.commit().await?;
        Ok(owing)
    }
}

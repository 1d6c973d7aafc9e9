//! Loan ledger service

use rust_decimal::Decimal;

use super::{reservations, ServiceContext};
use crate::{
    error::{AppError, AppResult},
    models::{Actor, Borrower, Loan, NewLoan, Reservation},
};

#[derive(Clone)]
pub struct LoansService {
    context: ServiceContext,
}

impl LoansService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Lend an available copy to an eligible borrower
    pub async fn issue(&self, actor: &Actor, borrower_id: i32, copy_id: i32) -> AppResult<Loan> {
        actor.ensure_can_act_for(borrower_id)?;
        self.context
            .retry("issue", || self.try_issue(borrower_id, copy_id))
            .await
    }

    async fn try_issue(&self, borrower_id: i32, copy_id: i32) -> AppResult<Loan> {
        let now = self.context.clock.now();
        let mut tx = self.context.repository.begin().await?;

        let borrower = tx.lock_borrower(borrower_id).await?;
        let mut copy = tx.lock_copy(copy_id).await?;

        let active_loans = tx.count_active_loans(borrower.id).await?;
        if let Some(reason) = self.context.eligibility.borrow_denial(&borrower, active_loans) {
            return Err(AppError::BorrowerIneligible(format!(
                "Borrower {} cannot borrow: {}",
                borrower.username, reason
            )));
        }

        copy.check_out()?;

        let new_loan = NewLoan::new(borrower.id, copy.id, now, self.context.rules.loan_period_days);
        let loan = tx.insert_loan(&new_loan).await?;
        tx.update_copy(&copy).await?;
        tx.commit().await?;

        tracing::info!(
            "Loan {} issued: copy {} to borrower {}, due {}",
            loan.id,
            copy.barcode,
            borrower.username,
            loan.due_at
        );
        Ok(loan)
    }

    /// Check in a copy at the desk: close the loan, charge any fine and hand
    /// the copy to the queue. Staff only.
    pub async fn return_loan(&self, actor: &Actor, loan_id: i32) -> AppResult<Loan> {
        if !actor.role.can_issue_loans() {
            return Err(AppError::Forbidden(format!(
                "Borrower {} is not allowed to check in loans",
                actor.borrower_id
            )));
        }
        let (loan, promoted) = self
            .context
            .retry("return", || self.try_return(loan_id))
            .await?;

        if let (Some(reservation), Some(returned_at)) = (promoted, loan.returned_at) {
            reservations::announce(&self.context, &reservation, returned_at);
        }
        Ok(loan)
    }

    async fn try_return(&self, loan_id: i32) -> AppResult<(Loan, Option<Reservation>)> {
        let now = self.context.clock.now();
        let mut tx = self.context.repository.begin().await?;

        let mut loan = tx.lock_loan(loan_id).await?;
        if !loan.is_active() {
            return Err(AppError::LoanNotActive(loan.id));
        }

        let mut borrower = tx.lock_borrower(loan.borrower_id).await?;
        let mut copy = tx.lock_copy(loan.copy_id).await?;

        let fine = self.context.fines.compute(loan.due_at, now);
        loan.close(now, fine)?;
        copy.check_in()?;

        tx.update_loan(&loan).await?;
        if fine > Decimal::ZERO {
            borrower.charge(fine);
            tx.update_borrower(&borrower).await?;
        }
        tx.update_copy(&copy).await?;

        let promoted = reservations::promote_head(tx.as_mut(), copy.title_id).await?;
        tx.commit().await?;

        tracing::info!(
            "Loan {} returned: copy {} by borrower {}, fine {}",
            loan.id,
            copy.barcode,
            borrower.username,
            fine
        );
        Ok((loan, promoted))
    }

    /// Pay off part or all of a borrower's outstanding fines; staff may take
    /// payment at the desk for any borrower
    pub async fn pay_fine(&self, actor: &Actor, borrower_id: i32, amount: Decimal) -> AppResult<Borrower> {
        actor.ensure_can_act_for(borrower_id)?;
        self.context
            .retry("pay_fine", move || async move {
                let mut tx = self.context.repository.begin().await?;
                let mut borrower = tx.lock_borrower(borrower_id).await?;
                borrower.settle(amount)?;
                tx.update_borrower(&borrower).await?;
                tx.commit().await?;

                tracing::info!(
                    "Borrower {} paid {}, {} outstanding",
                    borrower.username,
                    amount,
                    borrower.outstanding_fines
                );
                Ok(borrower)
            })
            .await
    }

    /// Loan history of a borrower, newest first
    pub async fn borrower_loans(&self, actor: &Actor, borrower_id: i32) -> AppResult<Vec<Loan>> {
        actor.ensure_can_act_for(borrower_id)?;
        let mut tx = self.context.repository.begin().await?;
        tx.get_borrower(borrower_id).await?;
        let loans = tx.loans_for_borrower(borrower_id).await?;
        tx.commit().await?;
        Ok(loans)
    }
}

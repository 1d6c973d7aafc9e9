//! Reservation queue service
//!
//! Every operation that touches a title's queue locks the title row first, so
//! enrolment, cancellation, promotion and expiry on one title never interleave.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{notifier::HoldReady, ServiceContext};
use crate::{
    error::{AppError, AppResult},
    models::{Actor, Removal, Reservation, ReservationQueue, ReservationStatus},
    repository::UnitOfWork,
};

/// Outcome of one expiry sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub expired: Vec<Reservation>,
    pub failures: Vec<SweepFailure>,
}

/// A title whose queue could not be fully swept
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub title_id: i32,
    pub error: String,
}

#[derive(Clone)]
pub struct ReservationsService {
    context: ServiceContext,
}

impl ReservationsService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Join the tail of a title's waiting queue
    pub async fn enroll(&self, actor: &Actor, borrower_id: i32, title_id: i32) -> AppResult<Reservation> {
        actor.ensure_can_act_for(borrower_id)?;
        self.context
            .retry("enroll", || self.try_enroll(borrower_id, title_id))
            .await
    }

    async fn try_enroll(&self, borrower_id: i32, title_id: i32) -> AppResult<Reservation> {
        let now = self.context.clock.now();
        let mut tx = self.context.repository.begin().await?;

        let borrower = tx.lock_borrower(borrower_id).await?;
        tx.lock_title(title_id).await?;

        if let Some(reason) = self.context.eligibility.reserve_denial(&borrower) {
            return Err(AppError::BorrowerIneligible(format!(
                "Borrower {} cannot reserve: {}",
                borrower.username, reason
            )));
        }

        let mut queue = ReservationQueue::new(title_id, tx.active_reservations(title_id).await?)?;
        if queue.contains_borrower(borrower.id) {
            return Err(AppError::DuplicateReservation(format!(
                "Borrower {} already has an active reservation for title {}",
                borrower.username, title_id
            )));
        }

        let entry = queue.tail_entry(borrower.id, now, self.context.rules.hold_period_days);
        let reservation = tx.insert_reservation(&entry).await?;
        queue.push(reservation.clone())?;
        tx.commit().await?;

        tracing::info!(
            "Reservation {} created: borrower {} title {} position {}",
            reservation.id,
            borrower.id,
            title_id,
            reservation.position
        );
        Ok(reservation)
    }

    /// Leave a queue; everyone behind moves up one place
    pub async fn cancel(&self, actor: &Actor, reservation_id: i32) -> AppResult<Reservation> {
        self.context
            .retry("cancel", || self.try_cancel(actor, reservation_id))
            .await
    }

    async fn try_cancel(&self, actor: &Actor, reservation_id: i32) -> AppResult<Reservation> {
        let mut tx = self.context.repository.begin().await?;

        let reservation = tx.get_reservation(reservation_id).await?;
        actor.ensure_can_act_for(reservation.borrower_id)?;
        if !reservation.is_active() {
            return Err(AppError::ReservationNotActive(reservation_id));
        }

        tx.lock_title(reservation.title_id).await?;
        let mut queue = ReservationQueue::new(
            reservation.title_id,
            tx.active_reservations(reservation.title_id).await?,
        )?;
        // Re-read under the title lock: a concurrent promotion or sweep may have won
        let removal = queue.remove(reservation_id, ReservationStatus::Cancelled)?;
        persist_removal(tx.as_mut(), &removal).await?;
        tx.commit().await?;

        tracing::info!(
            "Reservation {} cancelled: title {} position {}, {} renumbered",
            reservation_id,
            reservation.title_id,
            removal.removed.position,
            removal.renumbered.len()
        );
        Ok(removal.removed)
    }

    /// Fulfil the head of a title's queue, if any
    pub async fn promote(&self, title_id: i32) -> AppResult<Option<Reservation>> {
        let promoted = self
            .context
            .retry("promote", move || async move {
                let now = self.context.clock.now();
                let mut tx = self.context.repository.begin().await?;
                let promoted = promote_head(tx.as_mut(), title_id).await?;
                tx.commit().await?;
                Ok(promoted.map(|r| (r, now)))
            })
            .await?;

        Ok(promoted.map(|(reservation, at)| {
            announce(&self.context, &reservation, at);
            reservation
        }))
    }

    /// Expire every active reservation whose hold lapsed before `now`.
    ///
    /// Titles are swept independently; a failing title is reported and the
    /// sweep moves on. Within a title reservations expire one transaction at a
    /// time in position order, so an interrupted sweep leaves a dense queue
    /// and can simply run again.
    pub async fn expire_sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let titles = self
            .context
            .retry("expire_sweep", move || async move {
                let mut tx = self.context.repository.begin().await?;
                let titles = tx.titles_with_expired_reservations(now).await?;
                tx.commit().await?;
                Ok(titles)
            })
            .await?;

        let mut report = SweepReport::default();
        for title_id in titles {
            if let Err(e) = self.expire_title(title_id, now, &mut report).await {
                tracing::warn!("Expiry sweep failed for title {}: {}", title_id, e);
                report.failures.push(SweepFailure {
                    title_id,
                    error: e.to_string(),
                });
            }
        }

        if !report.expired.is_empty() || !report.failures.is_empty() {
            tracing::info!(
                "Expiry sweep: {} reservations expired, {} titles failed",
                report.expired.len(),
                report.failures.len()
            );
        }
        Ok(report)
    }

    async fn expire_title(&self, title_id: i32, now: DateTime<Utc>, report: &mut SweepReport) -> AppResult<()> {
        while let Some(expired) = self
            .context
            .retry("expire", || self.expire_next(title_id, now))
            .await?
        {
            report.expired.push(expired);
        }
        Ok(())
    }

    async fn expire_next(&self, title_id: i32, now: DateTime<Utc>) -> AppResult<Option<Reservation>> {
        let mut tx = self.context.repository.begin().await?;
        tx.lock_title(title_id).await?;
        let mut queue = ReservationQueue::new(title_id, tx.active_reservations(title_id).await?)?;

        let Some(reservation_id) = queue.first_expired(now).map(|r| r.id) else {
            return Ok(None);
        };
        let removal = queue.remove(reservation_id, ReservationStatus::Expired)?;
        persist_removal(tx.as_mut(), &removal).await?;
        tx.commit().await?;

        tracing::info!(
            "Reservation {} expired: title {} position {}",
            reservation_id,
            title_id,
            removal.removed.position
        );
        Ok(Some(removal.removed))
    }

    /// Active reservations of a title in queue order
    pub async fn queue(&self, title_id: i32) -> AppResult<Vec<Reservation>> {
        let mut tx = self.context.repository.begin().await?;
        tx.get_title(title_id).await?;
        let queue = ReservationQueue::new(title_id, tx.active_reservations(title_id).await?)?;
        tx.commit().await?;
        Ok(queue.into_entries())
    }

    pub async fn borrower_reservations(&self, actor: &Actor, borrower_id: i32) -> AppResult<Vec<Reservation>> {
        actor.ensure_can_act_for(borrower_id)?;
        let mut tx = self.context.repository.begin().await?;
        tx.get_borrower(borrower_id).await?;
        let reservations = tx.reservations_for_borrower(borrower_id).await?;
        tx.commit().await?;
        Ok(reservations)
    }
}

/// Fulfil the head reservation of a title inside an open unit of work
pub(crate) async fn promote_head(tx: &mut dyn UnitOfWork, title_id: i32) -> AppResult<Option<Reservation>> {
    tx.lock_title(title_id).await?;
    let mut queue = ReservationQueue::new(title_id, tx.active_reservations(title_id).await?)?;

    let Some(head_id) = queue.head().map(|r| r.id) else {
        tracing::debug!("No waiting reservation for title {}", title_id);
        return Ok(None);
    };
    let removal = queue.remove(head_id, ReservationStatus::Fulfilled)?;
    persist_removal(tx, &removal).await?;

    tracing::info!(
        "Reservation {} fulfilled: borrower {} title {}, {} renumbered",
        head_id,
        removal.removed.borrower_id,
        title_id,
        removal.renumbered.len()
    );
    Ok(Some(removal.removed))
}

/// Write a removal: the removed reservation first, then the renumbered ones
/// in ascending position so no two active rows ever share a position
async fn persist_removal(tx: &mut dyn UnitOfWork, removal: &Removal) -> AppResult<()> {
    tx.update_reservation(&removal.removed).await?;
    for reservation in &removal.renumbered {
        tx.update_reservation(reservation).await?;
    }
    Ok(())
}

/// Tell the outside world a hold is ready; call only after commit
pub(crate) fn announce(context: &ServiceContext, reservation: &Reservation, at: DateTime<Utc>) {
    context.notifier.hold_ready(HoldReady {
        reservation_id: reservation.id,
        borrower_id: reservation.borrower_id,
        title_id: reservation.title_id,
        fulfilled_at: at,
    });
}

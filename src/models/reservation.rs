//! Reservation model and the per-title waiting queue
//!
//! Active reservations of a title hold positions `1..=N` with no gaps or
//! duplicates, ordered by creation time. Every removal (fulfilment,
//! cancellation, expiry) recomputes the dense ranking of what remains, so the
//! reservations behind the removed one each move up by exactly one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::ReservationStatus;
use crate::error::{AppError, AppResult};

/// Reservation model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: i32,
    pub borrower_id: i32,
    pub title_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ReservationStatus,
    /// 1-based place in the title's queue; meaningful only while active
    pub position: i32,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < now
    }
}

/// Reservation about to be inserted at the tail of a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub borrower_id: i32,
    pub title_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub position: i32,
}

/// Outcome of taking one reservation out of a queue
#[derive(Debug, Clone)]
pub struct Removal {
    pub removed: Reservation,
    /// Reservations whose position changed, in ascending position order
    pub renumbered: Vec<Reservation>,
}

/// Active reservations of one title, in queue order
#[derive(Debug, Clone)]
pub struct ReservationQueue {
    title_id: i32,
    entries: Vec<Reservation>,
}

impl ReservationQueue {
    pub fn new(title_id: i32, mut active: Vec<Reservation>) -> AppResult<Self> {
        if let Some(stray) = active
            .iter()
            .find(|r| r.title_id != title_id || !r.is_active())
        {
            return Err(AppError::Internal(format!(
                "Reservation {} does not belong to the active queue of title {}",
                stray.id, title_id
            )));
        }
        active.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(Self { title_id, entries: active })
    }

    pub fn entries(&self) -> &[Reservation] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Reservation> {
        self.entries
    }

    pub fn head(&self) -> Option<&Reservation> {
        self.entries.first()
    }

    pub fn contains_borrower(&self, borrower_id: i32) -> bool {
        self.entries.iter().any(|r| r.borrower_id == borrower_id)
    }

    /// Build the reservation that goes to the tail of the queue
    pub fn tail_entry(&self, borrower_id: i32, created_at: DateTime<Utc>, hold_period_days: i64) -> NewReservation {
        NewReservation {
            borrower_id,
            title_id: self.title_id,
            created_at,
            expires_at: created_at + Duration::days(hold_period_days),
            position: self.entries.len() as i32 + 1,
        }
    }

    /// Append a freshly inserted reservation
    pub fn push(&mut self, reservation: Reservation) -> AppResult<()> {
        if reservation.position != self.entries.len() as i32 + 1 {
            return Err(AppError::Internal(format!(
                "Reservation {} inserted at position {} but queue of title {} has {} entries",
                reservation.id,
                reservation.position,
                self.title_id,
                self.entries.len()
            )));
        }
        self.entries.push(reservation);
        Ok(())
    }

    /// Take a reservation out of the queue with its final status and renumber the rest
    pub fn remove(&mut self, reservation_id: i32, status: ReservationStatus) -> AppResult<Removal> {
        if status == ReservationStatus::Active {
            return Err(AppError::Internal("A removed reservation cannot stay active".to_string()));
        }
        let index = self
            .entries
            .iter()
            .position(|r| r.id == reservation_id)
            .ok_or(AppError::ReservationNotActive(reservation_id))?;

        let mut removed = self.entries.remove(index);
        removed.status = status;

        let mut renumbered = Vec::new();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            let position = i as i32 + 1;
            if entry.position != position {
                entry.position = position;
                renumbered.push(entry.clone());
            }
        }

        Ok(Removal { removed, renumbered })
    }

    /// The lowest-positioned reservation whose hold has lapsed
    pub fn first_expired(&self, now: DateTime<Utc>) -> Option<&Reservation> {
        self.entries.iter().find(|r| r.is_expired(now))
    }

    /// Positions are exactly `1..=N`
    pub fn is_dense(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(i, r)| r.position == i as i32 + 1)
    }
}

//! Repository layer: transactional access to circulation records
//!
//! Services open a [`UnitOfWork`], lock and read the rows they are about to
//! change, validate, write, then commit. Dropping a unit of work without
//! committing rolls it back. Locking the title row is the critical section for
//! that title's reservation queue.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        BookCopy, Borrower, BorrowerFine, Branch, BranchAvailability, CirculationStats, Loan,
        NewLoan, NewReservation, PopularTitle, Reservation, Title, TitleInventory,
    },
};

pub use memory::InMemoryRepository;
pub use postgres::PgRepository;

/// Entry point to the transactional store
#[async_trait]
pub trait Repository: Send + Sync {
    /// Begin a new unit of work
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}

/// One open transaction
#[async_trait]
pub trait UnitOfWork: Send {
    // -- Locking reads -------------------------------------------------------

    async fn lock_borrower(&mut self, id: i32) -> AppResult<Borrower>;

    async fn lock_copy(&mut self, id: i32) -> AppResult<BookCopy>;

    async fn lock_loan(&mut self, id: i32) -> AppResult<Loan>;

    /// Enter the title's queue critical section
    async fn lock_title(&mut self, id: i32) -> AppResult<Title>;

    /// Active reservations of a title ordered by position; call after `lock_title`
    async fn active_reservations(&mut self, title_id: i32) -> AppResult<Vec<Reservation>>;

    // -- Plain reads ---------------------------------------------------------

    async fn get_borrower(&mut self, id: i32) -> AppResult<Borrower>;

    async fn get_branch(&mut self, id: i32) -> AppResult<Branch>;

    async fn get_title(&mut self, id: i32) -> AppResult<Title>;

    async fn get_reservation(&mut self, id: i32) -> AppResult<Reservation>;

    async fn count_active_loans(&mut self, borrower_id: i32) -> AppResult<i64>;

    /// Titles holding at least one active reservation that expired before `now`
    async fn titles_with_expired_reservations(&mut self, now: DateTime<Utc>) -> AppResult<Vec<i32>>;

    /// Loan history of a borrower, newest first
    async fn loans_for_borrower(&mut self, borrower_id: i32) -> AppResult<Vec<Loan>>;

    /// Reservation history of a borrower, newest first
    async fn reservations_for_borrower(&mut self, borrower_id: i32) -> AppResult<Vec<Reservation>>;

    /// Active loans due before `now`, oldest due date first
    async fn overdue_loans(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>>;

    /// Available copies of a title grouped by active branch
    async fn availability(&mut self, title_id: i32) -> AppResult<Vec<BranchAvailability>>;

    /// Counters as of `now`; loans due at or before `due_soon_before` count as due soon
    async fn circulation_stats(
        &mut self,
        now: DateTime<Utc>,
        due_soon_before: DateTime<Utc>,
    ) -> AppResult<CirculationStats>;

    /// Titles by total number of loans ever issued, most lent first
    async fn popular_titles(&mut self, limit: i64) -> AppResult<Vec<PopularTitle>>;

    /// Borrowers owing fines, largest balance first
    async fn borrowers_with_fines(&mut self) -> AppResult<Vec<BorrowerFine>>;

    /// Per-title copy counts by status for one branch, ordered by title
    async fn branch_inventory(&mut self, branch_id: i32) -> AppResult<Vec<TitleInventory>>;

    // -- Writes --------------------------------------------------------------

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan>;

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()>;

    async fn update_copy(&mut self, copy: &BookCopy) -> AppResult<()>;

    async fn update_borrower(&mut self, borrower: &Borrower) -> AppResult<()>;

    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation>;

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()>;

    /// Make every write of this unit of work visible atomically
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

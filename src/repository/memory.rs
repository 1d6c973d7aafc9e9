//! In-memory repository
//!
//! A unit of work holds the store-wide lock for its whole lifetime and writes
//! to a private copy of the state, which replaces the shared state on commit.
//! Every unit of work is therefore serializable, and dropping one discards
//! its writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Repository, UnitOfWork};
use crate::{
    error::{AppError, AppResult},
    models::{
        BookCopy, Borrower, BorrowerFine, Branch, BranchAvailability, CirculationStats,
        CopyStatus, Loan, LoanStatus, NewLoan, NewReservation, PopularTitle, Reservation,
        ReservationStatus, Role, Title, TitleInventory,
    },
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    borrowers: BTreeMap<i32, Borrower>,
    branches: BTreeMap<i32, Branch>,
    titles: BTreeMap<i32, Title>,
    copies: BTreeMap<i32, BookCopy>,
    loans: BTreeMap<i32, Loan>,
    reservations: BTreeMap<i32, Reservation>,
    last_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }
}

/// Title id to the number of lock acquisitions still allowed before every
/// further lock of that title fails
type TitleFaults = Arc<Mutex<HashMap<i32, u32>>>;

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    pending_conflicts: Arc<AtomicU32>,
    title_faults: TitleFaults,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with `AppError::Conflict`
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Let `successes` more locks of the title through, then fail every
    /// later one with `AppError::Conflict`
    pub async fn fail_title_locks_after(&self, title_id: i32, successes: u32) {
        self.title_faults.lock().await.insert(title_id, successes);
    }

    pub async fn clear_title_faults(&self) {
        self.title_faults.lock().await.clear();
    }

    // -- Catalog setup -------------------------------------------------------

    pub async fn add_branch(&self, name: &str) -> Branch {
        let mut state = self.state.lock().await;
        let branch = Branch {
            id: state.next_id(),
            name: name.to_string(),
            active: true,
        };
        state.branches.insert(branch.id, branch.clone());
        branch
    }

    pub async fn add_title(&self, title: &str, author: &str, isbn: &str) -> AppResult<Title> {
        let mut state = self.state.lock().await;
        if state.titles.values().any(|t| t.isbn == isbn) {
            return Err(AppError::Validation(format!("ISBN {} already exists", isbn)));
        }
        let title = Title {
            id: state.next_id(),
            title: title.to_string(),
            author: author.to_string(),
            isbn: isbn.to_string(),
        };
        state.titles.insert(title.id, title.clone());
        Ok(title)
    }

    pub async fn add_copy(&self, title_id: i32, branch_id: i32, barcode: &str) -> AppResult<BookCopy> {
        let mut state = self.state.lock().await;
        if !state.titles.contains_key(&title_id) {
            return Err(AppError::NotFound(format!("Title with id {} not found", title_id)));
        }
        if !state.branches.contains_key(&branch_id) {
            return Err(AppError::NotFound(format!("Branch with id {} not found", branch_id)));
        }
        if state.copies.values().any(|c| c.barcode == barcode) {
            return Err(AppError::Validation(format!("Barcode {} already exists", barcode)));
        }
        let copy = BookCopy {
            id: state.next_id(),
            title_id,
            branch_id,
            barcode: barcode.to_string(),
            status: CopyStatus::Available,
        };
        state.copies.insert(copy.id, copy.clone());
        Ok(copy)
    }

    pub async fn add_borrower(&self, username: &str, role: Role) -> Borrower {
        let mut state = self.state.lock().await;
        let borrower = Borrower {
            id: state.next_id(),
            username: username.to_string(),
            role,
            outstanding_fines: Decimal::ZERO,
            suspended: false,
        };
        state.borrowers.insert(borrower.id, borrower.clone());
        borrower
    }

    /// Overwrite a borrower record (suspension, balance) outside any unit of work
    pub async fn put_borrower(&self, borrower: Borrower) {
        self.state.lock().await.borrowers.insert(borrower.id, borrower);
    }

    pub async fn deactivate_branch(&self, id: i32) {
        if let Some(branch) = self.state.lock().await.branches.get_mut(&id) {
            branch.active = false;
        }
    }

    // -- Inspection ----------------------------------------------------------

    pub async fn borrower(&self, id: i32) -> Option<Borrower> {
        self.state.lock().await.borrowers.get(&id).cloned()
    }

    pub async fn copy(&self, id: i32) -> Option<BookCopy> {
        self.state.lock().await.copies.get(&id).cloned()
    }

    pub async fn loan(&self, id: i32) -> Option<Loan> {
        self.state.lock().await.loans.get(&id).cloned()
    }

    pub async fn reservation(&self, id: i32) -> Option<Reservation> {
        self.state.lock().await.reservations.get(&id).cloned()
    }

    pub async fn loans_for_copy(&self, copy_id: i32) -> Vec<Loan> {
        self.state
            .lock()
            .await
            .loans
            .values()
            .filter(|l| l.copy_id == copy_id)
            .cloned()
            .collect()
    }

    /// All reservations of a title, any status, ordered by id
    pub async fn reservations_for_title(&self, title_id: i32) -> Vec<Reservation> {
        self.state
            .lock()
            .await
            .reservations
            .values()
            .filter(|r| r.title_id == title_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            work,
            pending_conflicts: self.pending_conflicts.clone(),
            title_faults: self.title_faults.clone(),
        }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
    pending_conflicts: Arc<AtomicU32>,
    title_faults: TitleFaults,
}

fn not_found(entity: &str, id: i32) -> AppError {
    AppError::NotFound(format!("{} with id {} not found", entity, id))
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_borrower(&mut self, id: i32) -> AppResult<Borrower> {
        self.get_borrower(id).await
    }

    async fn lock_copy(&mut self, id: i32) -> AppResult<BookCopy> {
        self.work.copies.get(&id).cloned().ok_or_else(|| not_found("Copy", id))
    }

    async fn lock_loan(&mut self, id: i32) -> AppResult<Loan> {
        self.work.loans.get(&id).cloned().ok_or_else(|| not_found("Loan", id))
    }

    async fn lock_title(&mut self, id: i32) -> AppResult<Title> {
        if let Some(remaining) = self.title_faults.lock().await.get_mut(&id) {
            if *remaining == 0 {
                return Err(AppError::Conflict(format!("Injected lock failure on title {}", id)));
            }
            *remaining -= 1;
        }
        self.get_title(id).await
    }

    async fn active_reservations(&mut self, title_id: i32) -> AppResult<Vec<Reservation>> {
        let mut active: Vec<Reservation> = self
            .work
            .reservations
            .values()
            .filter(|r| r.title_id == title_id && r.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|r| (r.position, r.created_at, r.id));
        Ok(active)
    }

    async fn get_borrower(&mut self, id: i32) -> AppResult<Borrower> {
        self.work.borrowers.get(&id).cloned().ok_or_else(|| not_found("Borrower", id))
    }

    async fn get_branch(&mut self, id: i32) -> AppResult<Branch> {
        self.work.branches.get(&id).cloned().ok_or_else(|| not_found("Branch", id))
    }

    async fn get_title(&mut self, id: i32) -> AppResult<Title> {
        self.work.titles.get(&id).cloned().ok_or_else(|| not_found("Title", id))
    }

    async fn get_reservation(&mut self, id: i32) -> AppResult<Reservation> {
        self.work
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Reservation", id))
    }

    async fn count_active_loans(&mut self, borrower_id: i32) -> AppResult<i64> {
        Ok(self
            .work
            .loans
            .values()
            .filter(|l| l.borrower_id == borrower_id && l.is_active())
            .count() as i64)
    }

    async fn titles_with_expired_reservations(&mut self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let mut titles: Vec<i32> = self
            .work
            .reservations
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.title_id)
            .collect();
        titles.sort_unstable();
        titles.dedup();
        Ok(titles)
    }

    async fn loans_for_borrower(&mut self, borrower_id: i32) -> AppResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .work
            .loans
            .values()
            .filter(|l| l.borrower_id == borrower_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then(b.id.cmp(&a.id)));
        Ok(loans)
    }

    async fn reservations_for_borrower(&mut self, borrower_id: i32) -> AppResult<Vec<Reservation>> {
        let mut reservations: Vec<Reservation> = self
            .work
            .reservations
            .values()
            .filter(|r| r.borrower_id == borrower_id)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reservations)
    }

    async fn overdue_loans(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .work
            .loans
            .values()
            .filter(|l| l.is_active() && l.due_at < now)
            .cloned()
            .collect();
        loans.sort_by_key(|l| (l.due_at, l.id));
        Ok(loans)
    }

    async fn availability(&mut self, title_id: i32) -> AppResult<Vec<BranchAvailability>> {
        let mut per_branch: BTreeMap<i32, i64> = BTreeMap::new();
        for copy in self.work.copies.values() {
            if copy.title_id == title_id && copy.status == CopyStatus::Available {
                *per_branch.entry(copy.branch_id).or_default() += 1;
            }
        }

        let mut rows: Vec<BranchAvailability> = per_branch
            .into_iter()
            .filter_map(|(branch_id, available)| {
                let branch = self.work.branches.get(&branch_id)?;
                branch.active.then(|| BranchAvailability {
                    branch_id,
                    branch_name: branch.name.clone(),
                    available,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.branch_name.cmp(&b.branch_name));
        Ok(rows)
    }

    async fn circulation_stats(
        &mut self,
        now: DateTime<Utc>,
        due_soon_before: DateTime<Utc>,
    ) -> AppResult<CirculationStats> {
        let loans = self.work.loans.values();
        Ok(CirculationStats {
            active_loans: loans.clone().filter(|l| l.status == LoanStatus::Active).count() as i64,
            overdue_loans: loans.clone().filter(|l| l.is_active() && l.due_at < now).count() as i64,
            due_soon_loans: loans
                .filter(|l| l.is_active() && l.due_at <= due_soon_before)
                .count() as i64,
            active_reservations: self
                .work
                .reservations
                .values()
                .filter(|r| r.status == ReservationStatus::Active)
                .count() as i64,
            available_copies: self
                .work
                .copies
                .values()
                .filter(|c| c.status == CopyStatus::Available)
                .count() as i64,
            borrowers_with_fines: self
                .work
                .borrowers
                .values()
                .filter(|b| b.outstanding_fines > Decimal::ZERO)
                .count() as i64,
        })
    }

    async fn popular_titles(&mut self, limit: i64) -> AppResult<Vec<PopularTitle>> {
        let mut loans_per_title: BTreeMap<i32, i64> = BTreeMap::new();
        for loan in self.work.loans.values() {
            if let Some(copy) = self.work.copies.get(&loan.copy_id) {
                *loans_per_title.entry(copy.title_id).or_default() += 1;
            }
        }

        let mut titles: Vec<PopularTitle> = self
            .work
            .titles
            .values()
            .map(|t| PopularTitle {
                title_id: t.id,
                title: t.title.clone(),
                author: t.author.clone(),
                total_loans: loans_per_title.get(&t.id).copied().unwrap_or_default(),
            })
            .collect();
        titles.sort_by(|a, b| b.total_loans.cmp(&a.total_loans).then(a.title_id.cmp(&b.title_id)));
        titles.truncate(usize::try_from(limit).unwrap_or_default());
        Ok(titles)
    }

    async fn borrowers_with_fines(&mut self) -> AppResult<Vec<BorrowerFine>> {
        let mut owing: Vec<BorrowerFine> = self
            .work
            .borrowers
            .values()
            .filter(|b| b.outstanding_fines > Decimal::ZERO)
            .map(|b| BorrowerFine {
                borrower_id: b.id,
                username: b.username.clone(),
                outstanding_fines: b.outstanding_fines,
            })
            .collect();
        owing.sort_by(|a, b| {
            b.outstanding_fines
                .cmp(&a.outstanding_fines)
                .then(a.borrower_id.cmp(&b.borrower_id))
        });
        Ok(owing)
    }

    async fn branch_inventory(&mut self, branch_id: i32) -> AppResult<Vec<TitleInventory>> {
        let mut per_title: BTreeMap<i32, TitleInventory> = BTreeMap::new();
        for copy in self.work.copies.values().filter(|c| c.branch_id == branch_id) {
            let Some(title) = self.work.titles.get(&copy.title_id) else {
                continue;
            };
            let row = per_title.entry(title.id).or_insert_with(|| TitleInventory {
                title_id: title.id,
                title: title.title.clone(),
                author: title.author.clone(),
                isbn: title.isbn.clone(),
                ..Default::default()
            });
            match copy.status {
                CopyStatus::Available => row.available += 1,
                CopyStatus::Loaned => row.loaned += 1,
                CopyStatus::Maintenance => row.maintenance += 1,
                CopyStatus::Lost => row.lost += 1,
            }
            row.total += 1;
        }

        let mut rows: Vec<TitleInventory> = per_title.into_values().collect();
        rows.sort_by(|a, b| a.title.cmp(&b.title).then(a.title_id.cmp(&b.title_id)));
        Ok(rows)
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        if self
            .work
            .loans
            .values()
            .any(|l| l.copy_id == loan.copy_id && l.is_active())
        {
            return Err(AppError::Conflict(format!(
                "Copy {} already has an active loan",
                loan.copy_id
            )));
        }
        let loan = Loan {
            id: self.work.next_id(),
            borrower_id: loan.borrower_id,
            copy_id: loan.copy_id,
            issued_at: loan.issued_at,
            due_at: loan.due_at,
            returned_at: None,
            status: LoanStatus::Active,
            fine: Decimal::ZERO,
        };
        self.work.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        let stored = self.work.loans.get_mut(&loan.id).ok_or_else(|| not_found("Loan", loan.id))?;
        *stored = loan.clone();
        Ok(())
    }

    async fn update_copy(&mut self, copy: &BookCopy) -> AppResult<()> {
        let stored = self.work.copies.get_mut(&copy.id).ok_or_else(|| not_found("Copy", copy.id))?;
        *stored = copy.clone();
        Ok(())
    }

    async fn update_borrower(&mut self, borrower: &Borrower) -> AppResult<()> {
        let stored = self
            .work
            .borrowers
            .get_mut(&borrower.id)
            .ok_or_else(|| not_found("Borrower", borrower.id))?;
        *stored = borrower.clone();
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation> {
        let clash = self.work.reservations.values().any(|r| {
            r.is_active()
                && r.title_id == reservation.title_id
                && (r.borrower_id == reservation.borrower_id || r.position == reservation.position)
        });
        if clash {
            return Err(AppError::Conflict(format!(
                "Reservation for title {} clashes with an active reservation",
                reservation.title_id
            )));
        }
        let reservation = Reservation {
            id: self.work.next_id(),
            borrower_id: reservation.borrower_id,
            title_id: reservation.title_id,
            created_at: reservation.created_at,
            expires_at: reservation.expires_at,
            status: ReservationStatus::Active,
            position: reservation.position,
        };
        self.work.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()> {
        let stored = self
            .work
            .reservations
            .get_mut(&reservation.id)
            .ok_or_else(|| not_found("Reservation", reservation.id))?;
        *stored = reservation.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AppError::Conflict("Injected commit conflict".to_string()));
        }

        let MemoryUnitOfWork { mut guard, work, .. } = *self;
        *guard = work;
        Ok(())
    }
}

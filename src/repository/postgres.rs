//! PostgreSQL-backed repository
//!
//! Runs at READ COMMITTED; every row a transaction is about to change is read
//! with `FOR UPDATE`, so concurrent writers on the same borrower, copy, loan or
//! title queue serialize on the row lock. Deadlocks and lock timeouts surface
//! as `AppError::Conflict` through the `sqlx::Error` conversion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use super::{Repository, UnitOfWork};
use crate::{
    error::{AppError, AppResult},
    models::{
        BookCopy, Borrower, BorrowerFine, Branch, BranchAvailability, CirculationStats, Loan,
        NewLoan, NewReservation, PopularTitle, Reservation, Title, TitleInventory,
    },
};

#[derive(Clone)]
pub struct PgRepository {
    pool: Pool<Postgres>,
}

impl PgRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;
        // Fail fast on a busy row instead of queueing indefinitely; the service retries
        sqlx::query("SET LOCAL lock_timeout = '2s'")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn not_found(entity: &str, id: i32) -> AppError {
    AppError::NotFound(format!("{} with id {} not found", entity, id))
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_borrower(&mut self, id: i32) -> AppResult<Borrower> {
        sqlx::query_as::<_, Borrower>("SELECT * FROM borrowers WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| not_found("Borrower", id))
    }

    async fn lock_copy(&mut self, id: i32) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopy>("SELECT * FROM copies WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| not_found("Copy", id))
    }

    async fn lock_loan(&mut self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| not_found("Loan", id))
    }

    async fn lock_title(&mut self, id: i32) -> AppResult<Title> {
        sqlx::query_as::<_, Title>("SELECT * FROM titles WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| not_found("Title", id))
    }

    async fn active_reservations(&mut self, title_id: i32) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE title_id = $1 AND status = 'active'
            ORDER BY position, created_at, id
            FOR UPDATE
            "#,
        )
        .bind(title_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(reservations)
    }

    async fn get_borrower(&mut self, id: i32) -> AppResult<Borrower> {
        sqlx::query_as::<_, Borrower>("SELECT * FROM borrowers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| not_found("Borrower", id))
    }

    async fn get_branch(&mut self, id: i32) -> AppResult<Branch> {
        sqlx::query_as::<_, Branch>("SELECT * FROM branches WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| not_found("Branch", id))
    }

    async fn get_title(&mut self, id: i32) -> AppResult<Title> {
        sqlx::query_as::<_, Title>("SELECT * FROM titles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| not_found("Title", id))
    }

    async fn get_reservation(&mut self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| not_found("Reservation", id))
    }

    async fn count_active_loans(&mut self, borrower_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE borrower_id = $1 AND status = 'active'",
        )
        .bind(borrower_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn titles_with_expired_reservations(&mut self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let titles: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT title_id FROM reservations
            WHERE status = 'active' AND expires_at < $1
            ORDER BY title_id
            "#,
        )
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(titles)
    }

    async fn loans_for_borrower(&mut self, borrower_id: i32) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE borrower_id = $1 ORDER BY issued_at DESC, id DESC",
        )
        .bind(borrower_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(loans)
    }

    async fn reservations_for_borrower(&mut self, borrower_id: i32) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            "SELECT * FROM reservations WHERE borrower_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(borrower_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(reservations)
    }

    async fn overdue_loans(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE status = 'active' AND due_at < $1 ORDER BY due_at, id",
        )
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(loans)
    }

    async fn availability(&mut self, title_id: i32) -> AppResult<Vec<BranchAvailability>> {
        let rows = sqlx::query_as::<_, BranchAvailability>(
            r#"
            SELECT b.id AS branch_id, b.name AS branch_name, COUNT(*) AS available
            FROM copies c
            JOIN branches b ON c.branch_id = b.id
            WHERE c.title_id = $1 AND c.status = 'available' AND b.active
            GROUP BY b.id, b.name
            ORDER BY b.name
            "#,
        )
        .bind(title_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn circulation_stats(
        &mut self,
        now: DateTime<Utc>,
        due_soon_before: DateTime<Utc>,
    ) -> AppResult<CirculationStats> {
        let stats = sqlx::query_as::<_, CirculationStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM loans WHERE status = 'active') AS active_loans,
                (SELECT COUNT(*) FROM loans WHERE status = 'active' AND due_at < $1) AS overdue_loans,
                (SELECT COUNT(*) FROM loans WHERE status = 'active' AND due_at <= $2) AS due_soon_loans,
                (SELECT COUNT(*) FROM reservations WHERE status = 'active') AS active_reservations,
                (SELECT COUNT(*) FROM copies WHERE status = 'available') AS available_copies,
                (SELECT COUNT(*) FROM borrowers WHERE outstanding_fines > 0) AS borrowers_with_fines
            "#,
        )
        .bind(now)
        .bind(due_soon_before)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(stats)
    }

    async fn popular_titles(&mut self, limit: i64) -> AppResult<Vec<PopularTitle>> {
        let titles = sqlx::query_as::<_, PopularTitle>(
            r#"
            SELECT t.id AS title_id, t.title, t.author, COUNT(l.id) AS total_loans
            FROM titles t
            LEFT JOIN copies c ON c.title_id = t.id
            LEFT JOIN loans l ON l.copy_id = c.id
            GROUP BY t.id, t.title, t.author
            ORDER BY total_loans DESC, t.id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(titles)
    }

    async fn borrowers_with_fines(&mut self) -> AppResult<Vec<BorrowerFine>> {
        let owing = sqlx::query_as::<_, BorrowerFine>(
            r#"
            SELECT id AS borrower_id, username, outstanding_fines
            FROM borrowers
            WHERE outstanding_fines > 0
            ORDER BY outstanding_fines DESC, id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(owing)
    }

    async fn branch_inventory(&mut self, branch_id: i32) -> AppResult<Vec<TitleInventory>> {
        let rows = sqlx::query_as::<_, TitleInventory>(
            r#"
            SELECT
                t.id AS title_id, t.title, t.author, t.isbn,
                COUNT(*) FILTER (WHERE c.status = 'available') AS available,
                COUNT(*) FILTER (WHERE c.status = 'loaned') AS loaned,
                COUNT(*) FILTER (WHERE c.status = 'maintenance') AS maintenance,
                COUNT(*) FILTER (WHERE c.status = 'lost') AS lost,
                COUNT(*) AS total
            FROM copies c
            JOIN titles t ON c.title_id = t.id
            WHERE c.branch_id = $1
            GROUP BY t.id, t.title, t.author, t.isbn
            ORDER BY t.title, t.id
            "#,
        )
        .bind(branch_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (borrower_id, copy_id, issued_at, due_at, status, fine)
            VALUES ($1, $2, $3, $4, 'active', 0)
            RETURNING *
            "#,
        )
        .bind(loan.borrower_id)
        .bind(loan.copy_id)
        .bind(loan.issued_at)
        .bind(loan.due_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        sqlx::query("UPDATE loans SET returned_at = $1, status = $2, fine = $3 WHERE id = $4")
            .bind(loan.returned_at)
            .bind(loan.status)
            .bind(loan.fine)
            .bind(loan.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_copy(&mut self, copy: &BookCopy) -> AppResult<()> {
        sqlx::query("UPDATE copies SET branch_id = $1, status = $2 WHERE id = $3")
            .bind(copy.branch_id)
            .bind(copy.status)
            .bind(copy.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_borrower(&mut self, borrower: &Borrower) -> AppResult<()> {
        sqlx::query("UPDATE borrowers SET outstanding_fines = $1, suspended = $2 WHERE id = $3")
            .bind(borrower.outstanding_fines)
            .bind(borrower.suspended)
            .bind(borrower.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (borrower_id, title_id, created_at, expires_at, status, position)
            VALUES ($1, $2, $3, $4, 'active', $5)
            RETURNING *
            "#,
        )
        .bind(reservation.borrower_id)
        .bind(reservation.title_id)
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .bind(reservation.position)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(reservation)
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()> {
        sqlx::query("UPDATE reservations SET status = $1, position = $2 WHERE id = $3")
            .bind(reservation.status)
            .bind(reservation.position)
            .bind(reservation.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}

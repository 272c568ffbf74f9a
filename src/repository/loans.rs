//! Loans repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres, QueryBuilder};

use super::LoanStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookShort},
        loan::{ensure_no_open_loan, Loan, LoanFilter, LoanRecord, LoanStatus, NewLoan},
        user::{Role, UserShort},
        PageRequest,
    },
};

const RECORD_SELECT: &str = r#"
    SELECT l.id, l.user_id, l.book_id, l.borrowed_date, l.due_date, l.return_date,
           l.status, l.notes,
           u.username, u.email, u.role,
           b.title, b.author, b.isbn, b.category, b.available_copies, b.total_copies
    FROM loans l
    JOIN users u ON u.id = l.user_id
    JOIN books b ON b.id = l.book_id
"#;

/// Internal row structure for loan queries joined with user and book
#[derive(Debug, Clone, FromRow)]
struct LoanRecordRow {
    id: i32,
    user_id: i32,
    book_id: i32,
    borrowed_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: LoanStatus,
    notes: Option<String>,
    username: String,
    email: String,
    role: Role,
    title: String,
    author: String,
    isbn: String,
    category: String,
    available_copies: i32,
    total_copies: i32,
}

impl From<LoanRecordRow> for LoanRecord {
    fn from(row: LoanRecordRow) -> Self {
        LoanRecord {
            user: UserShort {
                id: row.user_id,
                username: row.username,
                email: row.email,
                role: row.role,
            },
            book: BookShort {
                id: row.book_id,
                title: row.title,
                author: row.author,
                isbn: row.isbn,
                category: row.category,
                available_copies: row.available_copies,
                total_copies: row.total_copies,
                is_available: row.available_copies > 0,
            },
            loan: Loan {
                id: row.id,
                user_id: row.user_id,
                book_id: row.book_id,
                borrowed_date: row.borrowed_date,
                due_date: row.due_date,
                return_date: row.return_date,
                status: row.status,
                notes: row.notes,
            },
        }
    }
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &LoanFilter) {
    builder.push(" WHERE 1=1");

    if let Some(owner) = filter.owner {
        builder.push(" AND l.user_id = ").push_bind(owner);
    }
    if let Some(status) = filter.status {
        builder.push(" AND l.status = ").push_bind(status);
    }
    if let Some(book_id) = filter.book_id {
        builder.push(" AND l.book_id = ").push_bind(book_id);
    }
    if let Some(date) = filter.borrowed_after {
        builder.push(" AND l.borrowed_date >= ").push_bind(date);
    }
    if let Some(date) = filter.borrowed_before {
        builder.push(" AND l.borrowed_date <= ").push_bind(date);
    }
    if let Some(date) = filter.due_after {
        builder.push(" AND l.due_date >= ").push_bind(date);
    }
    if let Some(date) = filter.due_before {
        builder.push(" AND l.due_date <= ").push_bind(date);
    }
}

#[async_trait]
impl LoanStore for LoansRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Loan not found.".to_string()))
    }

    async fn get_record(&self, id: i32) -> AppResult<LoanRecord> {
        let row = sqlx::query_as::<_, LoanRecordRow>(&format!("{} WHERE l.id = $1", RECORD_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Loan not found.".to_string()))?;

        Ok(row.into())
    }

    async fn search(&self, filter: &LoanFilter, page: Option<PageRequest>) -> AppResult<(Vec<LoanRecord>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM loans l");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(RECORD_SELECT);
        push_filters(&mut select, filter);
        select.push(" ORDER BY l.borrowed_date DESC, l.id DESC");
        if let Some(page) = page {
            select
                .push(" LIMIT ")
                .push_bind(page.limit())
                .push(" OFFSET ")
                .push_bind(page.offset());
        }

        let rows = select
            .build_query_as::<LoanRecordRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(LoanRecord::from).collect(), total))
    }

    async fn borrow(&self, loan: NewLoan) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        // The book row lock serializes every borrow and return of this book
        let mut book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(loan.book_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))?;

        book.ensure_available()?;

        let has_open_loan: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND book_id = $2 AND status <> 'returned')",
        )
        .bind(loan.user_id)
        .bind(loan.book_id)
        .fetch_one(&mut *tx)
        .await?;

        ensure_no_open_loan(has_open_loan)?;
        book.checkout_copy()?;

        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, book_id, borrowed_date, due_date, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(loan.borrowed_date)
        .bind(loan.due_date)
        .bind(LoanStatus::Active)
        .bind(&loan.notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE books SET available_copies = $2, updated_at = $3 WHERE id = $1")
            .bind(book.id)
            .bind(book.available_copies)
            .bind(loan.borrowed_date)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(created)
    }

    async fn return_loan(&self, id: i32, now: DateTime<Utc>) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        // Same lock order as borrow: book first, then loan
        let book_id: i32 = sqlx::query_scalar("SELECT book_id FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Loan not found.".to_string()))?;

        let mut book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_one(&mut *tx)
            .await?;

        let mut loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Loan not found.".to_string()))?;

        loan.mark_returned(now)?;
        book.checkin_copy();

        let loan = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET status = $2, return_date = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(loan.status)
        .bind(loan.return_date)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE books SET available_copies = $2, updated_at = $3 WHERE id = $1")
            .bind(book.id)
            .bind(book.available_copies)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(loan)
    }

    async fn overdue_candidates(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE status = 'active' AND due_date < $1 ORDER BY due_date",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    async fn mark_overdue(&self, ids: &[i32]) -> AppResult<Vec<i32>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Loans returned since they were read no longer match and are skipped
        let changed = sqlx::query_scalar::<_, i32>(
            "UPDATE loans SET status = 'overdue' WHERE id = ANY($1) AND status = 'active' RETURNING id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(changed)
    }
}

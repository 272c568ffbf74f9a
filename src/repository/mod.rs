//! Repository layer for database operations
//!
//! Each storage concern is an async trait so services can run against
//! Postgres in production and against the in-process store in tests and
//! demo mode. Borrow and return are single store calls: every
//! implementation performs their read-validate-write as one serialized unit.

pub mod books;
pub mod loans;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        loan::{Loan, LoanFilter, LoanRecord, NewLoan},
        user::{NewUser, UpdateProfile, UpdateUserAdmin, User},
        PageRequest,
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn get_by_id(&self, id: i32) -> AppResult<Book>;
    async fn search(&self, query: &BookQuery, page: PageRequest) -> AppResult<(Vec<Book>, i64)>;
    /// Case-insensitive match on title, author, isbn, category or description
    async fn full_text(&self, term: &str) -> AppResult<Vec<Book>>;
    async fn categories(&self) -> AppResult<Vec<String>>;
    async fn create(&self, book: &CreateBook) -> AppResult<Book>;
    async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Book>;
    /// Deletes the book and, by cascade, its loans
    async fn delete(&self, id: i32) -> AppResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn get_by_id(&self, id: i32) -> AppResult<Loan>;
    async fn get_record(&self, id: i32) -> AppResult<LoanRecord>;
    /// Newest borrow first; `None` returns every match
    async fn search(&self, filter: &LoanFilter, page: Option<PageRequest>) -> AppResult<(Vec<LoanRecord>, i64)>;
    /// Check availability and duplicates, insert the loan and take one copy,
    /// all-or-nothing
    async fn borrow(&self, loan: NewLoan) -> AppResult<Loan>;
    /// Re-check the loan is open, mark it returned and put one copy back,
    /// all-or-nothing
    async fn return_loan(&self, id: i32, now: DateTime<Utc>) -> AppResult<Loan>;
    /// Active loans whose due date is before `now`
    async fn overdue_candidates(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>>;
    /// Set `overdue` on those of `ids` still active; returns the ids changed
    async fn mark_overdue(&self, ids: &[i32]) -> AppResult<Vec<i32>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: i32) -> AppResult<User>;
    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn username_exists(&self, username: &str) -> AppResult<bool>;
    async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool>;
    async fn create(&self, user: &NewUser) -> AppResult<User>;
    async fn update_profile(&self, id: i32, profile: &UpdateProfile) -> AppResult<User>;
    async fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()>;
    async fn update_admin(&self, id: i32, update: &UpdateUserAdmin) -> AppResult<User>;
    async fn list(&self, page: PageRequest) -> AppResult<(Vec<User>, i64)>;
}

/// Main repository struct holding one store per concern
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub loans: Arc<dyn LoanStore>,
    pub users: Arc<dyn UserStore>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            loans: Arc::new(loans::LoansRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool)),
        }
    }

    /// Repository backed by a fresh in-process store
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::default();
        Self {
            books: Arc::new(store.clone()),
            loans: Arc::new(store.clone()),
            users: Arc::new(store),
        }
    }
}

/// Translate a unique-constraint violation into a conflict error
pub(crate) fn map_unique_violation(err: sqlx::Error, what: &str) -> crate::error::AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            crate::error::AppError::Conflict(format!("{} already exists", what))
        }
        _ => crate::error::AppError::Database(err),
    }
}

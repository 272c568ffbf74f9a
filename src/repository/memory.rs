//! In-process store
//!
//! All tables sit behind one async mutex, so every call is serialized and
//! borrow/return are trivially atomic. Selected with `database.url = "memory://"`
//! and used by the test suites.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{BookStore, LoanStore, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{matches_search, Book, BookQuery, CreateBook, UpdateBook},
        loan::{ensure_no_open_loan, Loan, LoanFilter, LoanRecord, LoanStatus, NewLoan},
        user::{NewUser, UpdateProfile, UpdateUserAdmin, User, UserShort},
        PageRequest,
    },
};

#[derive(Debug, Default)]
struct Tables {
    next_id: i32,
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    loans: BTreeMap<i32, Loan>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn book(&self, id: i32) -> AppResult<&Book> {
        self.books
            .get(&id)
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))
    }

    fn user(&self, id: i32) -> AppResult<&User> {
        self.users
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    fn record(&self, loan: &Loan) -> AppResult<LoanRecord> {
        Ok(LoanRecord {
            loan: loan.clone(),
            user: UserShort::from(self.user(loan.user_id)?),
            book: self.book(loan.book_id)?.short(),
        })
    }

    fn isbn_taken(&self, isbn: &str, exclude_id: Option<i32>) -> bool {
        self.books
            .values()
            .any(|b| b.isbn == isbn && Some(b.id) != exclude_id)
    }

    fn email_taken(&self, email: &str, exclude_id: Option<i32>) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id) != exclude_id)
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
        .collect();
    (items, total)
}

fn newest_first(books: &mut [Book]) {
    books.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        let tables = self.tables.lock().await;
        tables.book(id).cloned()
    }

    async fn search(&self, query: &BookQuery, page: PageRequest) -> AppResult<(Vec<Book>, i64)> {
        let tables = self.tables.lock().await;
        let mut books: Vec<Book> = tables
            .books
            .values()
            .filter(|b| query.matches(b))
            .cloned()
            .collect();
        newest_first(&mut books);
        Ok(paginate(books, page))
    }

    async fn full_text(&self, term: &str) -> AppResult<Vec<Book>> {
        let tables = self.tables.lock().await;
        let mut books: Vec<Book> = tables
            .books
            .values()
            .filter(|b| matches_search(b, term))
            .cloned()
            .collect();
        newest_first(&mut books);
        Ok(books)
    }

    async fn categories(&self) -> AppResult<Vec<String>> {
        let tables = self.tables.lock().await;
        let mut categories: Vec<String> = tables.books.values().map(|b| b.category.clone()).collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let mut tables = self.tables.lock().await;
        if tables.isbn_taken(&book.isbn, None) {
            return Err(AppError::Conflict("Book with this ISBN already exists".to_string()));
        }

        let now = Utc::now();
        let created = Book {
            id: tables.next_id(),
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            publisher: book.publisher.clone(),
            publication_date: book.publication_date,
            page_count: book.page_count,
            language: book.language.clone(),
            description: book.description.clone(),
            category: book.category.clone(),
            total_copies: book.total_copies,
            available_copies: book.stored_available(),
            cover_image: book.cover_image.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Book> {
        let mut tables = self.tables.lock().await;
        if let Some(ref isbn) = update.isbn {
            if tables.isbn_taken(isbn, Some(id)) {
                return Err(AppError::Conflict("Book with this ISBN already exists".to_string()));
            }
        }

        let book = tables
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))?;
        book.apply_update(update);
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.books.remove(&id).is_none() {
            return Err(AppError::NotFound("Book not found.".to_string()));
        }
        tables.loans.retain(|_, loan| loan.book_id != id);
        Ok(())
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<Loan> {
        let tables = self.tables.lock().await;
        tables
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Loan not found.".to_string()))
    }

    async fn get_record(&self, id: i32) -> AppResult<LoanRecord> {
        let tables = self.tables.lock().await;
        let loan = tables
            .loans
            .get(&id)
            .ok_or_else(|| AppError::NotFound("Loan not found.".to_string()))?;
        tables.record(loan)
    }

    async fn search(&self, filter: &LoanFilter, page: Option<PageRequest>) -> AppResult<(Vec<LoanRecord>, i64)> {
        let tables = self.tables.lock().await;
        let mut loans: Vec<&Loan> = tables.loans.values().filter(|l| filter.matches(l)).collect();
        loans.sort_by(|a, b| b.borrowed_date.cmp(&a.borrowed_date).then(b.id.cmp(&a.id)));

        let (loans, total) = match page {
            Some(page) => paginate(loans, page),
            None => {
                let total = loans.len() as i64;
                (loans, total)
            }
        };
        let records = loans
            .into_iter()
            .map(|loan| tables.record(loan))
            .collect::<AppResult<Vec<_>>>()?;
        Ok((records, total))
    }

    async fn borrow(&self, loan: NewLoan) -> AppResult<Loan> {
        let mut tables = self.tables.lock().await;
        tables.user(loan.user_id)?;

        let mut book = tables.book(loan.book_id)?.clone();
        book.ensure_available()?;

        let has_open_loan = tables
            .loans
            .values()
            .any(|l| l.user_id == loan.user_id && l.book_id == loan.book_id && l.is_open());
        ensure_no_open_loan(has_open_loan)?;
        book.checkout_copy()?;
        book.updated_at = loan.borrowed_date;

        let created = Loan {
            id: tables.next_id(),
            user_id: loan.user_id,
            book_id: loan.book_id,
            borrowed_date: loan.borrowed_date,
            due_date: loan.due_date,
            return_date: None,
            status: LoanStatus::Active,
            notes: loan.notes,
        };
        tables.loans.insert(created.id, created.clone());
        tables.books.insert(book.id, book);
        Ok(created)
    }

    async fn return_loan(&self, id: i32, now: DateTime<Utc>) -> AppResult<Loan> {
        let mut tables = self.tables.lock().await;
        let mut loan = tables
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Loan not found.".to_string()))?;
        let mut book = tables.book(loan.book_id)?.clone();

        loan.mark_returned(now)?;
        book.checkin_copy();
        book.updated_at = now;

        tables.loans.insert(loan.id, loan.clone());
        tables.books.insert(book.id, book);
        Ok(loan)
    }

    async fn overdue_candidates(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let tables = self.tables.lock().await;
        let mut loans: Vec<Loan> = tables
            .loans
            .values()
            .filter(|l| l.status == LoanStatus::Active && l.due_date < now)
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.due_date);
        Ok(loans)
    }

    async fn mark_overdue(&self, ids: &[i32]) -> AppResult<Vec<i32>> {
        let mut tables = self.tables.lock().await;
        let mut changed = Vec::new();
        for id in ids {
            if let Some(loan) = tables.loans.get_mut(id) {
                if loan.status == LoanStatus::Active {
                    loan.status = LoanStatus::Overdue;
                    changed.push(*id);
                }
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_id(&self, id: i32) -> AppResult<User> {
        let tables = self.tables.lock().await;
        tables.user(id).cloned()
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().any(|u| u.username == username))
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.email_taken(email, exclude_id))
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.username == user.username) || tables.email_taken(&user.email, None) {
            return Err(AppError::Conflict(
                "User with this username or email already exists".to_string(),
            ));
        }

        let created = User {
            id: tables.next_id(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone_number: user.phone_number.clone(),
            address: user.address.clone(),
            role: user.role,
            is_active: true,
            date_joined: Utc::now(),
        };
        tables.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_profile(&self, id: i32, profile: &UpdateProfile) -> AppResult<User> {
        let mut tables = self.tables.lock().await;
        if let Some(ref email) = profile.email {
            if tables.email_taken(email, Some(id)) {
                return Err(AppError::Conflict("User with this email already exists".to_string()));
            }
        }

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        if let Some(ref v) = profile.first_name {
            user.first_name = Some(v.clone());
        }
        if let Some(ref v) = profile.last_name {
            user.last_name = Some(v.clone());
        }
        if let Some(ref v) = profile.email {
            user.email = v.clone();
        }
        if let Some(ref v) = profile.phone_number {
            user.phone_number = Some(v.clone());
        }
        if let Some(ref v) = profile.address {
            user.address = Some(v.clone());
        }
        Ok(user.clone())
    }

    async fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn update_admin(&self, id: i32, update: &UpdateUserAdmin) -> AppResult<User> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }
        Ok(user.clone())
    }

    async fn list(&self, page: PageRequest) -> AppResult<(Vec<User>, i64)> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| b.date_joined.cmp(&a.date_joined).then(b.id.cmp(&a.id)));
        Ok(paginate(users, page))
    }
}

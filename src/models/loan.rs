//! Loan (borrow) model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};

use super::book::BookShort;
use super::user::UserShort;
use crate::error::{AppError, AppResult, LoanRule};

/// Loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }

    /// Active and overdue loans both hold a copy
    pub fn is_open(&self) -> bool {
        *self != LoanStatus::Returned
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

// SQLx conversion for LoanStatus (stored as text)
impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub notes: Option<String>,
}

impl Loan {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now > self.due_date
    }

    /// Whole days past due, 0 when not overdue
    pub fn days_overdue_at(&self, now: DateTime<Utc>) -> i64 {
        if self.is_overdue_at(now) {
            (now - self.due_date).num_days()
        } else {
            0
        }
    }

    /// Return precondition on the loan side
    pub fn ensure_returnable(&self) -> AppResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AppError::BusinessRule(LoanRule::AlreadyReturned))
        }
    }

    /// `active|overdue -> returned`; the return date and status change together
    pub fn mark_returned(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_returnable()?;
        self.return_date = Some(now);
        self.status = LoanStatus::Returned;
        Ok(())
    }
}

/// Due date applied when the borrower does not supply one
pub fn default_due_date(borrowed: DateTime<Utc>, loan_days: i64) -> DateTime<Utc> {
    borrowed + Duration::days(loan_days)
}

/// Borrow precondition on the borrower side
pub fn ensure_no_open_loan(has_open_loan: bool) -> AppResult<()> {
    if has_open_loan {
        Err(AppError::BusinessRule(LoanRule::DuplicateActiveLoan))
    } else {
        Ok(())
    }
}

/// Values for a loan about to be created, fully resolved by the service
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Loan joined with its book and borrower, as read from the store
#[derive(Debug, Clone)]
pub struct LoanRecord {
    pub loan: Loan,
    pub user: UserShort,
    pub book: BookShort,
}

/// Loan with nested book and borrower, as returned by the loan endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub user: UserShort,
    pub book: BookShort,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub notes: Option<String>,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

impl LoanDetails {
    /// Overdue fields are computed against `now`, not read from storage
    pub fn from_record(record: LoanRecord, now: DateTime<Utc>) -> Self {
        let LoanRecord { loan, user, book } = record;
        Self {
            is_overdue: loan.is_overdue_at(now),
            days_overdue: loan.days_overdue_at(now),
            id: loan.id,
            user,
            book,
            borrowed_date: loan.borrowed_date,
            due_date: loan.due_date,
            return_date: loan.return_date,
            status: loan.status,
            notes: loan.notes,
        }
    }
}

/// Listing-shaped loan without nested records
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanListEntry {
    pub id: i32,
    pub user_username: String,
    pub book_title: String,
    pub borrowed_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub is_overdue: bool,
}

impl From<&LoanDetails> for LoanListEntry {
    fn from(details: &LoanDetails) -> Self {
        Self {
            id: details.id,
            user_username: details.user.username.clone(),
            book_title: details.book.title.clone(),
            borrowed_date: details.borrowed_date,
            due_date: details.due_date,
            return_date: details.return_date,
            status: details.status,
            is_overdue: details.is_overdue,
        }
    }
}

/// Loan list query parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub status: Option<LoanStatus>,
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    pub borrowed_after: Option<DateTime<Utc>>,
    pub borrowed_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Resolved loan listing filter handed to the store.
///
/// `owner` is the data scope: `Some` restricts to one borrower and is always
/// set for regular users.
#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    pub owner: Option<i32>,
    pub status: Option<LoanStatus>,
    pub book_id: Option<i32>,
    pub borrowed_after: Option<DateTime<Utc>>,
    pub borrowed_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    pub due_before: Option<DateTime<Utc>>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.owner.map(|o| loan.user_id == o).unwrap_or(true)
            && self.status.map(|s| loan.status == s).unwrap_or(true)
            && self.book_id.map(|b| loan.book_id == b).unwrap_or(true)
            && self.borrowed_after.map(|d| loan.borrowed_date >= d).unwrap_or(true)
            && self.borrowed_before.map(|d| loan.borrowed_date <= d).unwrap_or(true)
            && self.due_after.map(|d| loan.due_date >= d).unwrap_or(true)
            && self.due_before.map(|d| loan.due_date <= d).unwrap_or(true)
    }
}

/// Borrow request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLoan {
    /// Book to borrow (required)
    pub book_id: Option<i32>,
    /// Defaults to 14 days after borrowing
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

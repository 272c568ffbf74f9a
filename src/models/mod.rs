//! Data models for Libris

pub mod book;
pub mod loan;
pub mod user;

use serde::Serialize;
use utoipa::ToSchema;

// Re-export commonly used types
pub use book::{Book, BookShort};
pub use loan::{Loan, LoanDetails, LoanListEntry, LoanStatus};
pub use user::{Role, User, UserShort};

/// 1-based page window resolved against the configured limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>, default_size: i64, max_size: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(default_size).clamp(1, max_size),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    /// Rows to skip; saturates so an absurd page number reads an empty page
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// Items on this page
    pub items: Vec<T>,
    /// Total number of matches
    pub total: i64,
    /// Current page number
    pub page: i64,
    /// Items per page
    pub per_page: i64,
}

impl<T> PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    pub fn new(items: Vec<T>, total: i64, page: PageRequest) -> Self {
        Self {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

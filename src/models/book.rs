//! Book model and catalog request types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{AppError, AppResult, LoanRule};

/// Availability clamp: stored available copies never exceed total copies.
///
/// This repairs the value rather than rejecting it; every write path of
/// every store passes through here.
pub fn clamp_available(available: i32, total: i32) -> i32 {
    available.min(total)
}

/// Book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publisher: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub page_count: i32,
    pub language: String,
    pub description: Option<String>,
    pub category: String,
    pub total_copies: i32,
    pub available_copies: i32,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Borrow precondition on the book side
    pub fn ensure_available(&self) -> AppResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(AppError::BusinessRule(LoanRule::BookUnavailable))
        }
    }

    pub fn clamp_availability(&mut self) {
        self.available_copies = clamp_available(self.available_copies, self.total_copies);
    }

    /// Take one copy out for a new loan
    pub fn checkout_copy(&mut self) -> AppResult<()> {
        self.ensure_available()?;
        self.available_copies -= 1;
        Ok(())
    }

    /// Put one copy back after a return, clamped to the total
    pub fn checkin_copy(&mut self) {
        self.available_copies = clamp_available(self.available_copies + 1, self.total_copies);
    }

    /// Apply a partial update, then the availability clamp
    pub fn apply_update(&mut self, update: &UpdateBook) {
        if let Some(ref v) = update.title {
            self.title = v.clone();
        }
        if let Some(ref v) = update.author {
            self.author = v.clone();
        }
        if let Some(ref v) = update.isbn {
            self.isbn = v.clone();
        }
        if let Some(ref v) = update.publisher {
            self.publisher = Some(v.clone());
        }
        if let Some(v) = update.publication_date {
            self.publication_date = Some(v);
        }
        if let Some(v) = update.page_count {
            self.page_count = v;
        }
        if let Some(ref v) = update.language {
            self.language = v.clone();
        }
        if let Some(ref v) = update.description {
            self.description = Some(v.clone());
        }
        if let Some(ref v) = update.category {
            self.category = v.clone();
        }
        if let Some(v) = update.total_copies {
            self.total_copies = v;
        }
        if let Some(v) = update.available_copies {
            self.available_copies = v;
        }
        if let Some(ref v) = update.cover_image {
            self.cover_image = Some(v.clone());
        }
        self.clamp_availability();
    }

    pub fn short(&self) -> BookShort {
        BookShort {
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
            category: self.category.clone(),
            available_copies: self.available_copies,
            total_copies: self.total_copies,
            is_available: self.is_available(),
        }
    }
}

/// Short book representation for lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub available_copies: i32,
    pub total_copies: i32,
    pub is_available: bool,
}

fn default_language() -> String {
    "English".to_string()
}

fn default_copies() -> i32 {
    1
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author is required"))]
    pub author: String,
    #[validate(length(equal = 13, message = "ISBN must be 13 characters"))]
    pub isbn: String,
    pub publisher: Option<String>,
    pub publication_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Page count must be at least 1"))]
    pub page_count: i32,
    #[serde(default = "default_language")]
    pub language: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,
    #[serde(default = "default_copies")]
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: i32,
    /// Defaults to `total_copies`; values above it are clamped on save
    #[validate(range(min = 0, message = "Available copies cannot be negative"))]
    pub available_copies: Option<i32>,
    pub cover_image: Option<String>,
}

impl CreateBook {
    /// Available copies as they will be stored
    pub fn stored_available(&self) -> i32 {
        clamp_available(
            self.available_copies.unwrap_or(self.total_copies),
            self.total_copies,
        )
    }
}

/// Update book request (all fields optional)
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub author: Option<String>,
    #[validate(length(equal = 13, message = "ISBN must be 13 characters"))]
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub publication_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Page count must be at least 1"))]
    pub page_count: Option<i32>,
    pub language: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: Option<i32>,
    #[validate(range(min = 0, message = "Available copies cannot be negative"))]
    pub available_copies: Option<i32>,
    pub cover_image: Option<String>,
}

/// Book list filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub isbn: Option<String>,
    /// `true`: at least one copy on the shelf, `false`: none
    pub available: Option<bool>,
    pub min_pages: Option<i32>,
    pub max_pages: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    /// In-process evaluation of the filters, mirrored by the SQL in the Postgres store
    pub fn matches(&self, book: &Book) -> bool {
        fn contains(haystack: &str, needle: &Option<String>) -> bool {
            needle
                .as_ref()
                .map(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
                .unwrap_or(true)
        }

        contains(&book.title, &self.title)
            && contains(&book.author, &self.author)
            && contains(&book.category, &self.category)
            && contains(&book.language, &self.language)
            && self.isbn.as_ref().map(|i| &book.isbn == i).unwrap_or(true)
            && self.available.map(|a| book.is_available() == a).unwrap_or(true)
            && self.min_pages.map(|m| book.page_count >= m).unwrap_or(true)
            && self.max_pages.map(|m| book.page_count <= m).unwrap_or(true)
    }
}

/// Free-text search parameters
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct BookSearchQuery {
    pub q: Option<String>,
}

/// Whether a book matches a free-text search term
pub fn matches_search(book: &Book, term: &str) -> bool {
    let term = term.to_lowercase();
    [
        Some(&book.title),
        Some(&book.author),
        Some(&book.isbn),
        Some(&book.category),
        book.description.as_ref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&term))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn sample_book(total: i32, available: i32) -> Book {
        let now = Utc::now();
        Book {
            id: 1,
            title: "The Rust Programming Language".to_string(),
            author: "Steve Klabnik".to_string(),
            isbn: "9781718503106".to_string(),
            publisher: None,
            publication_date: None,
            page_count: 560,
            language: "English".to_string(),
            description: Some("Systems programming".to_string()),
            category: "Programming".to_string(),
            total_copies: total,
            available_copies: available,
            cover_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_clamp_available() {
        assert_eq!(clamp_available(10, 5), 5);
        assert_eq!(clamp_available(3, 5), 3);
        assert_eq!(clamp_available(0, 1), 0);
    }

    #[test]
    fn test_checkout_and_checkin() {
        let mut book = sample_book(2, 1);
        book.checkout_copy().unwrap();
        assert_eq!(book.available_copies, 0);
        assert!(matches!(
            book.checkout_copy(),
            Err(AppError::BusinessRule(LoanRule::BookUnavailable))
        ));
        book.checkin_copy();
        book.checkin_copy();
        book.checkin_copy();
        assert_eq!(book.available_copies, 2);
    }

    #[test]
    fn test_update_clamps_instead_of_rejecting() {
        let mut book = sample_book(5, 5);
        book.apply_update(&UpdateBook {
            available_copies: Some(10),
            ..Default::default()
        });
        assert_eq!(book.available_copies, 5);

        book.apply_update(&UpdateBook {
            total_copies: Some(3),
            ..Default::default()
        });
        assert_eq!(book.available_copies, 3);
    }

    #[test]
    fn test_create_defaults_available_to_total() {
        let request: CreateBook = serde_json::from_value(serde_json::json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "isbn": "9780441172719",
            "page_count": 412,
            "category": "Fiction",
            "total_copies": 3
        }))
        .unwrap();
        assert_eq!(request.language, "English");
        assert_eq!(request.stored_available(), 3);
    }

    #[test]
    fn test_isbn_length_validated() {
        let request: CreateBook = serde_json::from_value(serde_json::json!({
            "title": "Dune",
            "author": "Frank Herbert",
            "isbn": "12345",
            "page_count": 412,
            "category": "Fiction"
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_query_matches() {
        let book = sample_book(2, 0);
        let query = BookQuery {
            author: Some("klabnik".to_string()),
            available: Some(false),
            min_pages: Some(500),
            ..Default::default()
        };
        assert!(query.matches(&book));
        let query = BookQuery {
            available: Some(true),
            ..Default::default()
        };
        assert!(!query.matches(&book));
        assert!(matches_search(&book, "SYSTEMS"));
        assert!(!matches_search(&book, "cooking"));
    }
}

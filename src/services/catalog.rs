//! Catalog management service

use validator::Validate;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, BookSearchQuery, BookShort, CreateBook, UpdateBook},
        PaginatedResponse,
    },
    policy::{Action, Actor},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    config: LoansConfig,
}

impl CatalogService {
    pub fn new(repository: Repository, config: LoansConfig) -> Self {
        Self { repository, config }
    }

    /// List books with filters, newest first
    pub async fn list_books(&self, actor: &Actor, query: &BookQuery) -> AppResult<PaginatedResponse<BookShort>> {
        actor.require(Action::ReadCatalog)?;

        let page = self.config.page_request(query.page, query.per_page);
        let (books, total) = self.repository.books.search(query, page).await?;

        Ok(PaginatedResponse::new(
            books.iter().map(Book::short).collect(),
            total,
            page,
        ))
    }

    /// Free-text search over title, author, isbn, category and description
    pub async fn search_books(&self, actor: &Actor, query: &BookSearchQuery) -> AppResult<Vec<BookShort>> {
        actor.require(Action::ReadCatalog)?;

        let term = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::BadRequest("Search query parameter \"q\" is required.".to_string()))?;

        let books = self.repository.books.full_text(term).await?;
        Ok(books.iter().map(Book::short).collect())
    }

    pub async fn categories(&self, actor: &Actor) -> AppResult<Vec<String>> {
        actor.require(Action::ReadCatalog)?;
        self.repository.books.categories().await
    }

    pub async fn get_book(&self, actor: &Actor, id: i32) -> AppResult<Book> {
        actor.require(Action::ReadCatalog)?;
        self.repository.books.get_by_id(id).await
    }

    /// Create a book; available copies above the total are clamped
    pub async fn create_book(&self, actor: &Actor, book: CreateBook) -> AppResult<Book> {
        actor.require(Action::MutateCatalog)?;
        book.validate()?;

        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, isbn = %created.isbn, "Book created");
        Ok(created)
    }

    pub async fn update_book(&self, actor: &Actor, id: i32, update: UpdateBook) -> AppResult<Book> {
        actor.require(Action::MutateCatalog)?;
        update.validate()?;

        let updated = self.repository.books.update(id, &update).await?;
        tracing::info!(
            book_id = id,
            available = updated.available_copies,
            total = updated.total_copies,
            "Book updated"
        );
        Ok(updated)
    }

    /// Delete a book together with its loans
    pub async fn delete_book(&self, actor: &Actor, id: i32) -> AppResult<()> {
        actor.require(Action::MutateCatalog)?;

        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        models::{loan::CreateLoan, user::Role},
        repository::{MockBookStore, MockLoanStore, MockUserStore},
        services::{
            fixtures::{create_book_request, seed_book, seed_user},
            loans::LoansService,
        },
    };

    fn service(repository: &Repository) -> CatalogService {
        CatalogService::new(repository.clone(), LoansConfig::default())
    }

    #[tokio::test]
    async fn test_create_clamps_available_copies() {
        let repository = Repository::in_memory();
        let admin = seed_user(&repository, "admin", Role::Admin).await;
        let catalog = service(&repository);

        let book = catalog
            .create_book(&admin, create_book_request("9780000000001", 5, Some(10)))
            .await
            .unwrap();
        assert_eq!(book.total_copies, 5);
        assert_eq!(book.available_copies, 5);

        let book = catalog
            .update_book(
                &admin,
                book.id,
                UpdateBook {
                    total_copies: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(book.available_copies, 2);
    }

    #[tokio::test]
    async fn test_validation_rejects_bad_isbn() {
        let repository = Repository::in_memory();
        let admin = seed_user(&repository, "admin", Role::Admin).await;

        let result = service(&repository)
            .create_book(&admin, create_book_request("123", 1, None))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_anonymous_reads_and_filters() {
        let repository = Repository::in_memory();
        seed_book(&repository, "9780000000001", 1, Some(0)).await;
        seed_book(&repository, "9780000000002", 3, None).await;
        let catalog = service(&repository);

        let all = catalog.list_books(&Actor::Anonymous, &BookQuery::default()).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].isbn, "9780000000002");

        let available = catalog
            .list_books(
                &Actor::Anonymous,
                &BookQuery {
                    available: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(available.total, 1);
        assert!(available.items[0].is_available);

        let categories = catalog.categories(&Actor::Anonymous).await.unwrap();
        assert_eq!(categories, vec!["Fiction".to_string()]);
    }

    #[tokio::test]
    async fn test_search_requires_term() {
        let repository = Repository::in_memory();
        seed_book(&repository, "9780000000001", 1, None).await;
        let catalog = service(&repository);

        let missing = catalog
            .search_books(&Actor::Anonymous, &BookSearchQuery { q: Some("  ".to_string()) })
            .await;
        assert!(matches!(missing, Err(AppError::BadRequest(_))));

        let found = catalog
            .search_books(&Actor::Anonymous, &BookSearchQuery { q: Some("0001".to_string()) })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_loans() {
        let repository = Repository::in_memory();
        let admin = seed_user(&repository, "admin", Role::Admin).await;
        let alice = seed_user(&repository, "alice", Role::User).await;
        let book = seed_book(&repository, "9780000000001", 1, None).await;

        let loans = LoansService::new(repository.clone(), LoansConfig::default());
        let loan = loans
            .borrow(
                &alice,
                CreateLoan {
                    book_id: Some(book),
                    due_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        service(&repository).delete_book(&admin, book).await.unwrap();

        assert!(matches!(
            repository.loans.get_by_id(loan.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service(&repository).get_book(&admin, book).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_regular_users_cannot_mutate() {
        let mut books = MockBookStore::new();
        books.expect_create().never();
        books.expect_update().never();
        books.expect_delete().never();
        let repository = Repository {
            books: Arc::new(books),
            loans: Arc::new(MockLoanStore::new()),
            users: Arc::new(MockUserStore::new()),
        };
        let catalog = service(&repository);
        let alice = Actor::member(1, Role::User);

        assert!(matches!(
            catalog
                .create_book(&alice, create_book_request("9780000000001", 1, None))
                .await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            catalog.update_book(&alice, 1, UpdateBook::default()).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            catalog.delete_book(&Actor::Anonymous, 1).await,
            Err(AppError::Authentication(_))
        ));
    }
}

//! Books repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, QueryBuilder};

use super::{map_unique_violation, BookStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        PageRequest,
    },
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Case-insensitive substring pattern with LIKE wildcards in `term` escaped
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Append the WHERE clause for a book query
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    builder.push(" WHERE 1=1");

    for (column, value) in [
        ("title", &query.title),
        ("author", &query.author),
        ("category", &query.category),
        ("language", &query.language),
    ] {
        if let Some(value) = value {
            builder
                .push(format!(" AND LOWER({}) LIKE ", column))
                .push_bind(like_pattern(value))
                .push(r" ESCAPE '\'");
        }
    }

    if let Some(ref isbn) = query.isbn {
        builder.push(" AND isbn = ").push_bind(isbn.clone());
    }

    match query.available {
        Some(true) => {
            builder.push(" AND available_copies > 0");
        }
        Some(false) => {
            builder.push(" AND available_copies = 0");
        }
        None => {}
    }

    if let Some(min) = query.min_pages {
        builder.push(" AND page_count >= ").push_bind(min);
    }
    if let Some(max) = query.max_pages {
        builder.push(" AND page_count <= ").push_bind(max);
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))
    }

    async fn search(&self, query: &BookQuery, page: PageRequest) -> AppResult<(Vec<Book>, i64)> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM books");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT * FROM books");
        push_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let books = select.build_query_as::<Book>().fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    async fn full_text(&self, term: &str) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE LOWER(title) LIKE $1 ESCAPE '\'
               OR LOWER(author) LIKE $1 ESCAPE '\'
               OR LOWER(isbn) LIKE $1 ESCAPE '\'
               OR LOWER(category) LIKE $1 ESCAPE '\'
               OR LOWER(COALESCE(description, '')) LIKE $1 ESCAPE '\'
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(like_pattern(term))
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn categories(&self) -> AppResult<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM books ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let now = Utc::now();

        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                title, author, isbn, publisher, publication_date, page_count,
                language, description, category, total_copies, available_copies,
                cover_image, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_date)
        .bind(book.page_count)
        .bind(&book.language)
        .bind(&book.description)
        .bind(&book.category)
        .bind(book.total_copies)
        .bind(book.stored_available())
        .bind(&book.cover_image)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Book with this ISBN"))
    }

    async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so a concurrent borrow or return cannot interleave
        let mut book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))?;

        book.apply_update(update);

        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = $2, author = $3, isbn = $4, publisher = $5,
                publication_date = $6, page_count = $7, language = $8,
                description = $9, category = $10, total_copies = $11,
                available_copies = $12, cover_image = $13, updated_at = $14
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.publication_date)
        .bind(book.page_count)
        .bind(&book.language)
        .bind(&book.description)
        .bind(&book.category)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(&book.cover_image)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, "Book with this ISBN"))?;

        tx.commit().await?;

        Ok(book)
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Book not found.".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Dune"), "%dune%");
        assert_eq!(like_pattern("100%"), r"%100\%%");
        assert_eq!(like_pattern("a_b"), r"%a\_b%");
        assert_eq!(like_pattern(r"c:\x"), r"%c:\\x%");
    }
}

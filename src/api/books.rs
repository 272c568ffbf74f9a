//! Book catalog endpoints

use axum::{extract::State, http::StatusCode};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery, BookSearchQuery, BookShort, CreateBook, UpdateBook},
        PaginatedResponse,
    },
    AppState,
};

use super::{
    extract::{Json, Path, Query},
    CurrentActor,
};

/// List books with filters and pagination
#[utoipa::path(
    get,
    path = "/api/books/",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Books, newest first", body = PaginatedResponse<BookShort>)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<BookShort>>> {
    let books = state.services.catalog.list_books(&actor, &query).await?;
    Ok(Json(books))
}

/// Search books by a free-text term
#[utoipa::path(
    get,
    path = "/api/books/search/",
    tag = "books",
    params(BookSearchQuery),
    responses(
        (status = 200, description = "Matching books", body = Vec<BookShort>),
        (status = 400, description = "Missing q parameter")
    )
)]
pub async fn search_books(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<BookSearchQuery>,
) -> AppResult<Json<Vec<BookShort>>> {
    let books = state.services.catalog.search_books(&actor, &query).await?;
    Ok(Json(books))
}

/// Distinct book categories
#[utoipa::path(
    get,
    path = "/api/books/categories/",
    tag = "books",
    responses(
        (status = 200, description = "Sorted categories", body = Vec<String>)
    )
)]
pub async fn list_categories(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> AppResult<Json<Vec<String>>> {
    let categories = state.services.catalog.categories(&actor).await?;
    Ok(Json(categories))
}

/// Get a book by ID
#[utoipa::path(
    get,
    path = "/api/books/{id}/",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(&actor, id).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/api/books/",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid book data"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = state.services.catalog.create_book(&actor, book).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update a book (full or partial)
#[utoipa::path(
    patch,
    path = "/api/books/{id}/",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid book data"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i32>,
    Json(update): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.update_book(&actor, id, update).await?;
    Ok(Json(book))
}

/// Delete a book and its loans
#[utoipa::path(
    delete,
    path = "/api/books/{id}/",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

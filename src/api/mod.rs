//! API handlers for Libris REST endpoints

pub mod auth;
pub mod books;
pub mod extract;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    RequestPartsExt, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, policy::Actor, AppState};

/// Extractor for the acting user.
///
/// No `Authorization` header yields the anonymous actor; a header that is
/// not a valid bearer token, or a token for a deactivated account, is
/// rejected with 401.
pub struct CurrentActor(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(CurrentActor(Actor::Anonymous));
        }

        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let actor = state.services.auth.authenticate(bearer.token()).await?;
        Ok(CurrentActor(actor))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Authentication and own profile
        .route("/auth/register/", post(auth::register))
        .route("/auth/login/", post(auth::login))
        .route(
            "/auth/profile/",
            get(auth::get_profile).patch(auth::update_profile),
        )
        .route("/auth/change-password/", post(auth::change_password))
        // Catalog
        .route("/books/", get(books::list_books).post(books::create_book))
        .route("/books/search/", get(books::search_books))
        .route("/books/categories/", get(books::list_categories))
        .route(
            "/books/:id/",
            get(books::get_book)
                .put(books::update_book)
                .patch(books::update_book)
                .delete(books::delete_book),
        )
        // Loans
        .route("/loans/", get(loans::list_loans).post(loans::create_loan))
        .route("/loans/my-loans/", get(loans::my_loans))
        .route("/loans/:id/", get(loans::get_loan))
        .route("/loans/:id/return/", post(loans::return_loan))
        .route("/admin/loans/overdue/", get(loans::overdue_loans))
        // User administration
        .route("/users/", get(users::list_users))
        .route(
            "/users/:id/",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::deactivate_user),
        )
        .with_state(state);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

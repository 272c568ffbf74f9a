//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, health, loans, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "0.3.0",
        description = "Library loan management REST API"
    ),
    paths(
        // Health
        health::health_check,
        // Auth
        auth::register,
        auth::login,
        auth::get_profile,
        auth::update_profile,
        auth::change_password,
        // Books
        books::list_books,
        books::search_books,
        books::list_categories,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Loans
        loans::list_loans,
        loans::create_loan,
        loans::get_loan,
        loans::return_loan,
        loans::my_loans,
        loans::overdue_loans,
        // Users
        users::list_users,
        users::get_user,
        users::update_user,
        users::deactivate_user,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::MessageResponse,
            crate::models::user::RegisterUser,
            crate::models::user::UpdateProfile,
            crate::models::user::ChangePassword,
            // Books
            crate::models::book::Book,
            crate::models::book::BookShort,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Loans
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanListEntry,
            crate::models::loan::CreateLoan,
            // Users
            crate::models::user::Role,
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::UpdateUserAdmin,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, login and own profile"),
        (name = "books", description = "Book catalog"),
        (name = "loans", description = "Borrowing, returns and overdue tracking"),
        (name = "users", description = "User administration")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

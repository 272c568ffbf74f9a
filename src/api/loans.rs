//! Loan lifecycle endpoints

use axum::{extract::State, http::StatusCode};

use crate::{
    error::AppResult,
    models::{
        loan::{CreateLoan, LoanDetails, LoanListEntry, LoanQuery},
        PaginatedResponse,
    },
    AppState,
};

use super::{
    extract::{Json, Path, Query},
    CurrentActor,
};

/// List loans: all for admins, own for regular users
#[utoipa::path(
    get,
    path = "/api/loans/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans, newest borrow first", body = PaginatedResponse<LoanDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    let loans = state.services.loans.list_loans(&actor, &query).await?;
    Ok(Json(loans))
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/api/loans/",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 400, description = "Missing book_id, book unavailable or duplicate active loan"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    let loan = state.services.loans.borrow(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Get a single loan
#[utoipa::path(
    get,
    path = "/api/loans/{id}/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Loan not found or not visible")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(&actor, id).await?;
    Ok(Json(loan))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/api/loans/{id}/return/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan returned", body = LoanDetails),
        (status = 400, description = "Already returned"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.return_loan(&actor, id).await?;
    Ok(Json(loan))
}

/// The caller's own loans
#[utoipa::path(
    get,
    path = "/api/loans/my-loans/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Own loans", body = PaginatedResponse<LoanDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_loans(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    let loans = state.services.loans.my_loans(&actor, &query).await?;
    Ok(Json(loans))
}

/// Mark stale loans overdue and list all overdue loans
#[utoipa::path(
    get,
    path = "/api/admin/loans/overdue/",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<LoanListEntry>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn overdue_loans(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> AppResult<Json<Vec<LoanListEntry>>> {
    let loans = state.services.loans.overdue_loans(&actor).await?;
    Ok(Json(loans))
}

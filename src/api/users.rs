//! User administration endpoints

use axum::{extract::State, http::StatusCode};

use crate::{
    error::AppResult,
    models::{
        user::{UpdateUserAdmin, User, UserQuery},
        PaginatedResponse,
    },
    AppState,
};

use super::{
    extract::{Json, Path, Query},
    CurrentActor,
};

/// List users (admin only)
#[utoipa::path(
    get,
    path = "/api/users/",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "List of users", body = PaginatedResponse<User>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<PaginatedResponse<User>>> {
    let users = state.services.users.list_users(&actor, &query).await?;
    Ok(Json(users))
}

/// Get a user by ID (admin only)
#[utoipa::path(
    get,
    path = "/api/users/{id}/",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_user(&actor, id).await?;
    Ok(Json(user))
}

/// Change a user's role or active flag (admin only)
#[utoipa::path(
    patch,
    path = "/api/users/{id}/",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateUserAdmin,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Administrator privileges required or self-deactivation"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i32>,
    Json(update): Json<UpdateUserAdmin>,
) -> AppResult<Json<User>> {
    let user = state.services.users.update_user(&actor, id, update).await?;
    Ok(Json(user))
}

/// Deactivate a user account (admin only, never one's own)
#[utoipa::path(
    delete,
    path = "/api/users/{id}/",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 403, description = "Administrator privileges required or self-deactivation"),
        (status = 404, description = "User not found")
    )
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.users.deactivate_user(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

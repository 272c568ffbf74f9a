//! Authentication and profile endpoints

use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{ChangePassword, RegisterUser, UpdateProfile, User},
    AppState,
};

use super::{extract::Json, CurrentActor};

/// Login request
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response with JWT token
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// JWT access token
    pub token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub user: User,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/auth/register/",
    tag = "auth",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid data or username/email taken")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticate and receive a bearer token
#[utoipa::path(
    post,
    path = "/api/auth/login/",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials or disabled account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, user) = state
        .services
        .auth
        .login(&request.username, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.services.auth.token_lifetime(),
        user,
    }))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/auth/profile/",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> AppResult<Json<User>> {
    let user = state.services.auth.profile(&actor).await?;
    Ok(Json(user))
}

/// Update the current user's profile
#[utoipa::path(
    patch,
    path = "/api/auth/profile/",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Invalid data or email taken"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(profile): Json<UpdateProfile>,
) -> AppResult<Json<User>> {
    let user = state.services.auth.update_profile(&actor, profile).await?;
    Ok(Json(user))
}

/// Change the current user's password
#[utoipa::path(
    post,
    path = "/api/auth/change-password/",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = ChangePassword,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Old password incorrect or new password too weak"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(request): Json<ChangePassword>,
) -> AppResult<Json<MessageResponse>> {
    state.services.auth.change_password(&actor, request).await?;
    Ok(Json(MessageResponse {
        message: "Password changed successfully.".to_string(),
    }))
}

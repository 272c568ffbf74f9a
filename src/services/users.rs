//! Administrative user management service

use crate::{
    config::LoansConfig,
    error::AppResult,
    models::{
        user::{UpdateUserAdmin, User, UserQuery},
        PaginatedResponse,
    },
    policy::{Action, Actor},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: LoansConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: LoansConfig) -> Self {
        Self { repository, config }
    }

    pub async fn list_users(&self, actor: &Actor, query: &UserQuery) -> AppResult<PaginatedResponse<User>> {
        actor.require(Action::ListUsers)?;

        let page = self.config.page_request(query.page, query.per_page);
        let (users, total) = self.repository.users.list(page).await?;
        Ok(PaginatedResponse::new(users, total, page))
    }

    pub async fn get_user(&self, actor: &Actor, id: i32) -> AppResult<User> {
        actor.require(Action::ManageUser)?;
        self.repository.users.get_by_id(id).await
    }

    /// Change role or active flag; clearing one's own active flag is refused
    pub async fn update_user(&self, actor: &Actor, id: i32, update: UpdateUserAdmin) -> AppResult<User> {
        actor.require(Action::ManageUser)?;
        if update.is_active == Some(false) {
            actor.require(Action::DeactivateUser { target: id })?;
        }

        let user = self.repository.users.update_admin(id, &update).await?;
        tracing::info!(user_id = id, role = %user.role, is_active = user.is_active, "User updated");
        Ok(user)
    }

    /// Soft delete: the account stays but can no longer log in
    pub async fn deactivate_user(&self, actor: &Actor, id: i32) -> AppResult<()> {
        actor.require(Action::DeactivateUser { target: id })?;

        let update = UpdateUserAdmin {
            role: None,
            is_active: Some(false),
        };
        self.repository.users.update_admin(id, &update).await?;
        tracing::info!(user_id = id, "User deactivated");
        Ok(())
    }
}

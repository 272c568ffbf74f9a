//! Users repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{map_unique_violation, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        user::{NewUser, UpdateProfile, UpdateUserAdmin, User},
        PageRequest,
    },
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UsersRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND ($2::int IS NULL OR id != $2))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                username, email, password_hash, first_name, last_name,
                phone_number, address, role, is_active, date_joined
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, NOW())
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(&user.address)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "User with this username or email"))
    }

    async fn update_profile(&self, id: i32, profile: &UpdateProfile) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone_number = COALESCE($5, phone_number),
                address = COALESCE($6, address)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.email)
        .bind(&profile.phone_number)
        .bind(&profile.address)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "User with this email"))?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(())
    }

    async fn update_admin(&self, id: i32, update: &UpdateUserAdmin) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                role = COALESCE($2, role),
                is_active = COALESCE($3, is_active)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.role)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn list(&self, page: PageRequest) -> AppResult<(Vec<User>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY date_joined DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((users, total))
    }
}

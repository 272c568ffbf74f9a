//! Registration, login and own-profile service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{ChangePassword, NewUser, RegisterUser, Role, UpdateProfile, User, UserClaims},
    policy::{Action, Actor},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Create a regular account
    pub async fn register(&self, request: RegisterUser) -> AppResult<User> {
        request.validate()?;

        if self.repository.users.username_exists(&request.username).await? {
            return Err(AppError::Conflict("A user with that username already exists.".to_string()));
        }
        if self.repository.users.email_exists(&request.email, None).await? {
            return Err(AppError::Conflict("A user with this email already exists.".to_string()));
        }

        let user = self
            .repository
            .users
            .create(&NewUser {
                password_hash: hash_password(&request.password)?,
                username: request.username,
                email: request.email,
                first_name: request.first_name,
                last_name: request.last_name,
                phone_number: request.phone_number,
                address: request.address,
                role: Role::User,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        Ok(user)
    }

    /// Check credentials and issue a bearer token
    pub async fn login(&self, username: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(&user, password)? {
            tracing::warn!(username, "Failed login attempt");
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }
        if !user.is_active {
            return Err(AppError::Authentication("User account is disabled.".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((token, user))
    }

    /// Resolve a bearer token to the acting user.
    ///
    /// The account is reloaded on every request: deactivated users are
    /// rejected and the role comes from the stored user, not the token.
    pub async fn authenticate(&self, token: &str) -> AppResult<Actor> {
        let claims = UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        let user = match self.repository.users.get_by_id(claims.user_id).await {
            Ok(user) => user,
            Err(AppError::NotFound(_)) => {
                return Err(AppError::Authentication("User not found".to_string()))
            }
            Err(e) => return Err(e),
        };
        if !user.is_active {
            return Err(AppError::Authentication("User account is disabled.".to_string()));
        }

        Ok(Actor::member(user.id, user.role))
    }

    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Token lifetime in seconds, as reported to clients
    pub fn token_lifetime(&self) -> i64 {
        self.config.jwt_expiration_hours as i64 * 3600
    }

    pub async fn profile(&self, actor: &Actor) -> AppResult<User> {
        let user_id = actor.require_id()?;
        actor.require(Action::ManageOwnProfile)?;
        self.repository.users.get_by_id(user_id).await
    }

    pub async fn update_profile(&self, actor: &Actor, profile: UpdateProfile) -> AppResult<User> {
        let user_id = actor.require_id()?;
        actor.require(Action::ManageOwnProfile)?;
        profile.validate()?;

        if let Some(ref email) = profile.email {
            if self.repository.users.email_exists(email, Some(user_id)).await? {
                return Err(AppError::Conflict("A user with this email already exists.".to_string()));
            }
        }

        self.repository.users.update_profile(user_id, &profile).await
    }

    pub async fn change_password(&self, actor: &Actor, request: ChangePassword) -> AppResult<()> {
        let user_id = actor.require_id()?;
        actor.require(Action::ManageOwnProfile)?;
        request.validate()?;

        let user = self.repository.users.get_by_id(user_id).await?;
        if !verify_password(&user, &request.old_password)? {
            return Err(AppError::Validation("Old password is incorrect.".to_string()));
        }

        self.repository
            .users
            .set_password(user_id, &hash_password(&request.new_password)?)
            .await?;

        tracing::info!(user_id, "Password changed");
        Ok(())
    }
}

fn verify_password(user: &User, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::user::UpdateUserAdmin,
        services::fixtures::{seed_user, FIXTURE_PASSWORD},
    };

    fn service(repository: &Repository) -> AuthService {
        AuthService::new(repository.clone(), AuthConfig::default())
    }

    fn registration(username: &str, email: &str) -> RegisterUser {
        RegisterUser {
            username: username.to_string(),
            email: email.to_string(),
            password: "StrongPass123!".to_string(),
            password_confirm: "StrongPass123!".to_string(),
            first_name: Some("New".to_string()),
            last_name: None,
            phone_number: None,
            address: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let repository = Repository::in_memory();
        let auth = service(&repository);

        let user = auth.register(registration("newuser", "new@example.com")).await.unwrap();
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);
        assert_ne!(user.password_hash, "StrongPass123!");

        let (token, logged_in) = auth.login("newuser", "StrongPass123!").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        let claims = UserClaims::from_token(&token, &AuthConfig::default().jwt_secret).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::User);

        assert!(matches!(
            auth.login("newuser", "wrong-password").await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            auth.login("nobody", "StrongPass123!").await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_follows_stored_account() {
        let repository = Repository::in_memory();
        let auth = service(&repository);
        let alice = seed_user(&repository, "alice", Role::Admin).await;
        let alice_id = alice.id().unwrap();
        let (token, _) = auth.login("alice", FIXTURE_PASSWORD).await.unwrap();

        assert_eq!(auth.authenticate(&token).await.unwrap(), alice);

        repository
            .users
            .update_admin(alice_id, &UpdateUserAdmin { role: Some(Role::User), is_active: None })
            .await
            .unwrap();
        assert_eq!(
            auth.authenticate(&token).await.unwrap(),
            Actor::member(alice_id, Role::User)
        );

        repository
            .users
            .update_admin(alice_id, &UpdateUserAdmin { role: None, is_active: Some(false) })
            .await
            .unwrap();
        assert!(matches!(
            auth.authenticate(&token).await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            auth.authenticate("not-a-token").await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_mismatch() {
        let repository = Repository::in_memory();
        let auth = service(&repository);
        auth.register(registration("newuser", "new@example.com")).await.unwrap();

        assert!(matches!(
            auth.register(registration("newuser", "other@example.com")).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            auth.register(registration("other", "NEW@example.com")).await,
            Err(AppError::Conflict(_))
        ));

        let mut mismatch = registration("third", "third@example.com");
        mismatch.password_confirm = "DifferentPass123!".to_string();
        assert!(matches!(auth.register(mismatch).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_profile_and_password_change() {
        let repository = Repository::in_memory();
        let alice = seed_user(&repository, "alice", Role::User).await;
        let auth = service(&repository);

        let updated = auth
            .update_profile(
                &alice,
                UpdateProfile {
                    first_name: Some("Alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Alice"));
        assert_eq!(auth.profile(&alice).await.unwrap().first_name.as_deref(), Some("Alice"));

        let wrong_old = auth
            .change_password(
                &alice,
                ChangePassword {
                    old_password: "not-my-password".to_string(),
                    new_password: "NewStrongPass1!".to_string(),
                },
            )
            .await;
        assert!(matches!(wrong_old, Err(AppError::Validation(_))));

        auth.change_password(
            &alice,
            ChangePassword {
                old_password: FIXTURE_PASSWORD.to_string(),
                new_password: "NewStrongPass1!".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(auth.login("alice", "NewStrongPass1!").await.is_ok());
        assert!(auth.login("alice", FIXTURE_PASSWORD).await.is_err());

        assert!(matches!(
            auth.profile(&Actor::Anonymous).await,
            Err(AppError::Authentication(_))
        ));
    }
}

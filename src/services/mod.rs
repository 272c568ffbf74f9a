//! Business logic services
//!
//! Every operation takes the acting user explicitly and asks the policy
//! before touching a store.

pub mod auth;
pub mod catalog;
pub mod loans;
pub mod overdue;
pub mod users;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub users: users::UsersService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), config.loans.clone()),
            loans: loans::LoansService::new(repository.clone(), config.loans.clone()),
            users: users::UsersService::new(repository, config.loans.clone()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::auth::hash_password;
    use crate::{
        models::{
            book::CreateBook,
            user::{NewUser, Role},
        },
        policy::Actor,
        repository::Repository,
    };

    pub const FIXTURE_PASSWORD: &str = "TestPass123!";

    pub async fn seed_user(repository: &Repository, username: &str, role: Role) -> Actor {
        let user = repository
            .users
            .create(&NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password_hash: hash_password(FIXTURE_PASSWORD).unwrap(),
                first_name: None,
                last_name: None,
                phone_number: None,
                address: None,
                role,
            })
            .await
            .unwrap();
        Actor::member(user.id, user.role)
    }

    pub fn create_book_request(isbn: &str, total: i32, available: Option<i32>) -> CreateBook {
        CreateBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: isbn.to_string(),
            publisher: None,
            publication_date: None,
            page_count: 412,
            language: "English".to_string(),
            description: None,
            category: "Fiction".to_string(),
            total_copies: total,
            available_copies: available,
            cover_image: None,
        }
    }

    pub async fn seed_book(repository: &Repository, isbn: &str, total: i32, available: Option<i32>) -> i32 {
        repository
            .books
            .create(&create_book_request(isbn, total, available))
            .await
            .unwrap()
            .id
    }
}

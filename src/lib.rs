//! Libris Library Loan Server
//!
//! REST JSON API for a book catalog, member accounts and the loan lifecycle:
//! borrowing, returns and overdue tracking.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod policy;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig, repository: repository::Repository) -> Self {
        let services = services::Services::new(repository, &config);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}

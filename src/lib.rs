//! Circulation service
//!
//! Loan and reservation consistency engine for a multi-branch library:
//! issuing and returning copies, overdue fines, and a dense FIFO reservation
//! queue per title, all on top of a transactional store.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared by every task of the daemon
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

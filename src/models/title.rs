//! Title (catalog work) model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Bibliographic record; its row doubles as the lock for the title's reservation queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Title {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
}

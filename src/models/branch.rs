//! Library branch model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Branch {
    pub id: i32,
    pub name: String,
    /// Inactive branches keep their history but accept no transfers
    pub active: bool,
}

/// Number of available copies of one title at one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BranchAvailability {
    pub branch_id: i32,
    pub branch_name: String,
    pub available: i64,
}

/// Copies of one title held by a branch, counted by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TitleInventory {
    pub title_id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub available: i64,
    pub loaned: i64,
    pub maintenance: i64,
    pub lost: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInventory {
    pub branch: Branch,
    pub titles: Vec<TitleInventory>,
    pub total_copies: i64,
    pub available: i64,
    pub loaned: i64,
    pub maintenance: i64,
    pub lost: i64,
}

impl BranchInventory {
    /// Roll per-title rows up into branch totals
    pub fn new(branch: Branch, titles: Vec<TitleInventory>) -> Self {
        let sum = |field: fn(&TitleInventory) -> i64| titles.iter().map(field).sum::<i64>();
        Self {
            total_copies: sum(|t| t.total),
            available: sum(|t| t.available),
            loaned: sum(|t| t.loaned),
            maintenance: sum(|t| t.maintenance),
            lost: sum(|t| t.lost),
            branch,
            titles,
        }
    }
}

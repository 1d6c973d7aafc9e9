//! Copy (physical unit) model and its status transitions

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::CopyStatus;
use crate::error::{AppError, AppResult};

/// Physical copy from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BookCopy {
    pub id: i32,
    pub title_id: i32,
    pub branch_id: i32,
    /// Unique across all copies
    pub barcode: String,
    pub status: CopyStatus,
}

impl BookCopy {
    /// `available -> loaned`, on loan issuance
    pub fn check_out(&mut self) -> AppResult<()> {
        if self.status != CopyStatus::Available {
            return Err(AppError::CopyNotAvailable(format!(
                "Copy {} is {}",
                self.barcode, self.status
            )));
        }
        self.status = CopyStatus::Loaned;
        Ok(())
    }

    /// `loaned -> available`, only reachable from a loan return
    pub fn check_in(&mut self) -> AppResult<()> {
        if self.status != CopyStatus::Loaned {
            return Err(AppError::Internal(format!(
                "Copy {} has an active loan but is {}",
                self.barcode, self.status
            )));
        }
        self.status = CopyStatus::Available;
        Ok(())
    }

    /// Administrative status change (maintenance, lost, found)
    pub fn set_status(&mut self, target: CopyStatus) -> AppResult<()> {
        use CopyStatus::*;

        if self.status == Loaned {
            return Err(AppError::CopyNotAvailable(format!(
                "Copy {} is on loan and must be returned first",
                self.barcode
            )));
        }

        match (self.status, target) {
            (Available, Maintenance)
            | (Available, Lost)
            | (Maintenance, Available)
            | (Maintenance, Lost)
            | (Lost, Available) => {
                self.status = target;
                Ok(())
            }
            (from, to) => Err(AppError::InvalidTransition(format!(
                "Copy {} cannot go from {} to {}",
                self.barcode, from, to
            ))),
        }
    }

    /// Only copies on the shelf may change branch
    pub fn ensure_transferable(&self) -> AppResult<()> {
        if self.status != CopyStatus::Available {
            return Err(AppError::CopyNotAvailable(format!(
                "Only available copies can be transferred, copy {} is {}",
                self.barcode, self.status
            )));
        }
        Ok(())
    }

    /// Move an available copy to another branch
    pub fn relocate(&mut self, branch_id: i32) -> AppResult<()> {
        self.ensure_transferable()?;
        if self.branch_id == branch_id {
            return Err(AppError::InvalidReference(format!(
                "Copy {} is already at branch {}",
                self.barcode, branch_id
            )));
        }
        self.branch_id = branch_id;
        Ok(())
    }
}

//! Copy administration: branch transfers, status changes and availability

use super::ServiceContext;
use crate::{
    error::{AppError, AppResult},
    models::{Actor, BookCopy, BranchAvailability, BranchInventory, CopyStatus},
};

/// Inactive branches are hidden from circulation as if they did not exist
fn inactive_branch(id: i32) -> AppError {
    AppError::NotFound(format!("Branch with id {} not found", id))
}

#[derive(Clone)]
pub struct CopiesService {
    context: ServiceContext,
}

impl CopiesService {
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Move an available copy to another active branch
    pub async fn transfer(&self, actor: &Actor, copy_id: i32, target_branch_id: i32) -> AppResult<BookCopy> {
        actor.ensure_can_manage_catalog()?;
        self.context
            .retry("transfer", move || async move {
                let mut tx = self.context.repository.begin().await?;
                let mut copy = tx.lock_copy(copy_id).await?;
                copy.ensure_transferable()?;

                let target = tx.get_branch(target_branch_id).await?;
                if !target.active {
                    return Err(inactive_branch(target_branch_id));
                }

                let from = copy.branch_id;
                copy.relocate(target.id)?;
                tx.update_copy(&copy).await?;
                tx.commit().await?;

                tracing::info!(
                    "Copy {} transferred from branch {} to branch {} ({})",
                    copy.barcode,
                    from,
                    target.id,
                    target.name
                );
                Ok(copy)
            })
            .await
    }

    /// Administrative status change (maintenance, lost, back to available)
    pub async fn set_status(&self, actor: &Actor, copy_id: i32, status: CopyStatus) -> AppResult<BookCopy> {
        actor.ensure_can_manage_catalog()?;
        self.context
            .retry("set_status", move || async move {
                let mut tx = self.context.repository.begin().await?;
                let mut copy = tx.lock_copy(copy_id).await?;
                let previous = copy.status;
                copy.set_status(status)?;
                tx.update_copy(&copy).await?;
                tx.commit().await?;

                tracing::info!("Copy {} status {} -> {}", copy.barcode, previous, copy.status);
                Ok(copy)
            })
            .await
    }

    /// Available copies of a title per active branch
    pub async fn availability(&self, title_id: i32) -> AppResult<Vec<BranchAvailability>> {
        let mut tx = self.context.repository.begin().await?;
        tx.get_title(title_id).await?;
        let rows = tx.availability(title_id).await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Copies held by an active branch, per title and status
    pub async fn branch_inventory(&self, branch_id: i32) -> AppResult<BranchInventory> {
        let mut tx = self.context.repository.begin().await?;
        let branch = tx.get_branch(branch_id).await?;
        if !branch.active {
            return Err(inactive_branch(branch_id));
        }
        let titles = tx.branch_inventory(branch_id).await?;
        tx.commit().await?;
        Ok(BranchInventory::new(branch, titles))
    }
}

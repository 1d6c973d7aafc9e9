use circulation_service::{models::CopyStatus, AppError};

use crate::common::Library;

#[tokio::test]
async fn test_transfer_moves_available_copy() {
    let lib = Library::new().await;
    let north = lib.repo.add_branch("North").await;
    let copy = lib.copy("LHD-001").await;

    let moved = lib
        .services
        .copies
        .transfer(&lib.librarian, copy.id, north.id)
        .await
        .unwrap();

    assert_eq!(moved.branch_id, north.id);
    assert_eq!(moved.status, CopyStatus::Available);
    assert_eq!(lib.repo.copy(copy.id).await.unwrap().branch_id, north.id);
}

#[tokio::test]
async fn test_transfer_rejections() {
    let lib = Library::new().await;
    let closed = lib.repo.add_branch("Closed").await;
    lib.repo.deactivate_branch(closed.id).await;
    let north = lib.repo.add_branch("North").await;
    let copy = lib.copy("LHD-001").await;
    let ana = lib.borrower("ana").await;

    let same = lib.services.copies.transfer(&lib.librarian, copy.id, lib.branch.id).await;
    assert!(matches!(same, Err(AppError::InvalidReference(_))));

    let inactive = lib.services.copies.transfer(&lib.librarian, copy.id, closed.id).await;
    assert!(matches!(inactive, Err(AppError::NotFound(_))));

    let unknown = lib.services.copies.transfer(&lib.librarian, copy.id, 9_999).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));

    let regular = lib.services.copies.transfer(&ana, copy.id, north.id).await;
    assert!(matches!(regular, Err(AppError::Forbidden(_))));

    lib.services.loans.issue(&ana, ana.borrower_id, copy.id).await.unwrap();
    let loaned = lib.services.copies.transfer(&lib.librarian, copy.id, north.id).await;
    assert!(matches!(loaned, Err(AppError::CopyNotAvailable(_))));

    // Availability is judged before the destination is looked up
    let loaned_unknown = lib.services.copies.transfer(&lib.librarian, copy.id, 9_999).await;
    assert!(matches!(loaned_unknown, Err(AppError::CopyNotAvailable(_))));
    let loaned_inactive = lib.services.copies.transfer(&lib.librarian, copy.id, closed.id).await;
    assert!(matches!(loaned_inactive, Err(AppError::CopyNotAvailable(_))));

    assert_eq!(lib.repo.copy(copy.id).await.unwrap().branch_id, lib.branch.id);
}

#[tokio::test]
async fn test_administrative_status_changes() {
    let lib = Library::new().await;
    let copy = lib.copy("LHD-001").await;
    let copies = &lib.services.copies;

    let c = copies.set_status(&lib.librarian, copy.id, CopyStatus::Maintenance).await.unwrap();
    assert_eq!(c.status, CopyStatus::Maintenance);
    let c = copies.set_status(&lib.librarian, copy.id, CopyStatus::Lost).await.unwrap();
    assert_eq!(c.status, CopyStatus::Lost);
    let c = copies.set_status(&lib.librarian, copy.id, CopyStatus::Available).await.unwrap();
    assert_eq!(c.status, CopyStatus::Available);

    let to_loaned = copies.set_status(&lib.librarian, copy.id, CopyStatus::Loaned).await;
    assert!(matches!(to_loaned, Err(AppError::InvalidTransition(_))));

    let ana = lib.borrower("ana").await;
    let forbidden = copies.set_status(&ana, copy.id, CopyStatus::Lost).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    lib.services.loans.issue(&ana, ana.borrower_id, copy.id).await.unwrap();
    let while_loaned = copies.set_status(&lib.librarian, copy.id, CopyStatus::Lost).await;
    assert!(matches!(while_loaned, Err(AppError::CopyNotAvailable(_))));
    assert_eq!(lib.repo.copy(copy.id).await.unwrap().status, CopyStatus::Loaned);
}

#[tokio::test]
async fn test_availability_counts_shelved_copies_per_active_branch() {
    let lib = Library::new().await;
    let north = lib.repo.add_branch("North").await;
    let closed = lib.repo.add_branch("Annex").await;

    lib.copy("LHD-001").await;
    let loaned = lib.copy("LHD-002").await;
    let repaired = lib.copy("LHD-003").await;
    lib.repo.add_copy(lib.title.id, north.id, "LHD-004").await.unwrap();
    lib.repo.add_copy(lib.title.id, closed.id, "LHD-005").await.unwrap();
    lib.repo.deactivate_branch(closed.id).await;

    let ana = lib.borrower("ana").await;
    lib.services.loans.issue(&ana, ana.borrower_id, loaned.id).await.unwrap();
    lib.services
        .copies
        .set_status(&lib.librarian, repaired.id, CopyStatus::Maintenance)
        .await
        .unwrap();

    let rows = lib.services.copies.availability(lib.title.id).await.unwrap();
    let counts: Vec<(&str, i64)> = rows.iter().map(|r| (r.branch_name.as_str(), r.available)).collect();
    assert_eq!(counts, vec![("Central", 1), ("North", 1)]);

    let unknown = lib.services.copies.availability(9_999).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_branch_inventory_counts_by_title_and_status() {
    let lib = Library::new().await;
    let north = lib.repo.add_branch("North").await;
    let closed = lib.repo.add_branch("Annex").await;
    lib.repo.deactivate_branch(closed.id).await;
    let kindred = lib
        .repo
        .add_title("Kindred", "Octavia E. Butler", "9780807083697")
        .await
        .unwrap();

    lib.copy("LHD-001").await;
    let loaned = lib.copy("LHD-002").await;
    let repaired = lib.copy("LHD-003").await;
    lib.repo.add_copy(lib.title.id, north.id, "LHD-004").await.unwrap();
    let missing = lib.repo.add_copy(kindred.id, lib.branch.id, "KIN-001").await.unwrap();

    let ana = lib.borrower("ana").await;
    lib.services.loans.issue(&ana, ana.borrower_id, loaned.id).await.unwrap();
    let copies = &lib.services.copies;
    copies.set_status(&lib.librarian, repaired.id, CopyStatus::Maintenance).await.unwrap();
    copies.set_status(&lib.librarian, missing.id, CopyStatus::Lost).await.unwrap();

    let central = copies.branch_inventory(lib.branch.id).await.unwrap();
    assert_eq!(central.branch.id, lib.branch.id);
    let rows: Vec<(i32, i64, i64, i64, i64, i64)> = central
        .titles
        .iter()
        .map(|t| (t.title_id, t.available, t.loaned, t.maintenance, t.lost, t.total))
        .collect();
    assert_eq!(
        rows,
        vec![(kindred.id, 0, 0, 0, 1, 1), (lib.title.id, 1, 1, 1, 0, 3)]
    );
    assert_eq!(
        (central.total_copies, central.available, central.loaned, central.maintenance, central.lost),
        (4, 1, 1, 1, 1)
    );

    let branch = copies.branch_inventory(north.id).await.unwrap();
    assert_eq!(branch.titles.len(), 1);
    assert_eq!(branch.total_copies, 1);

    let inactive = copies.branch_inventory(closed.id).await;
    assert!(matches!(inactive, Err(AppError::NotFound(_))));
    let unknown = copies.branch_inventory(9_999).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

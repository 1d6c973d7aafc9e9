//! Parallel requests against one title or one copy

use std::sync::Arc;

use chrono::Duration;
use tokio::task::JoinHandle;

use circulation_service::{
    models::{CopyStatus, ReservationStatus},
    AppError,
};

use crate::common::{assert_dense, Library};

/// Await every task, propagating panics
async fn join_all<T>(handles: Vec<JoinHandle<T>>) -> Vec<T> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_enrolls_keep_the_queue_dense() {
    let lib = Arc::new(Library::new().await);
    let mut actors = Vec::new();
    for i in 0..12 {
        actors.push(lib.borrower(&format!("reader{}", i)).await);
    }

    let handles: Vec<_> = actors
        .iter()
        .copied()
        .map(|actor| {
            let lib = lib.clone();
            tokio::spawn(async move {
                lib.services
                    .reservations
                    .enroll(&actor, actor.borrower_id, lib.title.id)
                    .await
            })
        })
        .collect();
    for result in join_all(handles).await {
        result.unwrap();
    }

    let queue = lib.services.reservations.queue(lib.title.id).await.unwrap();
    assert_eq!(queue.len(), 12);
    assert_dense(&queue);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_issue_of_one_copy_has_one_winner() {
    let lib = Arc::new(Library::new().await);
    let copy_id = lib.copy("LHD-001").await.id;
    let mut actors = Vec::new();
    for i in 0..8 {
        actors.push(lib.borrower(&format!("reader{}", i)).await);
    }

    let handles: Vec<_> = actors
        .iter()
        .copied()
        .map(|actor| {
            let lib = lib.clone();
            tokio::spawn(async move {
                lib.services
                    .loans
                    .issue(&actor, actor.borrower_id, copy_id)
                    .await
            })
        })
        .collect();
    let results = join_all(handles).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AppError::CopyNotAvailable(_))));

    let active = lib
        .repo
        .loans_for_copy(copy_id)
        .await
        .into_iter()
        .filter(|l| l.is_active())
        .count();
    assert_eq!(active, 1);
    assert_eq!(lib.repo.copy(copy_id).await.unwrap().status, CopyStatus::Loaned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_queue_operations_stay_dense() {
    let lib = Arc::new(Library::new().await);
    let mut actors = Vec::new();
    let mut reservations = Vec::new();
    for i in 0..10 {
        let actor = lib.borrower(&format!("reader{}", i)).await;
        lib.clock.advance(Duration::minutes(1));
        reservations.push(lib.enroll(&actor).await);
        actors.push(actor);
    }

    // Cancel every odd reservation while the head is promoted three times
    let mut handles = Vec::new();
    for (actor, reservation) in actors.iter().zip(&reservations).skip(1).step_by(2) {
        let lib = lib.clone();
        let (actor, id) = (*actor, reservation.id);
        handles.push(tokio::spawn(async move {
            lib.services.reservations.cancel(&actor, id).await.map(|_| ())
        }));
    }
    for _ in 0..3 {
        let lib = lib.clone();
        handles.push(tokio::spawn(async move {
            lib.services.reservations.promote(lib.title.id).await.map(|_| ())
        }));
    }

    // A cancel may lose the race against a promotion of the same reservation
    for result in join_all(handles).await {
        assert!(matches!(result, Ok(()) | Err(AppError::ReservationNotActive(_))));
    }

    let queue = lib.services.reservations.queue(lib.title.id).await.unwrap();
    assert_dense(&queue);

    let all = lib.repo.reservations_for_title(lib.title.id).await;
    let fulfilled = all.iter().filter(|r| r.status == ReservationStatus::Fulfilled).count();
    let active = all.iter().filter(|r| r.is_active()).count();
    assert_eq!(fulfilled, 3);
    assert_eq!(active, queue.len());
    assert_eq!(lib.notifier.events().len(), 3);
}

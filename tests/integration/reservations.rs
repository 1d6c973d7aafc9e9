use chrono::Duration;

use circulation_service::{
    models::{CopyStatus, ReservationStatus},
    AppError,
};

use crate::common::{assert_dense, start, Library};

#[tokio::test]
async fn test_enroll_appends_to_the_tail() {
    let lib = Library::new().await;
    let mut expected = Vec::new();
    for (i, name) in ["b1", "b2", "b3"].into_iter().enumerate() {
        let actor = lib.borrower(name).await;
        lib.clock.advance(Duration::minutes(5));
        let reservation = lib.enroll(&actor).await;

        assert_eq!(reservation.position, i as i32 + 1);
        assert_eq!(reservation.status, ReservationStatus::Active);
        assert_eq!(reservation.expires_at, reservation.created_at + Duration::days(2));
        expected.push((actor.borrower_id, i as i32 + 1));
    }

    assert_eq!(lib.queue_shape().await, expected);
    assert_dense(&lib.services.reservations.queue(lib.title.id).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_reservation_is_rejected() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;
    lib.enroll(&ana).await;

    let again = lib
        .services
        .reservations
        .enroll(&ana, ana.borrower_id, lib.title.id)
        .await;
    assert!(matches!(again, Err(AppError::DuplicateReservation(_))));
    assert_eq!(lib.queue_shape().await, vec![(ana.borrower_id, 1)]);
}

#[tokio::test]
async fn test_reserving_again_after_cancel_goes_to_the_tail() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;
    let ben = lib.borrower("ben").await;

    let first = lib.enroll(&ana).await;
    lib.enroll(&ben).await;
    lib.services.reservations.cancel(&ana, first.id).await.unwrap();
    let again = lib.enroll(&ana).await;

    assert_eq!(again.position, 2);
    assert_eq!(
        lib.queue_shape().await,
        vec![(ben.borrower_id, 1), (ana.borrower_id, 2)]
    );
}

#[tokio::test]
async fn test_ineligible_borrower_cannot_reserve() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;
    let mut borrower = lib.repo.borrower(ana.borrower_id).await.unwrap();
    borrower.outstanding_fines = rust_decimal::Decimal::new(50, 2);
    lib.repo.put_borrower(borrower).await;

    let result = lib
        .services
        .reservations
        .enroll(&ana, ana.borrower_id, lib.title.id)
        .await;
    assert!(matches!(result, Err(AppError::BorrowerIneligible(_))));
    assert!(lib.queue_shape().await.is_empty());
}

#[tokio::test]
async fn test_enroll_unknown_title_is_not_found() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;

    let result = lib.services.reservations.enroll(&ana, ana.borrower_id, 9_999).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_cancel_in_the_middle_shifts_only_the_tail() {
    let lib = Library::new().await;
    let mut actors = Vec::new();
    let mut reservations = Vec::new();
    for name in ["b1", "b2", "b3", "b4", "b5"] {
        let actor = lib.borrower(name).await;
        lib.clock.advance(Duration::minutes(1));
        reservations.push(lib.enroll(&actor).await);
        actors.push(actor);
    }

    // k = 2 in a queue of 5
    let cancelled = lib
        .services
        .reservations
        .cancel(&actors[1], reservations[1].id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.position, 2);

    assert_eq!(
        lib.queue_shape().await,
        vec![
            (actors[0].borrower_id, 1),
            (actors[2].borrower_id, 2),
            (actors[3].borrower_id, 3),
            (actors[4].borrower_id, 4),
        ]
    );

    let statuses: Vec<ReservationStatus> = lib
        .repo
        .reservations_for_title(lib.title.id)
        .await
        .iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ReservationStatus::Active,
            ReservationStatus::Cancelled,
            ReservationStatus::Active,
            ReservationStatus::Active,
            ReservationStatus::Active,
        ]
    );
    assert!(lib.notifier.events().is_empty());
}

#[tokio::test]
async fn test_cancel_twice_fails() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;
    let reservation = lib.enroll(&ana).await;

    lib.services.reservations.cancel(&ana, reservation.id).await.unwrap();
    let again = lib.services.reservations.cancel(&ana, reservation.id).await;

    assert!(matches!(again, Err(AppError::ReservationNotActive(id)) if id == reservation.id));
}

#[tokio::test]
async fn test_only_owner_or_staff_can_cancel() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;
    let ben = lib.borrower("ben").await;
    let reservation = lib.enroll(&ana).await;

    let result = lib.services.reservations.cancel(&ben, reservation.id).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    lib.services
        .reservations
        .cancel(&lib.librarian, reservation.id)
        .await
        .unwrap();
    assert!(lib.queue_shape().await.is_empty());
}

#[tokio::test]
async fn test_return_promotes_the_head() {
    let lib = Library::new().await;
    let holder = lib.borrower("holder").await;
    let copy = lib.copy("LHD-001").await;
    let loan = lib.services.loans.issue(&holder, holder.borrower_id, copy.id).await.unwrap();

    let mut actors = Vec::new();
    for name in ["b1", "b2", "b3"] {
        let actor = lib.borrower(name).await;
        lib.enroll(&actor).await;
        actors.push(actor);
    }

    lib.clock.advance(Duration::days(1));
    lib.services.loans.return_loan(&lib.librarian, loan.id).await.unwrap();

    assert_eq!(
        lib.queue_shape().await,
        vec![(actors[1].borrower_id, 1), (actors[2].borrower_id, 2)]
    );
    let fulfilled: Vec<_> = lib
        .repo
        .reservations_for_title(lib.title.id)
        .await
        .into_iter()
        .filter(|r| r.status == ReservationStatus::Fulfilled)
        .collect();
    assert_eq!(fulfilled.len(), 1);
    assert_eq!(fulfilled[0].borrower_id, actors[0].borrower_id);

    let events = lib.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].borrower_id, actors[0].borrower_id);
    assert_eq!(events[0].reservation_id, fulfilled[0].id);
    assert_eq!(events[0].fulfilled_at, start() + Duration::days(1));

    // The copy goes back on the shelf; collection is a separate loan
    assert_eq!(lib.repo.copy(copy.id).await.unwrap().status, CopyStatus::Available);
    lib.services
        .loans
        .issue(&actors[0], actors[0].borrower_id, copy.id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_promote_empty_queue_is_a_no_op() {
    let lib = Library::new().await;

    assert!(lib.services.reservations.promote(lib.title.id).await.unwrap().is_none());
    assert!(lib.notifier.events().is_empty());
}

#[tokio::test]
async fn test_failed_promotion_commit_sends_nothing() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;
    lib.enroll(&ana).await;

    lib.repo.inject_conflicts(3);
    let result = lib.services.reservations.promote(lib.title.id).await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(lib.notifier.events().is_empty());
    assert_eq!(lib.queue_shape().await, vec![(ana.borrower_id, 1)]);
}

#[tokio::test]
async fn test_expire_sweep_expires_lapsed_holds_in_order() {
    let lib = Library::new().await;
    let mut actors = Vec::new();
    let mut reservations = Vec::new();
    for (name, gap) in [("b1", 0), ("b2", 1), ("b3", 10), ("b4", 40)] {
        let actor = lib.borrower(name).await;
        lib.clock.advance(Duration::hours(gap));
        reservations.push(lib.enroll(&actor).await);
        actors.push(actor);
    }

    // b1 and b2 lapsed; b3 expires exactly now and is kept
    let now = reservations[2].expires_at;
    let report = lib.services.reservations.expire_sweep(now).await.unwrap();

    assert!(report.failures.is_empty());
    let expired: Vec<i32> = report.expired.iter().map(|r| r.id).collect();
    assert_eq!(expired, vec![reservations[0].id, reservations[1].id]);
    assert!(report.expired.iter().all(|r| r.status == ReservationStatus::Expired));

    assert_eq!(
        lib.queue_shape().await,
        vec![(actors[2].borrower_id, 1), (actors[3].borrower_id, 2)]
    );

    let again = lib.services.reservations.expire_sweep(now).await.unwrap();
    assert!(again.expired.is_empty());
}

#[tokio::test]
async fn test_expire_sweep_covers_every_title() {
    let lib = Library::new().await;
    let other = lib
        .repo
        .add_title("Kindred", "Octavia E. Butler", "9780807083697")
        .await
        .unwrap();
    let ana = lib.borrower("ana").await;
    let ben = lib.borrower("ben").await;

    lib.enroll(&ana).await;
    lib.services
        .reservations
        .enroll(&ben, ben.borrower_id, other.id)
        .await
        .unwrap();
    lib.clock.advance(Duration::hours(30));
    let kept = lib.enroll(&ben).await;

    let report = lib
        .services
        .reservations
        .expire_sweep(start() + Duration::days(2) + Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(report.expired.len(), 2);
    assert_eq!(lib.queue_shape().await, vec![(ben.borrower_id, 1)]);
    assert_eq!(lib.queue_shape().await[0].0, kept.borrower_id);
    assert!(lib.services.reservations.queue(other.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expire_sweep_retries_a_conflicting_scan() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;
    let reservation = lib.enroll(&ana).await;

    lib.repo.inject_conflicts(1);
    let report = lib
        .services
        .reservations
        .expire_sweep(start() + Duration::days(3))
        .await
        .unwrap();

    let expired: Vec<i32> = report.expired.iter().map(|r| r.id).collect();
    assert_eq!(expired, vec![reservation.id]);
    assert!(report.failures.is_empty());
    assert!(lib.queue_shape().await.is_empty());
}

#[tokio::test]
async fn test_expire_sweep_isolates_a_failing_title() {
    let lib = Library::new().await;
    let other = lib
        .repo
        .add_title("Kindred", "Octavia E. Butler", "9780807083697")
        .await
        .unwrap();
    let a1 = lib.borrower("a1").await;
    let a2 = lib.borrower("a2").await;
    let a3 = lib.borrower("a3").await;
    let ben = lib.borrower("ben").await;

    let first = lib.enroll(&a1).await;
    lib.enroll(&a2).await;
    let elsewhere = lib
        .services
        .reservations
        .enroll(&ben, ben.borrower_id, other.id)
        .await
        .unwrap();
    lib.clock.advance(Duration::hours(30));
    lib.enroll(&a3).await;

    // The first expiry on the main title commits, every later step hits contention
    lib.repo.fail_title_locks_after(lib.title.id, 1).await;
    let now = start() + Duration::days(2) + Duration::seconds(1);
    let report = lib.services.reservations.expire_sweep(now).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].title_id, lib.title.id);
    assert!(report.failures[0].error.starts_with("Conflict"));
    let expired: Vec<i32> = report.expired.iter().map(|r| r.id).collect();
    assert_eq!(expired, vec![first.id, elsewhere.id]);

    let queue = lib.services.reservations.queue(lib.title.id).await.unwrap();
    assert_dense(&queue);
    assert_eq!(
        lib.queue_shape().await,
        vec![(a2.borrower_id, 1), (a3.borrower_id, 2)]
    );
    assert!(lib.services.reservations.queue(other.id).await.unwrap().is_empty());

    // Once the contention clears, the next sweep finishes the job
    lib.repo.clear_title_faults().await;
    let report = lib.services.reservations.expire_sweep(now).await.unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(report.expired.len(), 1);
    assert_eq!(lib.queue_shape().await, vec![(a3.borrower_id, 1)]);
}

#[tokio::test]
async fn test_borrower_reservation_history() {
    let lib = Library::new().await;
    let ana = lib.borrower("ana").await;
    let ben = lib.borrower("ben").await;

    let first = lib.enroll(&ana).await;
    lib.services.reservations.cancel(&ana, first.id).await.unwrap();
    lib.clock.advance(Duration::minutes(1));
    let second = lib.enroll(&ana).await;

    let history = lib
        .services
        .reservations
        .borrower_reservations(&ana, ana.borrower_id)
        .await
        .unwrap();
    let ids: Vec<i32> = history.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let result = lib
        .services
        .reservations
        .borrower_reservations(&ben, ana.borrower_id)
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

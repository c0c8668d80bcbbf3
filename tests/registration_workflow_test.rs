//! Free registration workflow tests
//!
//! Individual and team sign-ups against the in-memory engine: policy
//! rejections, duplicate detection, counters and pagination.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Duration as ChronoDuration;
use uuid::Uuid;

use helpers::*;
use RosterDesk::database::MemoryEngine;
use RosterDesk::models::{RegistrationOption, RegistrationType};
use RosterDesk::RegistrationError;

#[tokio::test]
async fn test_individual_registration_updates_counters() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    let registered = ctx
        .service
        .attempt_registration(individual_request(event.id, "ana@example.com"))
        .await
        .expect("Registration should succeed");

    assert_eq!(registered.registration.email(), "ana@example.com");
    assert!(!registered.registration.is_paid());
    assert_eq!(registered.event.num_teams, 0);
    assert_eq!(registered.event.num_rostered_players, 0);
    assert_eq!(registered.event.num_total_players, 1);
    assert_eq!(registered.event.version, event.version + 1);

    // The committed snapshot is what storage now holds
    assert_eq!(ctx.event(event.id).await, registered.event);

    let stored = ctx.service.get_registration(event.id, "ana@example.com").await.unwrap();
    assert_eq!(stored, registered.registration);
}

#[tokio::test]
async fn test_team_then_duplicate_captain() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    let registered = ctx
        .service
        .attempt_registration(team_request(event.id, "captain@example.com", 3))
        .await
        .expect("Team registration should succeed");
    assert_eq!(registered.event.num_teams, 1);
    assert_eq!(registered.event.num_rostered_players, 3);
    assert_eq!(registered.event.num_total_players, 3);

    let duplicate = ctx
        .service
        .attempt_registration(team_request(event.id, "captain@example.com", 2))
        .await;
    assert_matches!(
        duplicate,
        Err(RegistrationError::RegistrationAlreadyExists { event_id, ref email })
            if event_id == event.id && email == "captain@example.com"
    );

    // Nothing changed for the rejected attempt
    let stored = ctx.event(event.id).await;
    assert_eq!(stored.counters(), registered.event.counters());
    assert_eq!(stored.version, registered.event.version);
}

#[tokio::test]
async fn test_email_uniqueness_ignores_case() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    ctx.service
        .attempt_registration(individual_request(event.id, "Ana@Example.com"))
        .await
        .unwrap();

    let result = ctx
        .service
        .attempt_registration(individual_request(event.id, " ana@example.COM "))
        .await;
    assert_matches!(result, Err(RegistrationError::RegistrationAlreadyExists { .. }));

    // Lookups are case-insensitive too
    let stored = ctx.service.get_registration(event.id, "ANA@example.com").await.unwrap();
    assert_eq!(stored.email(), "Ana@Example.com");
}

#[tokio::test]
async fn test_individual_and_team_share_one_email_slot() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    ctx.service
        .attempt_registration(individual_request(event.id, "sam@example.com"))
        .await
        .unwrap();

    let result = ctx
        .service
        .attempt_registration(team_request(event.id, "sam@example.com", 2))
        .await;
    assert_matches!(result, Err(RegistrationError::RegistrationAlreadyExists { .. }));
}

#[tokio::test]
async fn test_registration_closes_at_close_time() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    // Exactly at the close time is still open
    ctx.clock.set(event.registration_close_time);
    ctx.service
        .attempt_registration(individual_request(event.id, "ontime@example.com"))
        .await
        .expect("Registration at the close time should succeed");

    ctx.clock.advance(ChronoDuration::milliseconds(1));
    let result = ctx
        .service
        .attempt_registration(individual_request(event.id, "late@example.com"))
        .await;
    assert_matches!(
        result,
        Err(RegistrationError::RegistrationIsClosed { event_id, closed_at })
            if event_id == event.id && closed_at == event.registration_close_time
    );
    assert_eq!(ctx.event(event.id).await.num_total_players, 1);
}

#[tokio::test]
async fn test_kind_not_offered_is_rejected() {
    let ctx = TestContext::new();
    let event = ctx
        .create_event(vec![RegistrationOption { registration_type: RegistrationType::Individual, price: 0 }])
        .await;

    let result = ctx
        .service
        .attempt_registration(team_request(event.id, "captain@example.com", 3))
        .await;
    assert_matches!(
        result,
        Err(RegistrationError::NotAllowedToSignUpAsType { registration_type: RegistrationType::Team })
    );
}

#[tokio::test]
async fn test_team_size_outside_range_is_rejected() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    for size in [1, 5] {
        let result = ctx
            .service
            .attempt_registration(team_request(event.id, &unique_email(), size))
            .await;
        assert_matches!(
            result,
            Err(RegistrationError::TeamSizeNotAllowed { attempted, min: 2, max: 4 }) if attempted == size as u32
        );
    }

    for size in [2, 4] {
        ctx.service
            .attempt_registration(team_request(event.id, &unique_email(), size))
            .await
            .expect("Boundary team sizes are allowed");
    }

    let stored = ctx.event(event.id).await;
    assert_eq!(stored.num_teams, 2);
    assert_eq!(stored.num_rostered_players, 6);
}

#[tokio::test]
async fn test_nonexistent_event() {
    let ctx = TestContext::new();
    let missing = Uuid::new_v4();

    let result = ctx.service.attempt_registration(individual_request(missing, "ana@example.com")).await;
    assert_matches!(
        result,
        Err(RegistrationError::AssociatedEventDoesNotExist { event_id }) if event_id == missing
    );
    assert!(ctx.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_confirmation_email_is_sent_once() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    let registered = ctx
        .service
        .attempt_registration(individual_request(event.id, "ana@example.com"))
        .await
        .unwrap();

    let sent = ctx.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].registration_id, registered.registration.id());
    assert_eq!(sent[0].event_id, event.id);
    assert!(!sent[0].paid);
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_registration() {
    let ctx = TestContext::with_failing_notifier();
    let event = ctx.create_event(free_options()).await;

    let registered = ctx
        .service
        .attempt_registration(individual_request(event.id, "ana@example.com"))
        .await
        .expect("A failed email must not fail the registration");

    assert_eq!(ctx.event(event.id).await, registered.event);
    assert!(ctx.service.get_registration(event.id, "ana@example.com").await.is_ok());
}

#[tokio::test]
async fn test_event_version_increases_by_one_per_registration() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    let mut expected = event.version;
    for size in [0usize, 2, 0, 3] {
        let request = if size == 0 {
            individual_request(event.id, &unique_email())
        } else {
            team_request(event.id, &unique_email(), size)
        };
        let registered = ctx.service.attempt_registration(request).await.unwrap();
        expected += 1;
        assert_eq!(registered.event.version, expected);
    }

    let stored = ctx.event(event.id).await;
    assert_eq!(stored.version, expected);
    assert_eq!(stored.num_teams, 2);
    assert_eq!(stored.num_rostered_players, 5);
    assert_eq!(stored.num_total_players, 7);
}

#[tokio::test]
async fn test_list_registrations_pages_through_everything() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;
    let other = ctx.create_event(free_options()).await;

    let mut emails = Vec::new();
    for _ in 0..5 {
        let email = unique_email();
        ctx.service.attempt_registration(individual_request(event.id, &email)).await.unwrap();
        emails.push(email);
    }
    ctx.service
        .attempt_registration(individual_request(other.id, &unique_email()))
        .await
        .unwrap();

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = ctx
            .service
            .list_registrations(event.id, 2, cursor.as_deref())
            .await
            .expect("Listing should succeed");
        pages += 1;
        seen.extend(page.items.iter().map(|r| r.email().to_string()));
        if !page.has_more {
            assert!(page.next_cursor.is_none());
            break;
        }
        cursor = page.next_cursor;
    }

    assert_eq!(pages, 3);
    seen.sort();
    emails.sort();
    assert_eq!(seen, emails);
}

#[tokio::test]
async fn test_list_registrations_rejects_foreign_cursor() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;
    let other = ctx.create_event(free_options()).await;
    for _ in 0..3 {
        ctx.service.attempt_registration(individual_request(other.id, &unique_email())).await.unwrap();
    }

    let page = ctx.service.list_registrations(other.id, 1, None).await.unwrap();
    let cursor = page.next_cursor.expect("More registrations remain");

    let result = ctx.service.list_registrations(event.id, 1, Some(&cursor)).await;
    assert_matches!(result, Err(RegistrationError::InvalidCursor(_)));

    let result = ctx.service.list_registrations(event.id, 1, Some("not-a-cursor!")).await;
    assert_matches!(result, Err(RegistrationError::InvalidCursor(_)));
}

#[tokio::test]
async fn test_get_missing_registration() {
    let ctx = TestContext::new();
    let event = ctx.create_event(free_options()).await;

    let result = ctx.service.get_registration(event.id, "nobody@example.com").await;
    assert_matches!(result, Err(RegistrationError::RegistrationDoesNotExist { .. }));
}

#[tokio::test]
async fn test_slow_storage_times_out() {
    let engine = MemoryEngine::new();
    let fast = TestContext::with_engine(Arc::new(engine.clone()));
    let event = fast.create_event(free_options()).await;

    // Same items, but every call takes longer than the deadline
    let slow = TestContext::with_engine(Arc::new(
        engine
            .with_latency(Duration::from_millis(200))
            .with_deadline(Duration::from_millis(20)),
    ));

    let result = slow.service.attempt_registration(individual_request(event.id, "ana@example.com")).await;
    let error = result.expect_err("Slow storage should time out");
    assert_matches!(error, RegistrationError::Timeout(_));
    assert!(error.is_retryable());

    assert_eq!(fast.event(event.id).await.num_total_players, 0);
}

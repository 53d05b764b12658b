//! Pick coordinator state machine tests.

use std::sync::atomic::Ordering::SeqCst;

use cardpick::contacts::{ContactUri, LookupKey};
use cardpick::flow::{self, PickEvent, PickOutcome, PickRequest, PickSelection, PickState};
use cardpick::permission::PermissionState;
use tokio::sync::mpsc;

use crate::support::{make_failing_store_harness, make_harness};

fn launch(action: &str) -> PickEvent {
    PickEvent::Launch(PickRequest::new(action))
}

fn picked(raw: &str) -> PickEvent {
    PickEvent::PickResult(PickSelection::Picked(ContactUri::new(raw)))
}

// ── Launch gating ──

#[tokio::test]
async fn unrecognized_action_cancels_without_host_interaction() {
    let mut h = make_harness();

    let outcome = h.coordinator.handle(launch("open-thing")).await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert_eq!(h.coordinator.state(), PickState::Finished);
    assert_eq!(h.permissions.queries.load(SeqCst), 0);
    assert_eq!(h.picker.launches.load(SeqCst), 0);
    assert!(h.notifier.toasts().is_empty());
    assert!(h.notifier.rationales().is_empty());
}

#[tokio::test]
async fn granted_permission_skips_dialogs_and_launches_picker() {
    let mut h = make_harness();
    h.permissions.granted.store(true, SeqCst);
    // The rationale flag must be irrelevant once the permission is held.
    h.permissions.rationale.store(true, SeqCst);

    let outcome = h.coordinator.handle(launch("pick-content")).await;

    assert_eq!(outcome, None);
    assert_eq!(h.coordinator.state(), PickState::AwaitingSelection);
    assert_eq!(h.picker.launches.load(SeqCst), 1);
    assert_eq!(h.permissions.requests.load(SeqCst), 0);
    assert!(h.notifier.rationales().is_empty());
    assert_eq!(h.coordinator.permission(), PermissionState::Granted);
}

// ── Permission negotiation ──

#[tokio::test]
async fn denied_with_rationale_shows_dialog_before_requesting() {
    let mut h = make_harness();
    h.permissions.rationale.store(true, SeqCst);

    let outcome = h.coordinator.handle(launch("pick-content")).await;
    assert_eq!(outcome, None);
    assert_eq!(h.coordinator.state(), PickState::AwaitingRationale);
    assert_eq!(h.notifier.rationales(), vec![h.messages.rationale.clone()]);
    assert_eq!(h.permissions.requests.load(SeqCst), 0);

    let outcome = h
        .coordinator
        .handle(PickEvent::RationaleClosed { confirmed: true })
        .await;
    assert_eq!(outcome, None);
    assert_eq!(h.coordinator.state(), PickState::AwaitingPermission);
    assert_eq!(h.permissions.requests.load(SeqCst), 1);
    // One rationale per invocation, never a second.
    assert_eq!(h.notifier.rationales().len(), 1);
}

#[tokio::test]
async fn rationale_dismissal_cancels_silently() {
    let mut h = make_harness();
    h.permissions.rationale.store(true, SeqCst);
    h.coordinator.handle(launch("pick-content")).await;

    let outcome = h
        .coordinator
        .handle(PickEvent::RationaleClosed { confirmed: false })
        .await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert_eq!(h.coordinator.state(), PickState::Finished);
    assert_eq!(h.permissions.requests.load(SeqCst), 0);
    assert!(h.notifier.toasts().is_empty());
}

#[tokio::test]
async fn denied_without_rationale_requests_straight_away() {
    let mut h = make_harness();

    let outcome = h.coordinator.handle(launch("pick-content")).await;

    assert_eq!(outcome, None);
    assert_eq!(h.coordinator.state(), PickState::AwaitingPermission);
    assert!(h.notifier.rationales().is_empty());
    assert_eq!(h.permissions.requests.load(SeqCst), 1);
}

#[tokio::test]
async fn granted_verdict_moves_on_to_the_picker() {
    let mut h = make_harness();
    h.coordinator.handle(launch("pick-content")).await;

    h.permissions.granted.store(true, SeqCst);
    let outcome = h
        .coordinator
        .handle(PickEvent::PermissionResult { granted: true })
        .await;

    assert_eq!(outcome, None);
    assert_eq!(h.coordinator.state(), PickState::AwaitingSelection);
    assert_eq!(h.picker.launches.load(SeqCst), 1);
    assert_eq!(h.coordinator.permission(), PermissionState::Granted);
}

#[tokio::test]
async fn denial_verdict_cancels_with_one_notice() {
    let mut h = make_harness();
    h.permissions.rationale.store(true, SeqCst);
    h.coordinator.handle(launch("pick-content")).await;
    h.coordinator
        .handle(PickEvent::RationaleClosed { confirmed: true })
        .await;

    let outcome = h
        .coordinator
        .handle(PickEvent::PermissionResult { granted: false })
        .await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert_eq!(h.notifier.toasts(), vec![h.messages.permission_denied.clone()]);
    assert_eq!(h.picker.launches.load(SeqCst), 0);
    // Rationale still available, so the user may be asked again next time.
    assert_eq!(h.coordinator.permission(), PermissionState::Denied);
}

#[tokio::test]
async fn denial_with_prompts_suppressed_is_tracked() {
    let mut h = make_harness();
    h.coordinator.handle(launch("pick-content")).await;

    let outcome = h
        .coordinator
        .handle(PickEvent::PermissionResult { granted: false })
        .await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert_eq!(
        h.coordinator.permission(),
        PermissionState::DeniedDoNotAskAgain
    );
}

// ── Selection and mapping ──

#[tokio::test]
async fn picked_contact_maps_to_export_reference() {
    let mut h = make_harness();
    h.permissions.granted.store(true, SeqCst);
    let contact = ContactUri::new("content://contacts/people/1");
    h.store.insert(&contact, LookupKey::new("0r1-2A3B"));

    h.coordinator.handle(launch("pick-content")).await;
    let outcome = h
        .coordinator
        .handle(picked("content://contacts/people/1"))
        .await;

    match outcome {
        Some(PickOutcome::Picked(payload)) => {
            assert_eq!(payload.uri.as_str(), "content://contacts/as_vcard/0r1-2A3B");
            assert!(payload.grant_read);
        }
        other => panic!("expected a picked outcome, got {other:?}"),
    }
    assert!(h.notifier.toasts().is_empty());
    assert_eq!(h.coordinator.state(), PickState::Finished);
}

#[tokio::test]
async fn picker_cancellation_is_silent() {
    let mut h = make_harness();
    h.permissions.granted.store(true, SeqCst);
    h.coordinator.handle(launch("pick-content")).await;

    let outcome = h
        .coordinator
        .handle(PickEvent::PickResult(PickSelection::Cancelled))
        .await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert!(h.notifier.toasts().is_empty());
}

#[tokio::test]
async fn missing_row_cancels_with_processing_notice() {
    let mut h = make_harness();
    h.permissions.granted.store(true, SeqCst);
    h.coordinator.handle(launch("pick-content")).await;

    let outcome = h
        .coordinator
        .handle(picked("content://contacts/people/404"))
        .await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert_eq!(h.notifier.toasts(), vec![h.messages.processing_failed.clone()]);
}

#[tokio::test]
async fn malformed_reference_collapses_to_processing_notice() {
    let mut h = make_harness();
    h.permissions.granted.store(true, SeqCst);
    h.coordinator.handle(launch("pick-content")).await;

    let outcome = h.coordinator.handle(picked("not a uri")).await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert_eq!(h.notifier.toasts(), vec![h.messages.processing_failed.clone()]);
}

#[tokio::test]
async fn store_failure_collapses_to_processing_notice() {
    let mut h = make_failing_store_harness();
    h.permissions.granted.store(true, SeqCst);
    h.coordinator.handle(launch("pick-content")).await;

    let outcome = h
        .coordinator
        .handle(picked("content://contacts/people/1"))
        .await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert_eq!(h.notifier.toasts(), vec![h.messages.processing_failed.clone()]);
}

#[tokio::test]
async fn unavailable_picker_cancels_without_notice() {
    let mut h = make_harness();
    h.permissions.granted.store(true, SeqCst);
    h.picker.unavailable.store(true, SeqCst);

    let outcome = h.coordinator.handle(launch("pick-content")).await;

    assert_eq!(outcome, Some(PickOutcome::Cancelled));
    assert!(h.notifier.toasts().is_empty());
}

// ── Terminal discipline ──

#[tokio::test]
async fn finished_flow_ignores_further_events() {
    let mut h = make_harness();
    h.permissions.granted.store(true, SeqCst);
    let contact = ContactUri::new("content://contacts/people/1");
    h.store.insert(&contact, LookupKey::new("0r1-2A3B"));

    h.coordinator.handle(launch("pick-content")).await;
    let first = h
        .coordinator
        .handle(picked("content://contacts/people/1"))
        .await;
    assert!(matches!(first, Some(PickOutcome::Picked(_))));

    // Late duplicates and fresh launches must never produce a second
    // outcome.
    let dup = h
        .coordinator
        .handle(picked("content://contacts/people/1"))
        .await;
    assert_eq!(dup, None);
    let relaunch = h.coordinator.handle(launch("pick-content")).await;
    assert_eq!(relaunch, None);
    assert_eq!(h.coordinator.state(), PickState::Finished);
}

#[tokio::test]
async fn out_of_order_events_are_ignored() {
    let mut h = make_harness();

    let early_pick = h
        .coordinator
        .handle(picked("content://contacts/people/1"))
        .await;
    assert_eq!(early_pick, None);
    assert_eq!(h.coordinator.state(), PickState::Idle);

    h.permissions.granted.store(true, SeqCst);
    h.coordinator.handle(launch("pick-content")).await;
    let stray_verdict = h
        .coordinator
        .handle(PickEvent::PermissionResult { granted: false })
        .await;
    assert_eq!(stray_verdict, None);
    assert_eq!(h.coordinator.state(), PickState::AwaitingSelection);
}

// ── Driver ──

#[tokio::test]
async fn run_returns_the_outcome_from_queued_events() {
    let h = make_harness();
    h.permissions.granted.store(true, SeqCst);
    let contact = ContactUri::new("content://contacts/people/1");
    h.store.insert(&contact, LookupKey::new("0r1-2A3B"));

    let (tx, rx) = mpsc::channel(flow::EVENT_CHANNEL_CAPACITY);
    tx.send(launch("pick-content")).await.expect("send should work");
    tx.send(picked("content://contacts/people/1"))
        .await
        .expect("send should work");
    drop(tx);

    let outcome = flow::run(h.coordinator, rx).await;
    assert!(matches!(outcome, PickOutcome::Picked(_)));
}

#[tokio::test]
async fn run_cancels_when_the_channel_closes_early() {
    let h = make_harness();
    let (tx, rx) = mpsc::channel::<PickEvent>(flow::EVENT_CHANNEL_CAPACITY);
    drop(tx);

    let outcome = flow::run(h.coordinator, rx).await;
    assert_eq!(outcome, PickOutcome::Cancelled);
}

//! Full pick sessions over the wire, helper and host talking JSON lines.

use cardpick::bridge::{HostCommand, HostEvent, PermissionSnapshot, WireOutcome};
use cardpick::config::MessagesConfig;
use cardpick::flow::PickOutcome;
use cardpick::permission::CONTACT_PERMISSION;

use crate::support::start_default_session;

fn launch(granted: bool, rationale: bool) -> HostEvent {
    HostEvent::Launch {
        action: "pick-content".to_owned(),
        permission: PermissionSnapshot { granted, rationale },
    }
}

fn picked(contact: &str) -> HostEvent {
    HostEvent::PickResult {
        request_code: 1,
        outcome: WireOutcome::Picked,
        contact: Some(contact.to_owned()),
    }
}

#[tokio::test]
async fn granted_session_ends_with_a_card_reference() {
    let mut host = start_default_session();

    host.send(&launch(true, false)).await;
    assert_eq!(
        host.next_command().await,
        HostCommand::LaunchPicker { request_code: 1 }
    );

    host.send(&picked("content://contacts/people/1")).await;
    assert_eq!(
        host.next_command().await,
        HostCommand::QueryRow {
            contact: "content://contacts/people/1".to_owned()
        }
    );

    host.send(&HostEvent::Row {
        lookup_key: Some("0r1-2A3B".to_owned()),
        error: None,
    })
    .await;
    assert_eq!(
        host.next_command().await,
        HostCommand::Finish {
            outcome: WireOutcome::Picked,
            uri: Some("content://contacts/as_vcard/0r1-2A3B".to_owned()),
            grant_read: Some(true),
        }
    );

    assert!(matches!(host.outcome().await, PickOutcome::Picked(_)));
}

#[tokio::test]
async fn denied_permission_round_trip_toasts_and_cancels() {
    let mut host = start_default_session();
    let messages = MessagesConfig::default();

    host.send(&launch(false, false)).await;
    assert_eq!(
        host.next_command().await,
        HostCommand::RequestPermission {
            request_code: 2,
            permission: CONTACT_PERMISSION.to_owned(),
        }
    );

    host.send(&HostEvent::PermissionResult {
        request_code: 2,
        granted: false,
        permission: Some(PermissionSnapshot {
            granted: false,
            rationale: false,
        }),
    })
    .await;
    assert_eq!(
        host.next_command().await,
        HostCommand::Toast {
            message: messages.permission_denied.clone(),
        }
    );
    assert_eq!(
        host.next_command().await,
        HostCommand::Finish {
            outcome: WireOutcome::Cancelled,
            uri: None,
            grant_read: None,
        }
    );

    assert_eq!(host.outcome().await, PickOutcome::Cancelled);
}

#[tokio::test]
async fn rationale_round_trip_reaches_the_picker() {
    let mut host = start_default_session();
    let messages = MessagesConfig::default();

    host.send(&launch(false, true)).await;
    assert_eq!(
        host.next_command().await,
        HostCommand::ShowRationale {
            message: messages.rationale.clone(),
        }
    );

    host.send(&HostEvent::RationaleClosed { confirmed: true }).await;
    assert_eq!(
        host.next_command().await,
        HostCommand::RequestPermission {
            request_code: 2,
            permission: CONTACT_PERMISSION.to_owned(),
        }
    );

    host.send(&HostEvent::PermissionResult {
        request_code: 2,
        granted: true,
        permission: Some(PermissionSnapshot {
            granted: true,
            rationale: false,
        }),
    })
    .await;
    assert_eq!(
        host.next_command().await,
        HostCommand::LaunchPicker { request_code: 1 }
    );

    host.send(&HostEvent::PickResult {
        request_code: 1,
        outcome: WireOutcome::Cancelled,
        contact: None,
    })
    .await;
    assert_eq!(
        host.next_command().await,
        HostCommand::Finish {
            outcome: WireOutcome::Cancelled,
            uri: None,
            grant_read: None,
        }
    );

    assert_eq!(host.outcome().await, PickOutcome::Cancelled);
}

#[tokio::test]
async fn missing_row_toasts_processing_failure() {
    let mut host = start_default_session();
    let messages = MessagesConfig::default();

    host.send(&launch(true, false)).await;
    assert_eq!(
        host.next_command().await,
        HostCommand::LaunchPicker { request_code: 1 }
    );

    host.send(&picked("content://contacts/people/404")).await;
    assert_eq!(
        host.next_command().await,
        HostCommand::QueryRow {
            contact: "content://contacts/people/404".to_owned()
        }
    );

    host.send(&HostEvent::Row {
        lookup_key: None,
        error: None,
    })
    .await;
    assert_eq!(
        host.next_command().await,
        HostCommand::Toast {
            message: messages.processing_failed.clone(),
        }
    );
    assert_eq!(
        host.next_command().await,
        HostCommand::Finish {
            outcome: WireOutcome::Cancelled,
            uri: None,
            grant_read: None,
        }
    );

    assert_eq!(host.outcome().await, PickOutcome::Cancelled);
}

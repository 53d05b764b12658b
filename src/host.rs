//! Contracts the embedding host provides to the pick flow.
//!
//! The flow never touches the platform directly. Permission prompts, the
//! contact picker, the contact store, and user notices are all host
//! surfaces reached through the traits in this crate, and their
//! asynchronous results (rationale replies, permission verdicts, picker
//! selections) come back as events on the coordinator channel rather than
//! as return values. That keeps every trait call fire-and-forget and the
//! coordinator the only place where ordering matters.

use async_trait::async_trait;

/// Errors surfaced by host-provided services.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The requested surface does not exist on this host.
    #[error("host surface unavailable: {0}")]
    Unavailable(String),
    /// The host connection failed while issuing the call.
    #[error("host transport failed: {0}")]
    Transport(String),
}

/// User-notice surface: transient toasts and the one-time rationale dialog.
///
/// `show_rationale` only puts the dialog on screen. The user's choice comes
/// back later as a [`crate::flow::PickEvent::RationaleClosed`] event, so
/// the dialog needs no reference to the coordinator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a short-lived, non-blocking notice to the user.
    async fn toast(&self, message: &str) -> Result<(), HostError>;

    /// Show the permission rationale dialog with the given body text.
    async fn show_rationale(&self, message: &str) -> Result<(), HostError>;
}

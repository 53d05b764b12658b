//! State of the single contacts permission.
//!
//! Cardpick needs exactly one permission from the host: read access to
//! contacts. The coordinator tracks where the negotiation stands as a
//! [`PermissionState`]; the state only moves on the initial host query and
//! on the verdict of an issued request, never on guesses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::host::HostError;

/// Name of the one permission the helper ever requests.
pub const CONTACT_PERMISSION: &str = "contacts.read";

/// Where the contacts-permission negotiation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Not queried yet.
    Unknown,
    /// The host reports the permission as granted.
    Granted,
    /// Denied, but the host may still prompt the user again.
    Denied,
    /// Denied with further prompts suppressed; new requests auto-deny.
    DeniedDoNotAskAgain,
}

impl PermissionState {
    /// State after the initial host query.
    pub fn after_query(granted: bool) -> Self {
        if granted {
            Self::Granted
        } else {
            Self::Denied
        }
    }

    /// State after the host delivered a request verdict.
    ///
    /// A denial with no rationale left to show means the user or host
    /// policy suppressed further prompts.
    pub fn after_request(granted: bool, rationale_available: bool) -> Self {
        match (granted, rationale_available) {
            (true, _) => Self::Granted,
            (false, true) => Self::Denied,
            (false, false) => Self::DeniedDoNotAskAgain,
        }
    }

    /// Whether the permission is currently granted.
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Host permission subsystem for the contacts permission.
///
/// `request` only issues the host prompt. The verdict arrives later as a
/// [`crate::flow::PickEvent::PermissionResult`] event.
#[async_trait]
pub trait PermissionHost: Send + Sync {
    /// Whether the permission is currently granted.
    async fn is_granted(&self) -> Result<bool, HostError>;

    /// Whether the host wants a rationale shown before a (re-)request.
    async fn should_show_rationale(&self) -> Result<bool, HostError>;

    /// Ask the host to prompt the user for the permission.
    async fn request(&self) -> Result<(), HostError>;
}

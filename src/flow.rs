//! The pick flow: one request in, exactly one outcome out.
//!
//! The coordinator is a single-task state machine. The host feeds it
//! [`PickEvent`]s as they happen (the launch, the rationale reply, the
//! permission verdict, the picker selection) and it walks from [`PickState::Idle`]
//! through the awaiting states to [`PickState::Finished`], calling back
//! into the host contracts for side effects along the way. Every internal
//! failure class collapses into the same terminal
//! [`PickOutcome::Cancelled`]; the caller never sees a structured error,
//! only the user might see a notice.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MessagesConfig;
use crate::contacts::{ContactPicker, ContactStore, ContactUri};
use crate::host::Notifier;
use crate::permission::{PermissionHost, PermissionState};
use crate::vcard::{ExportBase, ResultPayload};

/// The single action tag cardpick answers.
pub const ACTION_PICK_CONTENT: &str = "pick-content";

/// Capacity of the coordinator event channel.
///
/// Events are rare (a handful per invocation), so a small buffer is
/// plenty. It only absorbs a short burst from a host that scripts its
/// replies; a host that outruns it waits until the flow catches up.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Requests, events, outcomes
// ---------------------------------------------------------------------------

/// Trigger for one pick invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRequest {
    /// Action tag supplied by the host. Only [`ACTION_PICK_CONTENT`] is
    /// recognized; anything else cancels immediately.
    pub action: String,
}

impl PickRequest {
    /// Request carrying the given action tag.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }

    /// Whether this is the recognized pick-content request.
    pub fn is_recognized(&self) -> bool {
        self.action == ACTION_PICK_CONTENT
    }
}

/// Kinds of asynchronous host requests the flow can have in flight.
///
/// The wire keys verdicts by numeric codes; in code the set is closed, so
/// an unknown code can never reach a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Waiting on the contact picker.
    ContactPick,
    /// Waiting on the permission verdict.
    Permission,
}

impl RequestKind {
    /// Numeric wire code for this request kind.
    pub fn code(self) -> u8 {
        match self {
            Self::ContactPick => 1,
            Self::Permission => 2,
        }
    }

    /// Resolve a wire code back to a request kind.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::ContactPick),
            2 => Some(Self::Permission),
            _ => None,
        }
    }
}

/// Outcome of the host picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickSelection {
    /// The user picked a contact.
    Picked(ContactUri),
    /// The user backed out of the picker.
    Cancelled,
}

/// Inbound events driving the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickEvent {
    /// The host launched the helper with a request.
    Launch(PickRequest),
    /// The rationale dialog was closed.
    RationaleClosed {
        /// `true` when the user confirmed, `false` when they dismissed it.
        confirmed: bool,
    },
    /// The host delivered the permission-request verdict.
    PermissionResult {
        /// Whether the permission was granted.
        granted: bool,
    },
    /// The host delivered the picker outcome.
    PickResult(PickSelection),
}

/// Terminal outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    /// A contact was picked and mapped; the payload goes to the caller.
    Picked(ResultPayload),
    /// Plain cancellation, whatever the internal reason.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// Internal failure classes.
///
/// All of them terminate the flow as [`PickOutcome::Cancelled`]; only a
/// denied permission and a processing failure notice the user first. The
/// finer distinctions survive in logs alone.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The launch action tag is not the recognized pick-content tag.
    #[error("unrecognized request action {0:?}")]
    UnrecognizedRequest(String),
    /// The host has no contact picker to delegate to.
    #[error("contact picker unavailable: {0}")]
    PickerUnavailable(String),
    /// The user or host denied the contacts permission.
    #[error("contacts permission denied")]
    PermissionDenied,
    /// The picked contact could not be mapped to an export reference.
    #[error("failed to process the picked contact: {0}")]
    ProcessingFailure(String),
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Resting states of the pick flow.
///
/// The permission check and the picker launch happen inside transitions;
/// the flow only rests while waiting on the host or after finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickState {
    /// Created; no launch seen yet.
    Idle,
    /// Rationale dialog is on screen; waiting for the user to close it.
    AwaitingRationale,
    /// Permission request issued; waiting for the verdict.
    AwaitingPermission,
    /// Picker launched; waiting for a selection.
    AwaitingSelection,
    /// Terminal outcome emitted; all further events are ignored.
    Finished,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Host services and texts the coordinator needs, bundled so constructor
/// signatures stay flat.
pub struct FlowServices {
    /// Contact store for lookup-key resolution.
    pub store: Arc<dyn ContactStore>,
    /// Host contact picker.
    pub picker: Arc<dyn ContactPicker>,
    /// Host permission subsystem.
    pub permissions: Arc<dyn PermissionHost>,
    /// User-notice surface.
    pub notices: Arc<dyn Notifier>,
    /// Export base for payload references.
    pub export_base: ExportBase,
    /// User-notice texts.
    pub messages: MessagesConfig,
}

/// Event-driven coordinator for one pick invocation.
pub struct PickCoordinator {
    services: FlowServices,
    state: PickState,
    permission: PermissionState,
}

impl PickCoordinator {
    /// Coordinator in the idle state.
    pub fn new(services: FlowServices) -> Self {
        Self {
            services,
            state: PickState::Idle,
            permission: PermissionState::Unknown,
        }
    }

    /// Current resting state.
    pub fn state(&self) -> PickState {
        self.state
    }

    /// Current permission negotiation state.
    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Feed one event into the flow.
    ///
    /// Returns the terminal outcome once the flow finishes, `None` while
    /// it is still in flight. Events that do not fit the current state are
    /// logged and ignored; in particular, a finished flow never emits a
    /// second outcome.
    pub async fn handle(&mut self, event: PickEvent) -> Option<PickOutcome> {
        match (self.state, event) {
            (PickState::Idle, PickEvent::Launch(request)) => self.on_launch(request).await,
            (PickState::AwaitingRationale, PickEvent::RationaleClosed { confirmed }) => {
                self.on_rationale_closed(confirmed).await
            }
            (PickState::AwaitingPermission, PickEvent::PermissionResult { granted }) => {
                self.on_permission_result(granted).await
            }
            (PickState::AwaitingSelection, PickEvent::PickResult(selection)) => {
                self.on_pick_result(selection).await
            }
            (state, event) => {
                warn!(?state, ?event, "event does not fit the current state, ignoring");
                None
            }
        }
    }

    async fn on_launch(&mut self, request: PickRequest) -> Option<PickOutcome> {
        if !request.is_recognized() {
            return self.fail(FlowError::UnrecognizedRequest(request.action)).await;
        }

        let granted = match self.services.permissions.is_granted().await {
            Ok(granted) => granted,
            Err(error) => {
                return self
                    .fail(FlowError::ProcessingFailure(error.to_string()))
                    .await
            }
        };
        self.permission = PermissionState::after_query(granted);

        if granted {
            info!("contacts permission already granted, launching picker");
            return self.launch_picker().await;
        }

        let wants_rationale = match self.services.permissions.should_show_rationale().await {
            Ok(wants) => wants,
            Err(error) => {
                return self
                    .fail(FlowError::ProcessingFailure(error.to_string()))
                    .await
            }
        };

        if wants_rationale {
            if let Err(error) = self
                .services
                .notices
                .show_rationale(&self.services.messages.rationale)
                .await
            {
                return self
                    .fail(FlowError::ProcessingFailure(error.to_string()))
                    .await;
            }
            info!("rationale dialog shown, waiting for the user");
            self.state = PickState::AwaitingRationale;
            None
        } else {
            self.request_permission().await
        }
    }

    async fn on_rationale_closed(&mut self, confirmed: bool) -> Option<PickOutcome> {
        if confirmed {
            info!("rationale confirmed, requesting the permission");
            self.request_permission().await
        } else {
            // Dismissal is the user walking away, not a denial verdict, so
            // no notice is shown.
            info!("rationale dismissed, abandoning the pick");
            Some(self.finish(PickOutcome::Cancelled))
        }
    }

    async fn on_permission_result(&mut self, granted: bool) -> Option<PickOutcome> {
        let rationale_available = if granted {
            false
        } else {
            // Only a denial needs the rationale refresh, to tell a plain
            // denial from a do-not-ask-again one.
            match self.services.permissions.should_show_rationale().await {
                Ok(available) => available,
                Err(error) => {
                    warn!(error = %error, "could not refresh rationale availability");
                    false
                }
            }
        };
        self.permission = PermissionState::after_request(granted, rationale_available);

        if granted {
            info!("contacts permission granted, launching picker");
            self.launch_picker().await
        } else {
            info!(permission = ?self.permission, "contacts permission denied");
            self.fail(FlowError::PermissionDenied).await
        }
    }

    async fn on_pick_result(&mut self, selection: PickSelection) -> Option<PickOutcome> {
        match selection {
            PickSelection::Cancelled => {
                info!("picker cancelled by the user");
                Some(self.finish(PickOutcome::Cancelled))
            }
            PickSelection::Picked(contact) => match self.map_selection(&contact).await {
                Ok(payload) => {
                    info!(uri = %payload.uri, "picked contact mapped to export reference");
                    Some(self.finish(PickOutcome::Picked(payload)))
                }
                Err(error) => self.fail(error).await,
            },
        }
    }

    async fn request_permission(&mut self) -> Option<PickOutcome> {
        if let Err(error) = self.services.permissions.request().await {
            return self
                .fail(FlowError::ProcessingFailure(error.to_string()))
                .await;
        }
        debug!(code = RequestKind::Permission.code(), "permission request issued");
        self.state = PickState::AwaitingPermission;
        None
    }

    async fn launch_picker(&mut self) -> Option<PickOutcome> {
        if let Err(error) = self.services.picker.launch().await {
            return self
                .fail(FlowError::PickerUnavailable(error.to_string()))
                .await;
        }
        debug!(code = RequestKind::ContactPick.code(), "contact picker launched");
        self.state = PickState::AwaitingSelection;
        None
    }

    /// Resolve the picked contact to a result payload.
    ///
    /// A missing row, a malformed reference, and a store failure all
    /// collapse into one processing failure; the split survives in logs
    /// only.
    async fn map_selection(&self, contact: &ContactUri) -> Result<ResultPayload, FlowError> {
        if contact.as_str().is_empty() {
            return Err(FlowError::ProcessingFailure(
                "picked contact carried no reference".to_owned(),
            ));
        }
        let key = self
            .services
            .store
            .lookup_key(contact)
            .await
            .map_err(|error| FlowError::ProcessingFailure(error.to_string()))?
            .ok_or_else(|| {
                FlowError::ProcessingFailure(format!("no contact row for {contact}"))
            })?;
        debug!(key = %key, "lookup key resolved");
        Ok(ResultPayload::for_key(&self.services.export_base, &key))
    }

    /// Terminate with a cancellation, noticing the user per failure class.
    async fn fail(&mut self, error: FlowError) -> Option<PickOutcome> {
        warn!(error = %error, "pick flow failed");
        let notice = match &error {
            FlowError::PermissionDenied => {
                Some(self.services.messages.permission_denied.clone())
            }
            FlowError::ProcessingFailure(_) => {
                Some(self.services.messages.processing_failed.clone())
            }
            FlowError::UnrecognizedRequest(_) | FlowError::PickerUnavailable(_) => None,
        };
        if let Some(message) = notice {
            // Best effort. A failed toast cannot change the outcome.
            if let Err(error) = self.services.notices.toast(&message).await {
                warn!(error = %error, "failed to show failure notice");
            }
        }
        Some(self.finish(PickOutcome::Cancelled))
    }

    /// Record the terminal state and hand out the one outcome.
    fn finish(&mut self, outcome: PickOutcome) -> PickOutcome {
        self.state = PickState::Finished;
        outcome
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Drive a coordinator from an event channel until the terminal outcome.
///
/// A channel closed before any outcome means the host hung up; that
/// degrades to a clean cancellation rather than an error.
pub async fn run(
    mut coordinator: PickCoordinator,
    mut events: mpsc::Receiver<PickEvent>,
) -> PickOutcome {
    while let Some(event) = events.recv().await {
        debug!(?event, "pick event received");
        if let Some(outcome) = coordinator.handle(event).await {
            return outcome;
        }
    }
    warn!("event channel closed before a terminal outcome, cancelling");
    PickOutcome::Cancelled
}

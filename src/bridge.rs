//! Stdio bridge: a host drives one pick session over JSON lines.
//!
//! [`serve`] owns the process stdio. Host events arrive one JSON object
//! per line on stdin, helper commands leave one per line on stdout, and
//! stderr stays free for logs. The bridge translates between the wire and
//! the coordinator's domain types and implements the four host contracts
//! by emitting commands, so the flow itself never knows a wire exists.
//!
//! The session ends with exactly one `finish` command. Even a host that
//! hangs up mid-flight gets one on the way out.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::contacts::{ContactPicker, ContactStore, ContactUri, LookupKey, StoreError};
use crate::flow::{
    self, FlowServices, PickCoordinator, PickEvent, PickOutcome, PickRequest, PickSelection,
    RequestKind,
};
use crate::host::{HostError, Notifier};
use crate::permission::{PermissionHost, CONTACT_PERMISSION};

/// Capacity of the outbound command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Host permission snapshot, carried on launch and refreshed on verdicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    /// Whether the contacts permission is currently granted.
    #[serde(default)]
    pub granted: bool,
    /// Whether the host wants a rationale shown before a (re-)request.
    #[serde(default)]
    pub rationale: bool,
}

/// Picker and session outcome on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOutcome {
    /// A contact was picked / a payload was produced.
    Picked,
    /// The pick was abandoned.
    Cancelled,
}

/// Events the host sends to the helper, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// Initial invocation of the helper.
    Launch {
        /// Action tag of the request.
        action: String,
        /// Host permission snapshot at launch time.
        #[serde(default)]
        permission: PermissionSnapshot,
    },
    /// The rationale dialog was closed.
    RationaleClosed {
        /// Whether the user confirmed.
        confirmed: bool,
    },
    /// Verdict for an issued permission request.
    PermissionResult {
        /// Code of the request this verdict answers.
        request_code: u8,
        /// Whether the permission was granted.
        granted: bool,
        /// Refreshed snapshot, when the host provides one.
        #[serde(default)]
        permission: Option<PermissionSnapshot>,
    },
    /// Outcome of a launched picker.
    PickResult {
        /// Code of the request this outcome answers.
        request_code: u8,
        /// Whether the user picked or backed out.
        outcome: WireOutcome,
        /// The picked contact reference, present on a real pick.
        #[serde(default)]
        contact: Option<String>,
    },
    /// Reply to a row query.
    Row {
        /// The lookup key, or `null` when no row matched.
        #[serde(default)]
        lookup_key: Option<String>,
        /// Store-side failure, when the query could not be answered.
        #[serde(default)]
        error: Option<String>,
    },
}

/// Commands the helper sends to the host, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// Prompt the user for the contacts permission.
    RequestPermission {
        /// Code the verdict must carry back.
        request_code: u8,
        /// Name of the requested permission.
        permission: String,
    },
    /// Show the rationale dialog.
    ShowRationale {
        /// Dialog body text.
        message: String,
    },
    /// Open the contact picker.
    LaunchPicker {
        /// Code the picker outcome must carry back.
        request_code: u8,
    },
    /// Resolve the first matching row for a picked contact.
    QueryRow {
        /// The contact reference to resolve.
        contact: String,
    },
    /// Show a short-lived notice.
    Toast {
        /// Notice text.
        message: String,
    },
    /// Terminal outcome; exactly one per session.
    Finish {
        /// Whether the session produced a payload.
        outcome: WireOutcome,
        /// vCard export reference, on a picked outcome.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
        /// Read grant for the reference, on a picked outcome.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        grant_read: Option<bool>,
    },
}

// ---------------------------------------------------------------------------
// Shared bridge state
// ---------------------------------------------------------------------------

type RowReply = Result<Option<LookupKey>, StoreError>;

/// Row-query slot. A host replaying a canned transcript can answer the
/// row query before the flow even issues it, so an early reply is parked
/// rather than dropped. Once the event stream ends the slot closes: no
/// reply can arrive any more, so a query opened after that point must
/// fail instead of waiting.
enum RowSlot {
    /// No query and no reply outstanding.
    Idle,
    /// A query is in flight, waiting on the host.
    Waiting(oneshot::Sender<RowReply>),
    /// The host answered before the query was issued.
    Ready(RowReply),
    /// The event stream is gone; nothing will ever answer.
    Closed,
}

/// Outcome of opening a row query against the slot.
enum RowQuery {
    /// The answer was already parked.
    Ready(RowReply),
    /// Waiting on the host to answer.
    Waiting(oneshot::Receiver<RowReply>),
}

/// State shared between the host trait impls and the reader task: the
/// outbound command channel, the latest permission snapshot, and the
/// row-query slot.
struct BridgeShared {
    commands: mpsc::Sender<HostCommand>,
    permission: Mutex<PermissionSnapshot>,
    row: Mutex<RowSlot>,
}

impl BridgeShared {
    fn new(commands: mpsc::Sender<HostCommand>) -> Self {
        Self {
            commands,
            permission: Mutex::new(PermissionSnapshot::default()),
            row: Mutex::new(RowSlot::Idle),
        }
    }

    fn snapshot(&self) -> Result<PermissionSnapshot, HostError> {
        self.permission
            .lock()
            .map(|snapshot| *snapshot)
            .map_err(|_| HostError::Transport("permission snapshot lock poisoned".to_owned()))
    }

    fn store_snapshot(&self, snapshot: PermissionSnapshot) {
        if let Ok(mut slot) = self.permission.lock() {
            *slot = snapshot;
        }
    }

    /// Fold a verdict into the snapshot. Without a full refresh only the
    /// granted flag is known to have changed.
    fn store_verdict(&self, granted: bool, refreshed: Option<PermissionSnapshot>) {
        if let Ok(mut slot) = self.permission.lock() {
            match refreshed {
                Some(snapshot) => *slot = snapshot,
                None => slot.granted = granted,
            }
        }
    }

    /// Open a row query: either take a parked reply or install a waiter.
    fn begin_row_query(&self) -> Result<RowQuery, StoreError> {
        let mut slot = self
            .row
            .lock()
            .map_err(|_| StoreError::Unavailable("row slot poisoned".to_owned()))?;
        match std::mem::replace(&mut *slot, RowSlot::Idle) {
            RowSlot::Ready(reply) => Ok(RowQuery::Ready(reply)),
            RowSlot::Idle => {
                let (reply_tx, reply_rx) = oneshot::channel();
                *slot = RowSlot::Waiting(reply_tx);
                Ok(RowQuery::Waiting(reply_rx))
            }
            RowSlot::Waiting(waiter) => {
                *slot = RowSlot::Waiting(waiter);
                Err(StoreError::Unavailable(
                    "a row query is already in flight".to_owned(),
                ))
            }
            RowSlot::Closed => {
                *slot = RowSlot::Closed;
                Err(StoreError::Unavailable(
                    "host closed the event stream before the row query".to_owned(),
                ))
            }
        }
    }

    /// Hand a host reply to the waiting query, or park it for the query
    /// still to come.
    fn deliver_row(&self, reply: RowReply) {
        if let Ok(mut slot) = self.row.lock() {
            match std::mem::replace(&mut *slot, RowSlot::Idle) {
                RowSlot::Waiting(waiter) => {
                    let _ = waiter.send(reply);
                }
                RowSlot::Idle => {
                    debug!("row reply arrived before the query, parking it");
                    *slot = RowSlot::Ready(reply);
                }
                RowSlot::Ready(_) => {
                    warn!("multiple row replies, keeping the newest");
                    *slot = RowSlot::Ready(reply);
                }
                RowSlot::Closed => {
                    debug!("row reply after the event stream closed, dropping it");
                    *slot = RowSlot::Closed;
                }
            }
        }
    }

    /// Close the slot when the host goes away: fail a waiting query so the
    /// flow awaiting it can still finish, and make sure a query opened
    /// after this point fails instead of waiting forever. A parked reply
    /// stays consumable.
    fn fail_pending(&self, reason: &str) {
        if let Ok(mut slot) = self.row.lock() {
            match std::mem::replace(&mut *slot, RowSlot::Closed) {
                RowSlot::Waiting(waiter) => {
                    let _ = waiter.send(Err(StoreError::Unavailable(reason.to_owned())));
                }
                RowSlot::Ready(reply) => {
                    *slot = RowSlot::Ready(reply);
                }
                RowSlot::Idle | RowSlot::Closed => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Host contract impls
// ---------------------------------------------------------------------------

/// The wire-backed implementation of all four host contracts.
#[derive(Clone)]
struct BridgeHost {
    shared: Arc<BridgeShared>,
}

impl BridgeHost {
    async fn send(&self, command: HostCommand) -> Result<(), HostError> {
        self.shared
            .commands
            .send(command)
            .await
            .map_err(|_| HostError::Transport("host command channel closed".to_owned()))
    }
}

#[async_trait::async_trait]
impl PermissionHost for BridgeHost {
    async fn is_granted(&self) -> Result<bool, HostError> {
        Ok(self.shared.snapshot()?.granted)
    }

    async fn should_show_rationale(&self) -> Result<bool, HostError> {
        Ok(self.shared.snapshot()?.rationale)
    }

    async fn request(&self) -> Result<(), HostError> {
        self.send(HostCommand::RequestPermission {
            request_code: RequestKind::Permission.code(),
            permission: CONTACT_PERMISSION.to_owned(),
        })
        .await
    }
}

#[async_trait::async_trait]
impl ContactPicker for BridgeHost {
    async fn launch(&self) -> Result<(), HostError> {
        self.send(HostCommand::LaunchPicker {
            request_code: RequestKind::ContactPick.code(),
        })
        .await
    }
}

#[async_trait::async_trait]
impl Notifier for BridgeHost {
    async fn toast(&self, message: &str) -> Result<(), HostError> {
        self.send(HostCommand::Toast {
            message: message.to_owned(),
        })
        .await
    }

    async fn show_rationale(&self, message: &str) -> Result<(), HostError> {
        self.send(HostCommand::ShowRationale {
            message: message.to_owned(),
        })
        .await
    }
}

#[async_trait::async_trait]
impl ContactStore for BridgeHost {
    async fn lookup_key(&self, contact: &ContactUri) -> Result<Option<LookupKey>, StoreError> {
        let query = self.shared.begin_row_query()?;
        let command = HostCommand::QueryRow {
            contact: contact.as_str().to_owned(),
        };
        // The query command goes out even when the answer was parked, so
        // the host transcript always shows one query per pick.
        if self.shared.commands.send(command).await.is_err() {
            self.shared.fail_pending("host command channel closed");
        }
        match query {
            RowQuery::Ready(reply) => reply,
            // No timeout here: store latency belongs to the host, and the
            // reader fails this query if the host hangs up instead.
            RowQuery::Waiting(reply_rx) => match reply_rx.await {
                Ok(reply) => reply,
                Err(_) => Err(StoreError::Unavailable(
                    "host disconnected before answering the row query".to_owned(),
                )),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Wire translation
// ---------------------------------------------------------------------------

/// Translate one wire event into coordinator input.
///
/// Snapshot refreshes and row replies are absorbed here and yield no
/// event. A verdict or picker outcome carrying a request code the flow
/// never issued is dropped whole.
fn translate(shared: &BridgeShared, event: HostEvent) -> Option<PickEvent> {
    match event {
        HostEvent::Launch { action, permission } => {
            shared.store_snapshot(permission);
            Some(PickEvent::Launch(PickRequest::new(action)))
        }
        HostEvent::RationaleClosed { confirmed } => {
            Some(PickEvent::RationaleClosed { confirmed })
        }
        HostEvent::PermissionResult {
            request_code,
            granted,
            permission,
        } => {
            if RequestKind::from_code(request_code) != Some(RequestKind::Permission) {
                warn!(request_code, "permission verdict with a foreign request code, dropping");
                return None;
            }
            shared.store_verdict(granted, permission);
            Some(PickEvent::PermissionResult { granted })
        }
        HostEvent::PickResult {
            request_code,
            outcome,
            contact,
        } => {
            if RequestKind::from_code(request_code) != Some(RequestKind::ContactPick) {
                warn!(request_code, "pick result with a foreign request code, dropping");
                return None;
            }
            let selection = match outcome {
                WireOutcome::Cancelled => PickSelection::Cancelled,
                // A picked outcome without a reference still reaches the
                // flow, which fails it like any other unusable selection.
                WireOutcome::Picked => {
                    PickSelection::Picked(ContactUri::new(contact.unwrap_or_default()))
                }
            };
            Some(PickEvent::PickResult(selection))
        }
        HostEvent::Row { lookup_key, error } => {
            let reply = match error {
                Some(message) => Err(StoreError::Unavailable(message)),
                None => Ok(lookup_key.map(LookupKey::new)),
            };
            shared.deliver_row(reply);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Reader / writer tasks
// ---------------------------------------------------------------------------

async fn read_events<R>(reader: R, shared: Arc<BridgeShared>, events: mpsc::Sender<PickEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<HostEvent>(trimmed) {
                    Ok(event) => {
                        debug!(?event, "host event received");
                        if let Some(pick_event) = translate(&shared, event) {
                            if events.send(pick_event).await.is_err() {
                                debug!("coordinator finished, stopping the event reader");
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, line = trimmed, "unparseable host line, skipping");
                    }
                }
            }
            Ok(None) => {
                info!("host closed the event stream");
                shared.fail_pending("host closed the event stream");
                return;
            }
            Err(error) => {
                warn!(error = %error, "failed to read host events");
                shared.fail_pending("host event stream failed");
                return;
            }
        }
    }
}

async fn write_commands<W>(mut commands: mpsc::Receiver<HostCommand>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        let mut line = match serde_json::to_string(&command) {
            Ok(line) => line,
            Err(error) => {
                warn!(error = %error, "failed to encode host command");
                continue;
            }
        };
        line.push('\n');
        if let Err(error) = writer.write_all(line.as_bytes()).await {
            warn!(error = %error, "failed to write host command");
            return;
        }
        if let Err(error) = writer.flush().await {
            warn!(error = %error, "failed to flush host command");
            return;
        }
    }
}

/// Resolve on Ctrl-C. When no interrupt handler can be installed the
/// future never resolves, which only means the session cannot be
/// interrupted that way.
async fn wait_for_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => (),
        Err(error) => {
            warn!(error = %error, "interrupt handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Session entry points
// ---------------------------------------------------------------------------

/// Run one pick session over arbitrary byte streams.
///
/// This is the engine behind [`serve`]; tests drive it with in-memory
/// duplex streams instead of stdio. The returned outcome has already been
/// reported to the host as a `finish` command.
///
/// # Errors
///
/// Returns an error when the configured export base cannot form
/// references. Wire-level trouble never errors: it degrades to a
/// cancelled session instead.
pub async fn serve_session<R, W>(config: &Config, reader: R, writer: W) -> anyhow::Result<PickOutcome>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let export_base = config
        .export_base()
        .context("configured export base is unusable")?;
    let invocation = Uuid::new_v4();
    let session_span = tracing::info_span!("session", invocation = %invocation);

    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(flow::EVENT_CHANNEL_CAPACITY);

    let shared = Arc::new(BridgeShared::new(command_tx.clone()));
    let host = BridgeHost {
        shared: Arc::clone(&shared),
    };
    let services = FlowServices {
        store: Arc::new(host.clone()),
        picker: Arc::new(host.clone()),
        permissions: Arc::new(host.clone()),
        notices: Arc::new(host),
        export_base,
        messages: config.messages.clone(),
    };
    let coordinator = PickCoordinator::new(services);

    let reader_task =
        tokio::spawn(read_events(reader, shared, event_tx).instrument(session_span.clone()));
    let writer_task =
        tokio::spawn(write_commands(command_rx, writer).instrument(session_span.clone()));

    info!(parent: &session_span, "pick session started");

    let outcome = tokio::select! {
        outcome = flow::run(coordinator, event_rx).instrument(session_span.clone()) => outcome,
        () = wait_for_interrupt() => {
            info!(parent: &session_span, "interrupt received, cancelling the pick");
            PickOutcome::Cancelled
        }
    };

    let finish = match &outcome {
        PickOutcome::Picked(payload) => HostCommand::Finish {
            outcome: WireOutcome::Picked,
            uri: Some(payload.uri.to_string()),
            grant_read: Some(payload.grant_read),
        },
        PickOutcome::Cancelled => HostCommand::Finish {
            outcome: WireOutcome::Cancelled,
            uri: None,
            grant_read: None,
        },
    };
    if command_tx.send(finish).await.is_err() {
        warn!(parent: &session_span, "command writer gone before the finish command");
    }
    drop(command_tx);

    // The reader holds the last command sender through the shared state;
    // stopping it lets the writer drain its queue and exit.
    reader_task.abort();
    let _ = reader_task.await;
    if let Err(error) = writer_task.await {
        warn!(parent: &session_span, error = %error, "command writer task failed");
    }

    let label = match &outcome {
        PickOutcome::Picked(_) => "picked",
        PickOutcome::Cancelled => "cancelled",
    };
    info!(parent: &session_span, outcome = label, "pick session finished");
    Ok(outcome)
}

/// Run one pick session over the process stdio.
///
/// # Errors
///
/// Returns an error when the configured export base cannot form
/// references.
pub async fn serve(config: &Config) -> anyhow::Result<PickOutcome> {
    serve_session(config, tokio::io::stdin(), tokio::io::stdout()).await
}

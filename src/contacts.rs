//! Contact references, lookup keys, and the host store/picker contracts.
//!
//! The picker hands back an opaque [`ContactUri`]; the store resolves it to
//! the stable [`LookupKey`] the export reference is built from. Both types
//! are plain newtypes so the flow can carry them around without knowing
//! anything about the host's addressing scheme.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::host::HostError;

/// Opaque reference to a contact, as produced by the host picker.
///
/// Only the host's contact store can interpret it; the flow never parses
/// it, it only passes it back for the row query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactUri(String);

impl ContactUri {
    /// Wrap a raw contact reference.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw reference text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier for a contact row.
///
/// Lookup keys survive host-internal row id churn, so an export reference
/// built from one stays valid after the store reorganizes itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupKey(String);

impl LookupKey {
    /// Wrap a raw lookup key.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contact-store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The reference cannot address a row in this store.
    #[error("malformed contact reference: {0}")]
    MalformedReference(String),
    /// The store could not be reached or failed mid-query.
    #[error("contact store unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the host's contact store.
///
/// The query contract is zero or one row: implementations consult only the
/// first row matching the reference and ignore the rest. The flow awaits
/// the query inline with no timeout; store latency is the host's problem.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Resolve the stable lookup key for a picked contact.
    ///
    /// Returns `Ok(None)` when no row matches the reference.
    async fn lookup_key(&self, contact: &ContactUri) -> Result<Option<LookupKey>, StoreError>;
}

/// Host contact picker.
///
/// `launch` opens the host's picker UI. The selection, or the user's
/// cancellation, arrives later as a
/// [`crate::flow::PickEvent::PickResult`] event. A launch error means no
/// picker exists on this host.
#[async_trait]
pub trait ContactPicker: Send + Sync {
    /// Open the host picker.
    async fn launch(&self) -> Result<(), HostError>;
}

/// In-memory [`ContactStore`] for tests and embedders with a preloaded
/// contact snapshot.
///
/// Rows are keyed by the exact reference text. Inserting twice under one
/// reference keeps both rows and lookups return the first, mirroring the
/// first-matching-row contract of a real store cursor.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    rows: Mutex<HashMap<String, Vec<LookupKey>>>,
}

impl MemoryContactStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row for a contact reference.
    pub fn insert(&self, contact: &ContactUri, key: LookupKey) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.entry(contact.as_str().to_owned()).or_default().push(key);
        }
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn lookup_key(&self, contact: &ContactUri) -> Result<Option<LookupKey>, StoreError> {
        // A reference that does not even parse as a URL cannot address a
        // row, matching how a real store rejects it before querying.
        if Url::parse(contact.as_str()).is_err() {
            return Err(StoreError::MalformedReference(contact.as_str().to_owned()));
        }
        let rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_owned()))?;
        Ok(rows.get(contact.as_str()).and_then(|keys| keys.first()).cloned())
    }
}

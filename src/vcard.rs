//! vCard export references.
//!
//! A successful pick hands the caller a URI under the host's card-export
//! root with the contact's lookup key appended as one path segment, plus a
//! read grant so the caller can dereference it without holding the
//! contacts permission itself.

use std::fmt;

use url::Url;

use crate::contacts::LookupKey;

/// Well-known card export root used when no base is configured.
pub const DEFAULT_EXPORT_BASE: &str = "content://contacts/as_vcard";

/// Errors constructing export references.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The configured base is not a usable URL.
    #[error("invalid export base {base:?}: {reason}")]
    InvalidBase {
        /// The rejected base text.
        base: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Validated base URI for card export references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBase(Url);

impl ExportBase {
    /// Parse and validate an export base.
    ///
    /// The base must be an absolute URL able to carry path segments, so
    /// appending a lookup key always yields a well-formed reference.
    pub fn parse(raw: &str) -> Result<Self, ExportError> {
        let url = Url::parse(raw).map_err(|error| ExportError::InvalidBase {
            base: raw.to_owned(),
            reason: error.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ExportError::InvalidBase {
                base: raw.to_owned(),
                reason: "cannot carry path segments".to_owned(),
            });
        }
        Ok(Self(url))
    }

    /// The validated base URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Export reference for one lookup key: the base with the key appended
    /// as a single path segment, percent-encoded as needed.
    pub fn reference_for(&self, key: &LookupKey) -> Url {
        let mut url = self.0.clone();
        // parse() rejected cannot-be-a-base URLs, so segments are there.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(key.as_str());
        }
        url
    }
}

impl fmt::Display for ExportBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Terminal success value handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPayload {
    /// vCard export reference for the picked contact.
    pub uri: Url,
    /// Read grant allowing the caller to dereference `uri` without holding
    /// the contacts permission itself.
    pub grant_read: bool,
}

impl ResultPayload {
    /// Payload for a resolved lookup key. The read grant is always
    /// attached; a payload without it would be useless to the caller.
    pub fn for_key(base: &ExportBase, key: &LookupKey) -> Self {
        Self {
            uri: base.reference_for(key),
            grant_read: true,
        }
    }
}

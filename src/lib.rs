//! Cardpick — a contact-card pick helper.
//!
//! A host runtime invokes cardpick when some caller asks for contact-card
//! content. The helper negotiates the contacts permission with the host,
//! hands selection to the host's own picker, and maps the picked contact to
//! a vCard export reference the caller can read. One invocation, one
//! terminal outcome: a payload or a plain cancellation.
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod host;
pub mod logging;

pub mod contacts;
pub mod flow;
pub mod permission;
pub mod vcard;

pub mod bridge;

pub mod about;

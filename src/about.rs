//! About, usage, and feedback surfaces for the CLI.
//!
//! Plain text only. The binary has no screens; these strings are what a
//! curious user gets when they run it by hand instead of through a host.

use url::Url;

use crate::config::FeedbackConfig;

/// Display name of the helper.
pub const APP_NAME: &str = "cardpick";

/// Author line for the about blurb.
pub const AUTHOR: &str = "the cardpick authors";

/// Label hosts are expected to show the user for this helper.
pub const PICKER_TITLE: &str = "Pick contact";

/// About blurb: name, version, author.
pub fn about_text() -> String {
    format!(
        "{APP_NAME} {version}\nA contact-card pick helper, by {AUTHOR}.",
        version = env!("CARGO_PKG_VERSION")
    )
}

/// Usage notes for running outside a host.
pub fn usage_text() -> String {
    format!(
        "{APP_NAME} has no screens of its own. A host runtime starts it when an\n\
         app asks for contact-card content, and the host's contact picker\n\
         (shown to the user as \"{PICKER_TITLE}\") does the actual choosing.\n\
         \n\
         Hosts drive a session with `{APP_NAME} serve`: events in on stdin,\n\
         commands out on stdout, one JSON object per line, logs on stderr.\n\
         The session always ends with a single finish command carrying either\n\
         a card reference or a cancellation."
    )
}

/// Prefilled `mailto:` link for the feedback composer.
///
/// # Errors
///
/// Returns an error when the configured recipient cannot form a mailto
/// URL.
pub fn feedback_mailto(feedback: &FeedbackConfig) -> anyhow::Result<Url> {
    if feedback.to.trim().is_empty() {
        anyhow::bail!("feedback recipient is empty");
    }
    let mut url = Url::parse(&format!("mailto:{}", feedback.to))
        .map_err(|e| anyhow::anyhow!("invalid feedback recipient {:?}: {e}", feedback.to))?;
    url.query_pairs_mut()
        .append_pair("subject", &feedback.subject)
        .append_pair("body", &feedback.body);
    // Pair encoding writes spaces as '+', which mail composers take
    // literally; mailto wants %20.
    if let Some(query) = url.query().map(|q| q.replace('+', "%20")) {
        url.set_query(Some(&query));
    }
    Ok(url)
}

//! Configuration loading and validation.
//!
//! Everything here is optional: with no file at all the defaults produce a
//! working helper. A config file only overrides the host-facing strings,
//! the card-export base, the user-notice texts, and the feedback composer
//! fields.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::vcard::{ExportBase, ExportError, DEFAULT_EXPORT_BASE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Card export settings.
    #[serde(default)]
    pub export: ExportConfig,

    /// User-notice texts.
    #[serde(default)]
    pub messages: MessagesConfig,

    /// Feedback composer fields.
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

impl Config {
    /// Validated export base for building result references.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured base is not a usable URL.
    pub fn export_base(&self) -> Result<ExportBase, ExportError> {
        ExportBase::parse(&self.export.base)
    }
}

/// Card export settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Base URI that export references are built under.
    #[serde(default = "default_export_base")]
    pub base: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base: default_export_base(),
        }
    }
}

/// User-notice texts.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesConfig {
    /// Rationale dialog body shown before re-requesting the permission.
    #[serde(default = "default_rationale")]
    pub rationale: String,

    /// Toast shown when the permission request is denied.
    #[serde(default = "default_permission_denied")]
    pub permission_denied: String,

    /// Toast shown when the picked contact cannot be processed.
    #[serde(default = "default_processing_failed")]
    pub processing_failed: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            rationale: default_rationale(),
            permission_denied: default_permission_denied(),
            processing_failed: default_processing_failed(),
        }
    }
}

/// Feedback composer fields.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    /// Recipient address.
    #[serde(default = "default_feedback_to")]
    pub to: String,

    /// Subject line.
    #[serde(default = "default_feedback_subject")]
    pub subject: String,

    /// Prefilled body.
    #[serde(default = "default_feedback_body")]
    pub body: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            to: default_feedback_to(),
            subject: default_feedback_subject(),
            body: default_feedback_body(),
        }
    }
}

// Default value functions for serde

fn default_export_base() -> String {
    DEFAULT_EXPORT_BASE.to_owned()
}
fn default_rationale() -> String {
    "Cardpick hands a contact card to the app that asked for one. \
     To read that card it needs access to your contacts."
        .to_owned()
}
fn default_permission_denied() -> String {
    "Can't pick a contact without access to contacts".to_owned()
}
fn default_processing_failed() -> String {
    "Couldn't attach the selected contact".to_owned()
}
fn default_feedback_to() -> String {
    "cardpick@example.org".to_owned()
}
fn default_feedback_subject() -> String {
    "cardpick feedback".to_owned()
}
fn default_feedback_body() -> String {
    "Found a problem or have an idea? Describe it here.".to_owned()
}

/// Load the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the
/// configured export base cannot form references.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    config.export_base()?;
    Ok(config)
}

/// Load the config from an explicit path, or fall back to the default
/// location, or to built-in defaults when no file exists there.
///
/// An explicit path must exist; a missing default file is not an error.
///
/// # Errors
///
/// Returns an error if an existing file cannot be read or parsed, or if
/// the home directory cannot be determined.
pub fn load_config_or_default(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(explicit) => load_config(explicit),
        None => {
            let fallback = config_dir()?.join("config.toml");
            if fallback.exists() {
                load_config(&fallback)
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// Resolve the default config directory (`~/.cardpick/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".cardpick"))
}

/// Resolve the default logs directory (`~/.cardpick/logs/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_logs_dir() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("logs"))
}

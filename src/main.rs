#![allow(missing_docs)]

//! Cardpick binary.
//!
//! `serve` runs one pick session over stdio for a host runtime; `about`
//! and `feedback` are the small human-facing surfaces for people who run
//! the helper by hand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use cardpick::flow::PickOutcome;
use cardpick::{about, bridge, config, logging};

#[derive(Parser)]
#[command(name = "cardpick", version, about = "Contact-card pick helper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve one pick session over stdin/stdout
    Serve {
        /// Config file path (default: ~/.cardpick/config.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for rotated JSON logs (default: ~/.cardpick/logs)
        #[arg(long)]
        logs_dir: Option<PathBuf>,
    },
    /// Print version, author, and usage notes
    About,
    /// Print a prefilled feedback mailto link
    Feedback {
        /// Config file path (default: ~/.cardpick/config.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, logs_dir } => serve(config, logs_dir).await,
        Command::About => {
            logging::init_cli();
            println!("{}", about::about_text());
            println!();
            println!("{}", about::usage_text());
            Ok(())
        }
        Command::Feedback { config } => {
            logging::init_cli();
            let config = config::load_config_or_default(config.as_deref())?;
            let mailto = about::feedback_mailto(&config.feedback)?;
            println!("{mailto}");
            Ok(())
        }
    }
}

/// Load config, set up file logging, and hand stdio to the bridge.
async fn serve(config_path: Option<PathBuf>, logs_dir: Option<PathBuf>) -> Result<()> {
    let config = config::load_config_or_default(config_path.as_deref())?;
    let logs_dir = match logs_dir {
        Some(dir) => dir,
        None => config::default_logs_dir()?,
    };
    let _logging = logging::init_session(&logs_dir).context("failed to initialise logging")?;

    match bridge::serve(&config).await? {
        PickOutcome::Picked(payload) => info!(uri = %payload.uri, "served a contact card"),
        PickOutcome::Cancelled => info!("served a cancellation"),
    }
    Ok(())
}

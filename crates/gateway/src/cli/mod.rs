pub mod chat;
pub mod config;
pub mod roast;
pub mod sessions;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// chatrelay: stream character replies and keep conversation sessions.
#[derive(Debug, Parser)]
#[command(name = "chatrelay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one message to a character, stream the reply and save the turn.
    Chat {
        /// The user's message.
        message: String,
        /// User id owning the conversation.
        #[arg(long)]
        user: String,
        /// Character id to talk to.
        #[arg(long)]
        character: String,
        /// Append to this session instead of the most recent one.
        #[arg(long)]
        session: Option<String>,
        /// Model override.
        #[arg(long)]
        model: Option<String>,
        /// Provider id from config.toml.
        #[arg(long)]
        provider: Option<String>,
        /// JSON file holding prior messages (`[{"role":..,"content":..}]`).
        #[arg(long)]
        history: Option<PathBuf>,
        /// Give up on the upstream after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print the turn's events as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Stream a one-off completion without touching any session.
    Roast {
        /// The message to send.
        message: String,
        /// Model override.
        #[arg(long)]
        model: Option<String>,
        /// Provider id from config.toml.
        #[arg(long)]
        provider: Option<String>,
    },
    /// List stored sessions for a user and character, newest first.
    Sessions {
        #[arg(long)]
        user: String,
        #[arg(long)]
        character: String,
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the config from `CHATRELAY_CONFIG` (default `config.toml`).  A
/// missing file yields the defaults.
pub fn load_config() -> anyhow::Result<(cr_domain::config::Config, String)> {
    let config_path =
        std::env::var("CHATRELAY_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        cr_domain::config::Config::default()
    };

    Ok((config, config_path))
}

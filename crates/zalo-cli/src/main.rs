//! zalo: command-line client for the Zalo web chat API.
//!
//! Imports and inspects a browser session, sends messages, and runs a small
//! listening bot on top of the zalo-client poll loop.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// zalo: Zalo web chat client
#[derive(Parser)]
#[command(name = "zalo", version, about = "Zalo web chat client: session import, sending, and a listening bot")]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the saved session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show the profile of the logged-in account
    Whoami,

    /// Send a text message
    Send {
        /// User or group id
        thread: String,
        /// Message text
        text: String,
        /// Treat the thread as a group
        #[arg(short, long)]
        group: bool,
        /// Mark the message as `important` or `urgent`
        #[arg(long)]
        urgency: Option<String>,
    },

    /// Poll for messages and answer `/info` and `/ping`
    Listen {
        /// Command prefix (overrides config)
        #[arg(long)]
        prefix: Option<String>,
        /// Seconds between fetches (overrides config)
        #[arg(long)]
        interval: Option<u64>,
        /// Acknowledge every message as delivered
        #[arg(long)]
        ack: bool,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Import browser cookies and the codec secret
    Import {
        /// JSON file holding the cookie jar as an object
        cookies: PathBuf,
        /// Codec secret key, base64
        #[arg(long)]
        secret: String,
        /// Device id (overrides config)
        #[arg(long)]
        imei: Option<String>,
        /// User agent the cookies were issued to (overrides config)
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Show the saved session without secrets
    Show,

    /// Delete the saved session
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("zalo=debug,zalo_cli=debug,zalo_client=debug,zalo_core=debug")
            .with_target(true)
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("zalo=info,zalo_client=info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    // Load config file.
    let config_path = cli.config.clone().unwrap_or_else(config::default_path);
    let cfg = match config::Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("zalo: {e:#}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Session { action } => match action {
            SessionAction::Import {
                cookies,
                secret,
                imei,
                user_agent,
            } => commands::session::run_import(&cfg, &cookies, &secret, imei, user_agent),
            SessionAction::Show => commands::session::run_show(&cfg),
            SessionAction::Clear => commands::session::run_clear(&cfg),
        },
        Command::Whoami => commands::whoami::run(&cfg).await,
        Command::Send {
            thread,
            text,
            group,
            urgency,
        } => commands::send::run(&cfg, &thread, &text, group, urgency.as_deref()).await,
        Command::Listen {
            prefix,
            interval,
            ack,
        } => {
            let mut cfg = cfg;
            if let Some(prefix) = prefix {
                cfg.listen.prefix = prefix;
            }
            if let Some(interval) = interval {
                cfg.listen.interval_secs = interval;
            }
            commands::listen::run(&cfg, ack).await
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("zalo: {e:#}");
        std::process::exit(1);
    }
}

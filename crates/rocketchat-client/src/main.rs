//! Rocket.Chat realtime client: entry point.
//!
//! Connects to a Rocket.Chat server over its realtime (DDP) WebSocket API,
//! optionally logs in with a resume token, runs one command, prints the
//! result, and exits.
//!
//! # Usage
//!
//! ```text
//! rocketchat-client [OPTIONS] <COMMAND>
//!
//! Commands:
//!   channels                      List public channels
//!   users <TEXT>...               Search the user directory
//!   history <TARGET> [--room-id]  Show the latest messages of a room
//!
//! Options:
//!   --url <URL>             WebSocket endpoint (wss://host/websocket)
//!   --token <TOKEN>         Resume / personal access token
//!   --config <PATH>         TOML configuration file
//!   --call-timeout <SECS>   Fail calls pending longer than this
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Description            |
//! |---------------------|------------------------|
//! | `ROCKETCHAT_URL`    | Same as `--url`        |
//! | `ROCKETCHAT_TOKEN`  | Same as `--token`      |
//! | `RUST_LOG`          | `tracing` filter       |
//!
//! CLI args take precedence over the environment, which takes precedence over
//! the configuration file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rocketchat_client::application::calls::login_with_token;
use rocketchat_client::application::commands::{execute, Command, CommandOptions};
use rocketchat_client::application::{CallFailure, ServerHandle};
use rocketchat_client::infrastructure::{ClientConfig, Connection, StdoutSink, TimeoutPolicy};
use rocketchat_core::LoginResult;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Rocket.Chat realtime API client.
#[derive(Debug, Parser)]
#[command(
    name = "rocketchat-client",
    about = "Run one command against a Rocket.Chat server over its realtime API",
    version
)]
struct Cli {
    /// WebSocket endpoint of the server, e.g. `wss://open.rocket.chat/websocket`.
    #[arg(long, env = "ROCKETCHAT_URL")]
    url: Option<String>,

    /// Resume or personal access token used to log in before the command.
    #[arg(long, env = "ROCKETCHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Fail calls still pending after this many seconds (0 disables).
    #[arg(long)]
    call_timeout: Option<u64>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// List public channels.
    Channels {
        /// Maximum number of channels to list.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Search the user directory.
    Users {
        /// Search text; several words are joined with spaces.
        #[arg(required = true)]
        text: Vec<String>,
        /// Maximum number of users to list.
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show the latest messages of a room, oldest first.
    History {
        /// Window name to print into; also the room id unless `--room-id` is given.
        target: String,
        /// Room id to load, when it differs from the target.
        #[arg(long)]
        room_id: Option<String>,
        /// Number of messages to show.
        #[arg(long)]
        limit: Option<u32>,
    },
}

/// Everything `main` needs after merging the CLI with the config file.
#[derive(Debug, PartialEq)]
struct Settings {
    url: String,
    token: Option<String>,
    policy: Option<TimeoutPolicy>,
    options: CommandOptions,
    command: Command,
}

impl Cli {
    /// Merges the parsed arguments over `file`.
    ///
    /// # Errors
    ///
    /// Returns an error if no server URL is configured anywhere.
    fn into_settings(self, file: ClientConfig) -> anyhow::Result<Settings> {
        let Some(url) = self.url.or(file.server.url) else {
            bail!("no server URL: pass --url, set ROCKETCHAT_URL, or set [server] url in the config file");
        };

        let mut session = file.session;
        if let Some(secs) = self.call_timeout {
            session.call_timeout_secs = Some(secs);
        }
        let policy = session.call_timeout().map(|call_timeout| TimeoutPolicy {
            call_timeout,
            sweep_interval: session.sweep_interval(),
        });

        let mut options = CommandOptions::from(&file.commands);
        let command = match self.command {
            CliCommand::Channels { limit } => {
                options.browse_limit = limit.unwrap_or(options.browse_limit);
                Command::Channels
            }
            CliCommand::Users { text, limit } => {
                options.browse_limit = limit.unwrap_or(options.browse_limit);
                Command::Users { text: text.join(" ") }
            }
            CliCommand::History {
                target,
                room_id,
                limit,
            } => {
                options.history_limit = limit.unwrap_or(options.history_limit);
                Command::History { target, room_id }
            }
        };

        Ok(Settings {
            url,
            token: self.token.or(file.server.token),
            policy,
            options,
            command,
        })
    }
}

// ── Login ─────────────────────────────────────────────────────────────────────

/// Logs in and waits for the answer.
async fn login(server: &ServerHandle, token: &str) -> anyhow::Result<()> {
    let (tx, rx) = oneshot::channel::<Result<LoginResult, CallFailure>>();
    login_with_token(
        server,
        token,
        move |_server: &ServerHandle, result: Result<LoginResult, CallFailure>| {
            let _ = tx.send(result);
            Ok(())
        },
    )
    .context("failed to send login")?;

    match rx.await.context("login callback dropped")? {
        Ok(login) => {
            info!(user_id = %login.id, "authenticated");
            Ok(())
        }
        Err(failure) => bail!("login failed: {failure}"),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed with `clap`, and the config file (if any) is read.
/// 2. `tracing_subscriber` is initialised from `RUST_LOG`, falling back to the
///    config's `log_level`.
/// 3. The WebSocket is opened and the DDP handshake sent.
/// 4. With a token, `login` is awaited before anything else.
/// 5. The command runs; the process waits for its completion (or Ctrl+C),
///    then closes the connection.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file_config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // The default level is `warn` so command output is not buried in logs.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&file_config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = cli.into_settings(file_config)?;
    info!(url = %settings.url, command = ?settings.command, "starting");

    let connection = Connection::open(&settings.url, settings.policy).await?;

    if let Some(token) = &settings.token {
        if let Err(e) = login(connection.handle(), token).await {
            connection.close().await;
            return Err(e);
        }
    }

    let finished = match execute(
        &settings.command,
        connection.handle(),
        Arc::new(StdoutSink),
        &settings.options,
    ) {
        Ok(finished) => finished,
        Err(e) => {
            connection.close().await;
            return Err(e).context("failed to issue command");
        }
    };

    tokio::select! {
        _ = finished => {}
        _ = tokio::signal::ctrl_c() => info!("received Ctrl+C; closing"),
    }

    connection.close().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

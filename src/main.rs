//! Console Notify CLI
//!
//! Command-line interface for the notification client:
//! - Listen for notifications
//! - Send a message over the socket
//! - Manage the stored token
//! - Generate a config file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console_notify::badge::UnreadBadge;
use console_notify::client::{callback, ConnectionManager, ConnectionStatus, Event, EventKind};
use console_notify::config::{generate_default_config, Config, LoggingConfig};
use console_notify::protocol::Envelope;
use console_notify::token::TokenStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "console-notify")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time notification client for the admin console")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Notification service URL, overriding the config
    #[arg(long, global = true)]
    pub url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect and print events until interrupted
    Listen {
        /// Print only unread-count changes
        #[arg(long)]
        badge: bool,
    },

    /// Send one message once the connection is ready
    Send {
        /// Message type
        kind: String,
        /// JSON payload
        #[arg(default_value = "{}")]
        data: String,
        /// Seconds to wait for the connection
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Manage the stored token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum TokenAction {
    /// Store a token
    Set { token: String },
    /// Remove the stored token
    Clear,
    /// Show where the token lives and whether one is stored
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = cli.url {
        config.endpoint.url = url;
    }

    init_logging(&config.logging);

    match cli.command {
        Commands::Listen { badge } => listen(&config, badge).await?,

        Commands::Send {
            kind,
            data,
            timeout,
        } => {
            let data: serde_json::Value =
                serde_json::from_str(&data).context("payload is not valid JSON")?;
            send(&config, Envelope::new(kind, data), Duration::from_secs(timeout)).await?;
        }

        Commands::Token { action } => {
            let store = config.token.store();
            match action {
                TokenAction::Set { token } => {
                    store.store(&token)?;
                    println!("Token stored in {:?}", store.path());
                }
                TokenAction::Clear => {
                    store.clear()?;
                    println!("Token removed from {:?}", store.path());
                }
                TokenAction::Show => match store.token() {
                    Some(token) => println!("{:?}: {}", store.path(), mask(&token)),
                    None => println!("{:?}: no token", store.path()),
                },
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &content)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("console_notify={}", logging.level))
    });
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries events; logs go to stderr
    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn manager_for(config: &Config) -> ConnectionManager {
    let tokens: Arc<dyn TokenStore> = Arc::new(config.token.store());
    ConnectionManager::websocket(config.client_config(), tokens)
}

async fn listen(config: &Config, badge_only: bool) -> anyhow::Result<()> {
    let manager = manager_for(config);
    tracing::info!(endpoint = %config.endpoint.url, "Listening for notifications");

    let mut badge = UnreadBadge::attach(&manager);

    if !badge_only {
        manager.on(
            EventKind::Open,
            callback(|_| println!("{}", serde_json::json!({"event": "open"}))),
        );
        manager.on(
            EventKind::Close,
            callback(|event| {
                if let Event::Close(info) = event {
                    println!(
                        "{}",
                        serde_json::json!({
                            "event": "close",
                            "code": info.code,
                            "reason": info.reason,
                        })
                    );
                }
            }),
        );
        manager.on(
            EventKind::Error,
            callback(|event| {
                if let Event::Error(e) = event {
                    println!("{}", serde_json::json!({"event": "error", "error": e.to_string()}));
                }
            }),
        );
        manager.on(
            EventKind::AuthTimeout,
            callback(|_| println!("{}", serde_json::json!({"event": "auth_timeout"}))),
        );
        manager.on(
            EventKind::Message,
            callback(|event| {
                if let Event::Message(envelope) = event {
                    match serde_json::to_string(envelope) {
                        Ok(line) => println!("{}", line),
                        Err(e) => tracing::warn!(error = %e, "Unprintable message"),
                    }
                }
            }),
        );
    }

    manager.connect();

    loop {
        tokio::select! {
            state = badge.changed() => {
                if badge_only {
                    println!("{}", state.count);
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    manager.shutdown();
    Ok(())
}

async fn send(config: &Config, envelope: Envelope, timeout: Duration) -> anyhow::Result<()> {
    let manager = manager_for(config);
    let authenticate = config.token.store().token().is_some();

    manager.connect();
    wait_until_ready(&manager, authenticate, timeout).await?;

    manager.send(&envelope);
    tracing::info!(kind = %envelope.kind, "Message sent");

    // Let the driver flush the frame before closing
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.shutdown();
    Ok(())
}

/// Wait for an open connection, and with a token for the identified
/// connection that follows the authentication response
///
/// Returns without holding a borrow of the state channel, so the driver can
/// keep publishing.
async fn wait_until_ready(
    manager: &ConnectionManager,
    authenticate: bool,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut state = manager.watch_state();
    let ready = tokio::time::timeout(
        timeout,
        state.wait_for(|s| {
            s.connection == ConnectionStatus::Open && (!authenticate || s.is_authenticated)
        }),
    )
    .await
    .map(|waited| waited.map(|_| ()));

    match ready {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => bail!("connection manager stopped"),
        Err(_) => bail!("connection not ready after {:?}", timeout),
    }
}

/// Show only the ends of a token
fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

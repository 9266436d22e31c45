//! # revgate
//!
//! Command-line entry point for the Review Gate toolchain.
//!
//! ## Usage
//!
//! ```bash
//! # Write a default config file
//! revgate init
//!
//! # Serve the editor tool protocol on stdin/stdout
//! revgate serve
//!
//! # Open a review popup from the terminal
//! revgate ask --message "Does the new layout look right?"
//!
//! # Disable usage-based pricing on the dashboard
//! revgate limit disable
//!
//! # Rewrite embedded session cookies after a session rotation
//! revgate cookie update --from-file cookie.txt
//!
//! # Send a work report to Telegram
//! revgate notify --task "refactor parser" --status completed
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use revgate_bridge::Bridge;
use revgate_core::config::{RevgateConfig, DEFAULT_CONFIG_FILE};
use revgate_core::TriggerData;
use revgate_dashboard::{update_files, LimitClient};
use revgate_notify::{send_report, TelegramClient, WorkReport};
use revgate_server::Server;

#[derive(Parser)]
#[command(name = "revgate")]
#[command(author, version, about = "Interactive review bridge between agents and the editor")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,

    /// Serve the editor tool protocol on stdin/stdout
    Serve,

    /// Open a review popup and print the user's answer
    Ask {
        /// Prompt shown in the popup
        #[arg(short, long, default_value = "Please provide your review or feedback:")]
        message: String,

        /// Popup window title
        #[arg(long, default_value = "Review Gate")]
        title: String,

        /// Summary of what was just completed
        #[arg(long)]
        context: Option<String>,

        /// Ask the editor to focus the popup immediately
        #[arg(short, long)]
        urgent: bool,

        /// Seconds to wait for an answer
        #[arg(short, long, default_value_t = 300)]
        timeout: u64,
    },

    /// Manage the usage-based pricing limit on the dashboard
    Limit {
        #[command(subcommand)]
        command: LimitCommands,
    },

    /// Manage session cookies embedded in configured files
    Cookie {
        #[command(subcommand)]
        command: CookieCommands,
    },

    /// Send a work report to the notification channel
    Notify {
        /// What was worked on
        #[arg(short, long)]
        task: String,

        /// Outcome status (completed, failed, warning, ...)
        #[arg(short, long, default_value = "completed")]
        status: String,

        /// Free-form details appended to the report
        #[arg(short, long)]
        details: Option<String>,

        /// Project directory the report refers to
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Screenshot to attach
        #[arg(long)]
        photo: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LimitCommands {
    /// Disable usage-based pricing and verify the change stuck
    Disable,
    /// Show the current limit state
    Status,
}

#[derive(Subcommand)]
enum CookieCommands {
    /// Rewrite the embedded cookie literal in the configured files
    Update {
        /// New cookie value
        value: Option<String>,

        /// Read the new cookie value from a file instead
        #[arg(long)]
        from_file: Option<PathBuf>,

        /// Files to rewrite, overriding the configured list
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let config = RevgateConfig::load_or_default(&cli.config)?;

    match &cli.command {
        Commands::Serve => init_server_logging(level, &config)?,
        _ => init_terminal_logging(level)?,
    }

    match cli.command {
        Commands::Init => cmd_init(&cli.config),
        Commands::Serve => cmd_serve(config).await,
        Commands::Ask {
            message,
            title,
            context,
            urgent,
            timeout,
        } => cmd_ask(config, message, title, context, urgent, timeout).await,
        Commands::Limit { command } => cmd_limit(config, command).await,
        Commands::Cookie { command } => cmd_cookie(config, command).await,
        Commands::Notify {
            task,
            status,
            details,
            project,
            photo,
        } => cmd_notify(config, task, status, details, project, photo).await,
    }
}

/// Plain stderr logging for terminal commands.
fn init_terminal_logging(level: Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Serve logging. stdout carries protocol frames, so log lines go to
/// stderr and to a log file next to the protocol records.
fn init_server_logging(level: Level, config: &RevgateConfig) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let paths = config.bridge.record_paths();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_file())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .try_init()?;
    Ok(())
}

fn cmd_init(path: &Path) -> Result<()> {
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    RevgateConfig::write_default(path)?;
    println!("Wrote default config to {}", path.display());
    println!("Fill in the dashboard and telegram credentials before using those commands.");
    Ok(())
}

async fn cmd_serve(config: RevgateConfig) -> Result<()> {
    let server = Server::new(config.bridge);
    let token = server.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            token.cancel();
        }
    });
    server.run().await?;
    Ok(())
}

async fn cmd_ask(
    config: RevgateConfig,
    message: String,
    title: String,
    context: Option<String>,
    urgent: bool,
    timeout: u64,
) -> Result<()> {
    let bridge = Bridge::new(config.bridge);
    let mut data = TriggerData::new("review_gate_chat")
        .with_message(message)
        .with_title(title)
        .with_urgent(urgent);
    if let Some(context) = context {
        data = data.with_context(context);
    }

    let outcome = bridge.request(data, Duration::from_secs(timeout)).await?;
    match outcome.answer() {
        Some(reply) => {
            println!("{}", reply.text);
            if !reply.attachments.is_empty() {
                eprintln!("({} attachment(s) not shown)", reply.attachments.len());
            }
            Ok(())
        }
        None => bail!("no response within {} seconds", timeout),
    }
}

async fn cmd_limit(config: RevgateConfig, command: LimitCommands) -> Result<()> {
    let client = LimitClient::new(&config.dashboard)?;
    match command {
        LimitCommands::Disable => {
            let outcome = client.disable_usage_based().await?;
            if outcome.succeeded() {
                println!("Usage-based pricing is now disabled.");
                Ok(())
            } else {
                bail!("the dashboard did not confirm the change");
            }
        }
        LimitCommands::Status => {
            let state = client.get_hard_limit().await?;
            let flag = match state.no_usage_based_allowed {
                Some(true) => "disabled",
                Some(false) => "enabled",
                None => "unknown",
            };
            println!("Usage-based pricing: {}", flag);
            if let Some(limit) = state.hard_limit {
                println!("Hard limit: {}", limit);
            }
            if let Some(limit) = state.hard_limit_per_user {
                println!("Hard limit per user: {}", limit);
            }
            Ok(())
        }
    }
}

async fn cmd_cookie(config: RevgateConfig, command: CookieCommands) -> Result<()> {
    match command {
        CookieCommands::Update {
            value,
            from_file,
            files,
        } => {
            let cookie = match (value, from_file) {
                (Some(value), None) => value,
                (None, Some(path)) => std::fs::read_to_string(&path)?.trim().to_string(),
                (Some(_), Some(_)) => {
                    bail!("pass the cookie either inline or with --from-file, not both")
                }
                (None, None) => bail!("pass the new cookie value inline or with --from-file"),
            };
            let files = if files.is_empty() {
                config.cookie.files.clone()
            } else {
                files
            };
            if files.is_empty() {
                bail!("no files given and none configured under [cookie] in the config");
            }

            let summary = update_files(&files, &cookie).await;
            for (path, outcome) in &summary.outcomes {
                println!("{}: {}", path.display(), outcome);
            }
            println!(
                "{}/{} files updated",
                summary.updated(),
                summary.outcomes.len()
            );
            if summary.all_updated() {
                Ok(())
            } else {
                bail!("some files were not updated")
            }
        }
    }
}

async fn cmd_notify(
    config: RevgateConfig,
    task: String,
    status: String,
    details: Option<String>,
    project: PathBuf,
    photo: Option<PathBuf>,
) -> Result<()> {
    let client = TelegramClient::connect(&config.telegram).await?;
    let project_dir = project.canonicalize().unwrap_or(project);
    let report = WorkReport {
        task,
        status,
        details,
        project_dir,
    };
    send_report(&client, &report, photo.as_deref()).await?;
    println!("Report sent.");
    Ok(())
}

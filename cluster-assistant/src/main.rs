use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cluster_assistant::config::Settings;
use cluster_assistant::database::Sender;
use cluster_assistant::formatter::render_table;
use cluster_assistant::ChatService;
use cluster_assistant_sdk::{log_info, log_stage, log_warning, ChatReply, ChatRequest};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Conversational assistant for OpenShift cluster provisioning
///
/// Classifies a request, reads node data from a Google Sheet, allocates
/// addresses from a subnet and registers DNS records.
#[derive(Parser, Debug)]
#[command(name = "cluster-assistant")]
#[command(version)]
struct Cli {
    /// YAML settings file; environment variables override it
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite database for chat history and operations
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Do not read or write the database
    #[arg(long, global = true)]
    no_persist: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one message and print the reply
    Chat {
        message: String,

        /// Print the full reply as JSON
        #[arg(long)]
        json: bool,

        /// Print the progress trail before the reply
        #[arg(long)]
        progress: bool,
    },

    /// Interactive session on stdin
    Repl {
        /// Print the progress trail before each reply
        #[arg(long)]
        progress: bool,
    },

    /// Show recent chat messages, oldest first
    History {
        #[arg(long, default_value_t = 100)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show recent infrastructure operations, newest first
    Operations {
        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show configuration and collaborator status
    Health,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "cluster_assistant=debug"
    } else {
        "cluster_assistant=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_reply(reply: &ChatReply, progress: bool) {
    if progress {
        for entry in reply.progress_trail.iter().flatten() {
            log_stage!(entry);
        }
        println!();
    }

    println!("{}", reply.message);
    if let Some(table) = reply.table.as_deref().filter(|rows| !rows.is_empty()) {
        println!("\n{}", render_table(table));
    }
}

async fn repl(service: &ChatService, progress: bool) -> Result<()> {
    log_info!("Type a request, or 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\x1b[1m> \x1b[0m");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let reply = service.handle(ChatRequest::new(line)).await;
        print_reply(&reply, progress);
        println!();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(path) = cli.database.clone() {
        settings.database_path = Some(path);
    }

    let service = ChatService::from_settings(&settings, !cli.no_persist)?;

    match cli.command {
        Command::Chat {
            message,
            json,
            progress,
        } => {
            let reply = service.handle(ChatRequest::new(message)).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            } else {
                print_reply(&reply, progress);
            }
        }

        Command::Repl { progress } => repl(&service, progress).await?,

        Command::History { limit, json } => {
            if cli.no_persist {
                log_warning!("History is unavailable with --no-persist");
                return Ok(());
            }
            let messages = service.history(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                for message in &messages {
                    let who = match message.sender {
                        Sender::User => "\x1b[36myou\x1b[0m",
                        Sender::Assistant => "\x1b[32massistant\x1b[0m",
                    };
                    println!(
                        "[{}] {}: {}",
                        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        who,
                        message.message
                    );
                }
            }
        }

        Command::Operations { limit, json } => {
            if cli.no_persist {
                log_warning!("Operations are unavailable with --no-persist");
                return Ok(());
            }
            let operations = service.operations(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&operations)?);
            } else if operations.is_empty() {
                log_info!("No operations recorded yet");
            } else {
                for op in &operations {
                    println!(
                        "{}  {:<18} {:<8} {}",
                        op.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        op.intent.as_str(),
                        format!("{:?}", op.status).to_lowercase(),
                        op.user_input
                    );
                }
            }
        }

        Command::Health => {
            let report = service.health(&settings).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

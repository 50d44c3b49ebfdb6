//! Chat Tracker CLI entry point

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chat_tracker::config::{self, Config};
use chat_tracker::display::{format_count, TerminalDisplay};
use chat_tracker::host::StaticHost;
use chat_tracker::intercept::{inspect_response, HttpResponse};
use chat_tracker::storage::{FileStore, KeyValueStore, TokenLimit};
use chat_tracker::tokens::{collect_candidates, extract_token_count, parse_token_count};
use chat_tracker::tracker::RefreshTrigger;
use chat_tracker::{ui, Provenance, TokenEstimate, Tracker};

#[derive(Parser)]
#[command(name = "chat-tracker")]
#[command(about = "Token accounting and message statistics for chat transcripts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Show or set the token limit
    Limit {
        /// New limit (0 to 128000)
        value: Option<String>,
    },

    /// Parse a token count label such as "12.3k"
    Parse {
        text: String,
    },

    /// Find the token count reported in a response body
    Scan {
        /// JSON file holding a response body
        file: PathBuf,

        /// Show every candidate, not just the winner
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show message statistics and the token readout for a chat file
    Stats {
        /// Chat file (JSON array or JSON lines)
        chat: PathBuf,

        /// Response body to take the token count from
        #[arg(short, long)]
        response: Option<PathBuf>,
    },

    /// Show or edit the current summary of a chat file
    Summary {
        chat: PathBuf,

        /// Replace the summary text and save the chat
        #[arg(long)]
        set: Option<String>,
    },

    /// Show configuration and stored preferences
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let path = config::config_path();
            if path.exists() {
                ui::print_warning(&format!("Config already exists at {}", path.display()));
            } else {
                config::save(&Config::default())?;
                ui::print_success(&format!("Config written to {}", path.display()));
            }
        }

        Commands::Limit { value } => {
            let config = config::load_or_default()?;
            let store = FileStore::new(&config.storage_path);
            match value {
                Some(value) => match TokenLimit::parse(&value) {
                    Ok(limit) => {
                        limit.save(&store)?;
                        ui::print_success(&format!("Token limit set to {}", format_count(u64::from(limit.get()))));
                    }
                    Err(e) => {
                        ui::print_error(&e.to_string());
                        std::process::exit(1);
                    }
                },
                None => {
                    let limit = TokenLimit::load(&store);
                    println!("{}", limit.get());
                }
            }
        }

        Commands::Parse { text } => match parse_token_count(&text) {
            Some(tokens) => println!("{}", tokens),
            None => {
                ui::print_error(&format!("No token count in {:?}", text));
                std::process::exit(1);
            }
        },

        Commands::Scan { file, verbose } => {
            let payload: serde_json::Value = serde_json::from_str(&read(&file)?)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;

            if verbose {
                for candidate in collect_candidates(&payload) {
                    ui::print_step(&format!("{} (rank {})", candidate.tokens, candidate.rank));
                }
            }
            match extract_token_count(&payload) {
                Some(tokens) => println!("{}", tokens),
                None => ui::print_warning("No token count found"),
            }
        }

        Commands::Stats { chat, response } => {
            run_stats(&chat, response.as_deref()).await?;
        }

        Commands::Summary { chat, set } => {
            run_summary(&chat, set.as_deref())?;
        }

        Commands::Status => {
            let config = match config::load() {
                Ok(config) => config,
                Err(_) => {
                    ui::print_warning("No config file, using defaults (run 'chat-tracker init')");
                    Config::default()
                }
            };
            let store = FileStore::new(&config.storage_path);

            ui::print_header("Status");
            println!("Config: {}", config::config_path().display());
            println!("Storage: {}", config.storage_path.display());
            println!("Token limit: {}", format_count(u64::from(TokenLimit::load(&store).get())));
            println!("Refresh interval: {:?}", config.refresh_interval());
            println!("Generation endpoints: {}", config.generation_markers.join(", "));
            if let Ok(Some(settings)) = store.get(chat_tracker::storage::SETTINGS_KEY) {
                println!("Panel: {}", settings);
            }
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn open_tracker(chat: &Path) -> Result<Tracker<StaticHost>> {
    let config = config::load_or_default()?;
    let host = StaticHost::open(chat)?;
    let store = FileStore::new(&config.storage_path);
    Ok(Tracker::new(
        Arc::new(host),
        config,
        Box::new(store),
        Box::new(TerminalDisplay),
    ))
}

async fn run_stats(chat: &Path, response: Option<&Path>) -> Result<()> {
    let mut tracker = open_tracker(chat)?;

    if let Some(path) = response {
        let body = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match inspect_response(&HttpResponse::new(200, "application/json", body))? {
            Some(tokens) => {
                tracker
                    .estimate_cell()
                    .replace(TokenEstimate::new(tokens, Provenance::InterceptedResponse));
            }
            None => ui::print_warning("Response carries no token count, recounting instead"),
        }
    }

    ui::print_header(&chat.display().to_string());
    if !tracker.wait_for_host().await {
        ui::print_warning("Chat not ready, showing tokens only");
    }
    tracker.refresh(RefreshTrigger::Init);

    if let Some((index, text)) = tracker.summary() {
        ui::print_step(&format!("Summary on message #{}: {}", index, text));
    }
    Ok(())
}

fn run_summary(chat: &Path, set: Option<&str>) -> Result<()> {
    let mut tracker = open_tracker(chat)?;

    match set {
        Some(text) => {
            let index = tracker.edit_summary(text)?;
            ui::print_success(&format!("Summary on message #{} saved", index));
        }
        None => match tracker.summary() {
            Some((index, text)) => {
                ui::print_step(&format!("Summary on message #{}", index));
                println!("{}", text);
            }
            None => ui::print_warning("No summary in this chat"),
        },
    }
    Ok(())
}

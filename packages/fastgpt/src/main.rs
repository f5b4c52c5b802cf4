use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod app;
mod cli;
mod config;
mod models;
mod session;
#[cfg(test)]
mod test_helpers;
mod transport;
mod view;

use crate::config::{CliOverrides, FastGptConfig, Protocol};

#[derive(Parser)]
#[command(name = "fastgpt")]
#[command(about = "Terminal chat client for a streaming code-generation backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.fastgpt)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Backend host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Backend port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Scheme the backend is served over (ws/wss follows it)
    #[arg(long, global = true, value_enum)]
    protocol: Option<Protocol>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a chat session (the default)
    Chat(ChatArgs),

    /// List the models the backend offers
    Models(ModelsArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Parser, Default)]
struct ChatArgs {
    /// Model to select when the backend offers it
    #[arg(short, long)]
    model: Option<String>,

    /// Start with test input enabled
    #[arg(long)]
    test_input: bool,
}

#[derive(Parser)]
struct ModelsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct ConfigArgs {
    /// Also write config.toml if it does not exist yet
    #[arg(long)]
    write: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = FastGptConfig::new(cli.data_dir.clone())?;

    let command = cli.command.unwrap_or(Commands::Chat(ChatArgs::default()));
    let mut overrides = CliOverrides {
        host: cli.host,
        port: cli.port,
        protocol: cli.protocol,
        ..Default::default()
    };

    match command {
        Commands::Chat(args) => {
            overrides.model = args.model;
            overrides.test_input = args.test_input.then_some(true);
            let full_screen = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
            init_logging(&config, cli.debug, full_screen)?;
            cli::chat_command(&config, &overrides, full_screen).await
        }
        Commands::Models(args) => {
            init_logging(&config, cli.debug, false)?;
            cli::models_command(&config, &overrides, args.json).await
        }
        Commands::Config(args) => {
            init_logging(&config, cli.debug, false)?;
            cli::config_command(&config, &overrides, args.write)
        }
    }
}

/// Full-screen mode logs to a file so output never lands on the UI.
fn init_logging(config: &FastGptConfig, debug: bool, to_file: bool) -> Result<()> {
    let default_directive = if debug {
        "fastgpt=debug,fastgpt_stream=debug,info"
    } else {
        "fastgpt=info,fastgpt_stream=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if to_file {
        let path = config.log_path();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path))?;
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }
    Ok(())
}

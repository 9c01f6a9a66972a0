pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "farebot",
    about = "Farebot conversational flight booking CLI",
    long_about = "Chat-driven one-way flight search and booking against the reservation \
                  backend, plus config inspection and readiness checks.",
    after_help = "Examples:\n  farebot chat\n  farebot doctor --json\n  farebot config\n  farebot tools"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive booking conversation")]
    Chat {
        #[arg(long, help = "Path to a farebot.toml config file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Override the language model name")]
        model: Option<String>,
        #[arg(long, help = "Override the reservation backend base URL")]
        backend_url: Option<String>,
    },
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config {
        #[arg(long, help = "Path to a farebot.toml config file")]
        config: Option<PathBuf>,
    },
    #[command(about = "Validate config and reservation backend connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
        #[arg(long, help = "Path to a farebot.toml config file")]
        config: Option<PathBuf>,
    },
    #[command(about = "List the registered backend tools and their argument schemas")]
    Tools,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { config, model, backend_url } => {
            commands::chat::run(config, model, backend_url)
        }
        Command::Config { config } => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config) }
        }
        Command::Doctor { json, config } => commands::doctor::run(json, config),
        Command::Tools => commands::CommandResult { exit_code: 0, output: commands::tools::run() },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "debugmate")]
#[command(about = "DebugMate CLI - inspect assistant replies and manage the fix knowledge base", long_about = None)]
struct Cli {
    /// Knowledge base file (defaults to the platform data directory)
    #[arg(long, global = true)]
    kb: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an LLM reply into actions, suggestions and context requests
    Parse {
        /// File containing the reply, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,
    },
    /// Classify an error message and list suggested fixes
    Classify {
        message: String,
        /// URL of the page the step ran on
        #[arg(long)]
        url: Option<String>,
    },
    /// Manage the knowledge base
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },
}

#[derive(Subcommand)]
enum KbAction {
    /// Show summary statistics
    Stats,
    /// Find entries matching an error message
    Query {
        text: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Write all entries as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Merge entries from a JSON export
    Import { file: PathBuf },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DEBUGMATE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { input } => commands::parse::run(&input)?,
        Commands::Classify { message, url } => {
            commands::classify::run(cli.kb.as_deref(), &message, url.as_deref())?
        }
        Commands::Kb { action } => match action {
            KbAction::Stats => commands::kb::stats(cli.kb.as_deref())?,
            KbAction::Query { text, limit } => commands::kb::query(cli.kb.as_deref(), &text, limit)?,
            KbAction::Export { output } => commands::kb::export(cli.kb.as_deref(), output.as_deref())?,
            KbAction::Import { file } => commands::kb::import(cli.kb.as_deref(), &file)?,
        },
    }

    Ok(())
}

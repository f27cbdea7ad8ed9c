use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sessionlink::config::Config;

mod cli;

#[derive(Parser)]
#[command(name = "sessionlink")]
#[command(about = "Run coding-agent sessions in PTYs and follow their transcripts")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.sessionlink/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Start (or resume) an agent session and attach to it
    Run {
        /// Session id
        session_id: String,

        /// Resume an existing conversation instead of starting a new one
        #[arg(long)]
        resume: bool,

        /// Working directory of the session (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },

    /// Print classified events of a transcript as JSON lines
    Watch {
        /// Session id the transcript belongs to
        session_id: String,

        /// Transcript file (JSONL)
        transcript: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            init_logging(if cli.verbose { "debug" } else { "info" });
            cli::init::init_command(cli.config, force).await?;
        }
        Commands::Run {
            session_id,
            resume,
            cwd,
        } => {
            let config = load_config(cli.config, cli.verbose)?;
            cli::run::run_command(config, &session_id, cwd, resume).await?;
        }
        Commands::Watch {
            session_id,
            transcript,
        } => {
            let config = load_config(cli.config, cli.verbose)?;
            cli::watch::watch_command(config, &session_id, transcript).await?;
        }
    }

    Ok(())
}

/// Load the config and initialize logging from its `log_level`
fn load_config(path: Option<PathBuf>, verbose: bool) -> Result<Config> {
    let config = Config::load_from(path.as_deref())?;
    let log_level = if verbose { "debug" } else { config.log_level.as_str() };
    init_logging(log_level);
    Ok(config)
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

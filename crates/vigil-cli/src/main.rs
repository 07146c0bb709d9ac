use anyhow::Result;
use clap::{Parser, Subcommand};

mod bootstrap;
mod commands;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Autonomous trading orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load configuration, connect, and drive the control loop until shutdown.
    Run {
        /// Layered config paths, in merge order (later overrides earlier).
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Never touch a broker: simulate fills locally against the live bar feed.
        #[arg(long)]
        dry_run: bool,

        #[arg(long, value_enum, default_value_t = LogLevel::Info)]
        log_level: LogLevel,

        /// Named risk/exit preset merged in before the config files (conservative|balanced|aggressive).
        #[arg(long)]
        mindset: Option<String>,
    },

    /// Inspect or manually open/close positions carrying this run's magic-tag.
    Trade {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long, value_enum, default_value_t = LogLevel::Info)]
        log_level: LogLevel,

        #[command(flatten)]
        action: commands::trade::TradeAction,
    },
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.as_filter().into()),
        )
        .init();
}

/// Exit codes match the loop runner's documented contract: 0 normal
/// shutdown, 1 fatal, 2 config invalid, 130 interrupted (SIGINT).
const EXIT_FATAL: i32 = 1;
const EXIT_CONFIG_INVALID: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let _ = dotenvy::from_filename(".env.local");
    let cli = Cli::parse();

    let result = match cli.cmd {
        Commands::Run {
            config_paths,
            dry_run,
            log_level,
            mindset,
        } => {
            init_tracing(log_level);
            commands::run::execute(&config_paths, dry_run, mindset.as_deref()).await
        }
        Commands::Trade {
            config_paths,
            log_level,
            action,
        } => {
            init_tracing(log_level);
            commands::trade::execute(&config_paths, action).await
        }
    };

    std::process::exit(exit_code_for(result));
}

/// Maps a top-level command result to one of the process's documented exit
/// codes, logging the failure at ERROR before returning.
fn exit_code_for(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            if let Some(bootstrap::ConfigError(_)) = err.downcast_ref::<bootstrap::ConfigError>() {
                tracing::error!(%err, "configuration invalid");
                EXIT_CONFIG_INVALID
            } else if err.is::<bootstrap::Interrupted>() {
                tracing::warn!("interrupted");
                EXIT_INTERRUPTED
            } else {
                tracing::error!(%err, "fatal error");
                EXIT_FATAL
            }
        }
    }
}

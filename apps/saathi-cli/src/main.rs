//! Vyapaar Saathi CLI - the shop dashboard in a terminal.

mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use saathi_config_and_utils::init_logging;

/// Vyapaar Saathi - live sales, stock and accounts for your shop.
#[derive(Parser)]
#[command(name = "saathi")]
#[command(about = "Vyapaar Saathi CLI: live dashboard, AI insights and assistant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login,

    /// Logout and clear the stored session
    Logout,

    /// Show authentication status and configuration
    Status,

    /// Keep panels live and print every refresh (type hide/show/quit)
    Watch {
        /// Panels to mount (repeatable); all panels when omitted
        #[arg(short, long, value_enum)]
        panel: Vec<PanelChoice>,

        /// Stay subscribed while hidden
        #[arg(long)]
        no_idle: bool,

        /// Throttle window for every panel, in milliseconds
        #[arg(long)]
        throttle_ms: Option<u64>,
    },

    /// Print the current summary of every panel
    Summary,

    /// Generate (or reuse) an AI insight
    Insights {
        /// Ignore the minimum refresh interval
        #[arg(long)]
        force: bool,
    },

    /// Ask the assistant a question (English, Hindi or Hinglish)
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
}

/// Panel selection for `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PanelChoice {
    Sales,
    Inventory,
    Finance,
    Insights,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = cli.log_level.clone().unwrap_or_else(|| {
        commands::configured_log_level().unwrap_or_else(|| "warn".to_string())
    });
    // The CLI prints its own output; logs only go to the JSONL file.
    init_logging("saathi-cli", &level, false);

    let result = match cli.command {
        Commands::Login => commands::login(&cli.format).await,
        Commands::Logout => commands::logout(&cli.format).await,
        Commands::Status => commands::status(&cli.format).await,
        Commands::Watch {
            panel,
            no_idle,
            throttle_ms,
        } => {
            let options = commands::WatchOptions {
                panels: panel,
                no_idle,
                throttle_ms,
            };
            commands::watch(options, &cli.format).await
        }
        Commands::Summary => commands::summary(&cli.format).await,
        Commands::Insights { force } => commands::insights(force, &cli.format).await,
        Commands::Ask { message } => commands::ask(&message.join(" "), &cli.format).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}

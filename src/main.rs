use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use stockcorr::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for stockcorr::AppCommand {
    fn from(cmd: Commands) -> stockcorr::AppCommand {
        match cmd {
            Commands::Stocks => stockcorr::AppCommand::Stocks,
            Commands::Watch {
                symbols,
                window,
                once,
            } => stockcorr::AppCommand::Watch(stockcorr::WatchOptions {
                symbols,
                window_minutes: window,
                once,
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// List the stocks offered by the service
    Stocks,
    /// Continuously display the correlation matrix for a set of stocks
    Watch {
        /// Ticker symbols; defaults to the configured set, then to every listed stock
        symbols: Vec<String>,
        /// Lookback window in minutes
        #[arg(short, long)]
        window: Option<u32>,
        /// Exit after the first refresh
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => stockcorr::cli::setup::setup_at_path(path),
            None => stockcorr::cli::setup::setup(),
        },
        Some(cmd) => stockcorr::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

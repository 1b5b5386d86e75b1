use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::time::Duration;
use valscreen::cli::screen::ScreenArgs;
use valscreen::cli::selection::SelectionAction;
use valscreen::core::TickerSymbol;
use valscreen::core::log::init_logging;

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

#[derive(Args)]
struct ScreenOpts {
    /// Tickers to screen, replacing the saved selection for this run
    tickers: Vec<TickerSymbol>,

    /// Comma-separated tickers to add to the selection
    #[arg(long, value_parser = parse_ticker_list)]
    add: Option<TickerList>,

    /// Ignore cached snapshots and fetch fresh data
    #[arg(long)]
    refresh: bool,

    /// Only show tickers flagged undervalued
    #[arg(long)]
    undervalued_only: bool,

    /// Show price history charts
    #[arg(long)]
    charts: bool,

    /// Save the resolved selection for later runs
    #[arg(long)]
    save: bool,
}

impl From<ScreenOpts> for ScreenArgs {
    fn from(opts: ScreenOpts) -> ScreenArgs {
        ScreenArgs {
            tickers: opts.tickers,
            add: opts.add.map(|list| list.0).unwrap_or_default(),
            refresh: opts.refresh,
            undervalued_only: opts.undervalued_only,
            charts: opts.charts,
            save: opts.save,
        }
    }
}

#[derive(Subcommand)]
enum SelectionCommands {
    /// Show the current selection and the watchlist
    Show,
    /// Add tickers to the saved selection
    Add { tickers: Vec<TickerSymbol> },
    /// Remove tickers from the saved selection
    Remove { tickers: Vec<TickerSymbol> },
    /// Forget the saved selection
    Clear,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Value the selected tickers and print recommendations
    Screen(ScreenOpts),
    /// Re-run the screen periodically until interrupted
    Watch {
        #[command(flatten)]
        opts: ScreenOpts,

        /// Seconds between updates
        #[arg(long, default_value_t = 300)]
        interval: u64,
    },
    /// Look up ticker symbols by company name
    Search { query: String },
    /// Manage the saved ticker selection
    #[command(subcommand)]
    Selection(SelectionCommands),
}

impl From<Commands> for valscreen::AppCommand {
    fn from(cmd: Commands) -> valscreen::AppCommand {
        match cmd {
            Commands::Screen(opts) => valscreen::AppCommand::Screen(opts.into()),
            Commands::Watch { opts, interval } => valscreen::AppCommand::Watch {
                args: opts.into(),
                interval: Duration::from_secs(interval.max(1)),
            },
            Commands::Search { query } => valscreen::AppCommand::Search { query },
            Commands::Selection(action) => valscreen::AppCommand::Selection(match action {
                SelectionCommands::Show => SelectionAction::Show,
                SelectionCommands::Add { tickers } => SelectionAction::Add(tickers),
                SelectionCommands::Remove { tickers } => SelectionAction::Remove(tickers),
                SelectionCommands::Clear => SelectionAction::Clear,
            }),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Clone)]
struct TickerList(Vec<TickerSymbol>);

fn parse_ticker_list(value: &str) -> Result<TickerList, String> {
    TickerSymbol::parse_list(value)
        .map(TickerList)
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => valscreen::cli::setup::setup(),
        Some(cmd) => valscreen::run_command(cmd.into(), cli.config_path.as_deref()).await,
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

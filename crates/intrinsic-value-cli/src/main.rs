mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::history::HistoryArgs;
use commands::valuation::{BatchArgs, CagrArgs, DcfArgs, ReverseArgs, UpsideArgs, ValueArgs};

/// Forward and reverse discounted cash flow valuation
#[derive(Parser)]
#[command(
    name = "intrinsic",
    version,
    about = "Forward and reverse discounted cash flow valuation",
    long_about = "Values a company from projected free cash flows with decimal precision, \
                  and solves for the revenue growth, FCF margin or discount rate the \
                  current share price implies."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log solver progress to stderr (same as RUST_LOG=debug)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fair value per share from a forward DCF
    Dcf(DcfArgs),
    /// Solve for the growth, margin or discount rate implied by the price
    Reverse(ReverseArgs),
    /// Full valuation: forward DCF, all three reverse solves, CAGR and upside
    Value(ValueArgs),
    /// Compound annual growth rate of a growth path
    Cagr(CagrArgs),
    /// Upside/downside of a fair value against the market price
    Upside(UpsideArgs),
    /// Trailing revenue growth, dilution and FCF margins from annual data
    History(HistoryArgs),
    /// Value every entry of a file and emit one record per company
    Batch(BatchArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Dcf(args) => commands::valuation::run_dcf(args),
        Commands::Reverse(args) => commands::valuation::run_reverse(args),
        Commands::Value(args) => commands::valuation::run_value(args),
        Commands::Cagr(args) => commands::valuation::run_cagr(args),
        Commands::Upside(args) => commands::valuation::run_upside(args),
        Commands::History(args) => commands::history::run_history(args),
        Commands::Batch(args) => commands::valuation::run_batch(args),
        Commands::Version => {
            println!("intrinsic {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

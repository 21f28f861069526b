//! CLI argument definitions for pricetap.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Start the scheduler and collect until Ctrl-C or SIGTERM |
//! | `collect` | Run a single collection and print its outcome |
//! | `status` | Print scheduler, calendar and storage health |
//! | `prices` | Print the latest stored price per symbol |
//! | `symbols` | List registered symbols and exchanges |
//!
//! # Examples
//!
//! ```bash
//! pricetap run --config pricetap.toml
//! pricetap collect --force-all --pretty
//! pricetap prices AAPL 005930.KS
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Periodic last-price sampler for exchange-listed instruments.
#[derive(Debug, Parser)]
#[command(name = "pricetap", author, version, about = "Periodic multi-exchange price sampler")]
pub struct Cli {
    /// Settings file. Defaults to ./pricetap.toml when it exists.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the scheduler and run until interrupted.
    Run,
    /// Run one collection now.
    Collect(CollectArgs),
    /// Show scheduler, calendar and storage status.
    Status,
    /// Show the latest stored price per symbol.
    Prices(PricesArgs),
    /// List registered symbols.
    Symbols,
}

#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Collect every target symbol regardless of trading hours.
    #[arg(long, default_value_t = false)]
    pub force_all: bool,
}

#[derive(Debug, Args)]
pub struct PricesArgs {
    /// Symbols to show; all stored symbols when empty.
    pub symbols: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pricetap", "collect", "--force-all", "--pretty"])
            .expect("valid arguments");

        assert!(cli.pretty);
        assert!(matches!(cli.command, Command::Collect(CollectArgs { force_all: true })));
    }

    #[test]
    fn prices_accepts_multiple_symbols() {
        let cli = Cli::try_parse_from(["pricetap", "--config", "a.toml", "prices", "AAPL", "MSFT"])
            .expect("valid arguments");

        assert_eq!(cli.config, Some(PathBuf::from("a.toml")));
        match cli.command {
            Command::Prices(args) => assert_eq!(args.symbols, vec!["AAPL", "MSFT"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

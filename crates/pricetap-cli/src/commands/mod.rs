mod collect;
mod prices;
mod run;
mod status;
mod symbols;

use pricetap_core::{PriceService, Settings};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli, settings: &Settings) -> Result<Value, CliError> {
    let service = PriceService::from_settings(settings)?;

    let result = match &cli.command {
        Command::Run => run::run(&service).await,
        Command::Collect(args) => collect::run(args, &service).await,
        Command::Status => status::run(&service).await,
        Command::Prices(args) => prices::run(args, &service).await,
        Command::Symbols => symbols::run(&service),
    };

    if !matches!(cli.command, Command::Run) {
        service.shutdown().await;
    }
    result
}

use pricetap_core::{LatestPrice, PriceService, Symbol};
use serde::Serialize;
use serde_json::Value;

use crate::cli::PricesArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct PricesResponseData {
    prices: Vec<LatestPrice>,
}

pub async fn run(args: &PricesArgs, service: &PriceService) -> Result<Value, CliError> {
    let symbols = args
        .symbols
        .iter()
        .map(|raw| Symbol::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let filter = (!symbols.is_empty()).then_some(symbols);

    let prices = service.latest_prices(filter).await?;
    Ok(serde_json::to_value(PricesResponseData { prices })?)
}

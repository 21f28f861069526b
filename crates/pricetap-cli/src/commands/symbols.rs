use pricetap_core::PriceService;
use serde_json::Value;

use crate::error::CliError;

pub fn run(service: &PriceService) -> Result<Value, CliError> {
    Ok(serde_json::to_value(service.symbols())?)
}

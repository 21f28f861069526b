use pricetap_core::PriceService;
use serde_json::Value;

use crate::cli::CollectArgs;
use crate::error::CliError;

pub async fn run(args: &CollectArgs, service: &PriceService) -> Result<Value, CliError> {
    let outcome = service.collect_now(args.force_all).await;
    if !outcome.is_complete() {
        tracing::warn!(status = ?outcome.status, "collection did not reach storage");
    }
    Ok(serde_json::to_value(outcome)?)
}

use pricetap_core::service::{CalendarStatus, HealthReport};
use pricetap_core::{PriceService, SchedulerStatus, Symbol};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusResponseData {
    health: HealthReport,
    scheduler: SchedulerStatus,
    calendar: CalendarStatus,
    active_symbols: Vec<Symbol>,
}

pub async fn run(service: &PriceService) -> Result<Value, CliError> {
    let data = StatusResponseData {
        health: service.health().await,
        scheduler: service.scheduler_status(),
        calendar: service.calendar_status(),
        active_symbols: service.active_symbols(),
    };
    Ok(serde_json::to_value(data)?)
}

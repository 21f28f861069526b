//! Behavior-driven tests for the exchange calendar gate
//!
//! These tests verify WHEN an exchange counts as open and which instruments
//! become eligible for collection, using the default US/KR configuration.

use pricetap_core::{ExchangeCode, Settings, Symbol, Universe, UtcDateTime};

fn universe() -> Universe {
    Settings::default()
        .validate()
        .expect("default settings are valid")
}

fn code(raw: &str) -> ExchangeCode {
    ExchangeCode::parse(raw).expect("valid exchange")
}

fn at(raw: &str) -> UtcDateTime {
    UtcDateTime::parse(raw).expect("valid timestamp")
}

// =============================================================================
// Calendar: Session Bounds
// =============================================================================

#[test]
fn when_clock_hits_open_or_close_exactly_system_counts_exchange_open() {
    // Given: The default calendar and a regular Tuesday in Seoul (UTC+9)
    let universe = universe();

    // When/Then: 09:00 and 15:30 local are both inside the session
    assert!(universe.calendar.is_open(&code("KR"), at("2024-03-05T00:00:00Z")));
    assert!(universe.calendar.is_open(&code("KR"), at("2024-03-05T06:30:00Z")));

    // And one second outside either bound is closed
    assert!(!universe.calendar.is_open(&code("KR"), at("2024-03-04T23:59:59Z")));
    assert!(!universe.calendar.is_open(&code("KR"), at("2024-03-05T06:30:01Z")));
}

#[test]
fn when_local_day_is_weekend_system_keeps_exchange_closed_all_day() {
    // Given: Saturday 2024-03-09, 12:00 in New York
    let universe = universe();
    let saturday_noon = at("2024-03-09T17:00:00Z");

    // When: The calendar is consulted inside normal session hours
    let open = universe.calendar.is_open(&code("US"), saturday_noon);

    // Then: The exchange is closed
    assert!(!open);
    assert!(universe
        .calendar
        .active_symbols(&universe.registry, saturday_noon)
        .is_empty());
}

#[test]
fn when_exchange_is_not_configured_system_reports_it_closed() {
    // Given: A calendar without a London entry
    let universe = universe();

    // When/Then: Asking about it is not an error, just closed
    assert!(!universe.calendar.is_open(&code("LSE"), at("2024-03-05T12:00:00Z")));
}

// =============================================================================
// Calendar: Active Symbols
// =============================================================================

#[test]
fn when_only_us_is_open_system_returns_only_us_symbols() {
    // Given: Tuesday 11:00 in New York, which is 01:00 Wednesday in Seoul
    let universe = universe();
    let now = at("2024-03-05T16:00:00Z");

    // When: Active symbols are computed
    let active = universe.calendar.active_symbols(&universe.registry, now);

    // Then: Every active symbol is registered and listed on an open exchange
    assert_eq!(active.len(), 10);
    for symbol in &active {
        let exchange = universe
            .registry
            .exchange_of(symbol)
            .expect("active symbol is registered");
        assert_eq!(exchange, &code("US"));
    }
}

#[test]
fn when_both_sessions_are_closed_system_reports_no_active_symbols() {
    // Given: 20:00 UTC on a Tuesday (16:00 EDT close passed, Seoul before dawn)
    let universe = universe();

    // When: Active symbols are computed
    let active = universe
        .calendar
        .active_symbols(&universe.registry, at("2024-07-09T21:00:00Z"));

    // Then: Nothing is eligible
    assert!(active.is_empty());
}

#[test]
fn when_statuses_are_reported_system_includes_every_exchange() {
    // Given: The default calendar during the Seoul session
    let universe = universe();
    let now = at("2024-03-05T02:00:00Z");

    // When: Per-exchange reports are built
    let reports = universe.calendar.exchange_reports(now);

    // Then: Both exchanges appear with local time and open flag
    assert_eq!(reports.len(), 2);
    let kr = reports
        .iter()
        .find(|report| report.exchange == code("KR"))
        .expect("KR report");
    assert!(kr.is_open);
    assert_eq!(kr.timezone, "Asia/Seoul");
    let us = reports
        .iter()
        .find(|report| report.exchange == code("US"))
        .expect("US report");
    assert!(!us.is_open);

    let samsung = Symbol::parse("005930.KS").expect("valid");
    assert!(universe
        .calendar
        .active_symbols(&universe.registry, now)
        .contains(&samsung));
}

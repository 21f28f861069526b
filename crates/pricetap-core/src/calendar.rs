//! Exchange trading-hours gate and the static instrument universe.
//!
//! An exchange is open when its local wall clock falls on a trading day and
//! inside `[open, close]`, both ends inclusive. Weekend days are always
//! closed. Holidays are not modelled.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{ConfigError, ExchangeCode, Symbol, UtcDateTime};

/// Trading session for one exchange, in the exchange's own timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeHours {
    timezone: Tz,
    open: NaiveTime,
    close: NaiveTime,
    weekend: Vec<Weekday>,
}

impl ExchangeHours {
    pub fn new(
        exchange: &ExchangeCode,
        timezone: Tz,
        open: NaiveTime,
        close: NaiveTime,
        weekend: Vec<Weekday>,
    ) -> Result<Self, ConfigError> {
        if open >= close {
            return Err(ConfigError::OpenNotBeforeClose {
                exchange: exchange.to_string(),
                open: open.format("%H:%M").to_string(),
                close: close.format("%H:%M").to_string(),
            });
        }

        Ok(Self {
            timezone,
            open,
            close,
            weekend,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    pub fn close(&self) -> NaiveTime {
        self.close
    }

    pub fn weekend(&self) -> &[Weekday] {
        &self.weekend
    }

    pub fn local_time(&self, now: UtcDateTime) -> DateTime<Tz> {
        now.to_chrono().with_timezone(&self.timezone)
    }

    pub fn is_open_at(&self, now: UtcDateTime) -> bool {
        let local = self.local_time(now);
        if self.weekend.contains(&local.weekday()) {
            return false;
        }

        let time = local.time();
        self.open <= time && time <= self.close
    }
}

/// Trading hours for every configured exchange.
#[derive(Debug, Clone, Default)]
pub struct ExchangeCalendar {
    hours: BTreeMap<ExchangeCode, ExchangeHours>,
}

impl ExchangeCalendar {
    pub fn new(hours: BTreeMap<ExchangeCode, ExchangeHours>) -> Self {
        Self { hours }
    }

    /// Unknown exchanges are reported closed.
    pub fn is_open(&self, exchange: &ExchangeCode, now: UtcDateTime) -> bool {
        self.hours
            .get(exchange)
            .is_some_and(|hours| hours.is_open_at(now))
    }

    pub fn hours(&self, exchange: &ExchangeCode) -> Option<&ExchangeHours> {
        self.hours.get(exchange)
    }

    pub fn contains(&self, exchange: &ExchangeCode) -> bool {
        self.hours.contains_key(exchange)
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &ExchangeCode> {
        self.hours.keys()
    }

    pub fn local_time(&self, exchange: &ExchangeCode, now: UtcDateTime) -> Option<DateTime<Tz>> {
        self.hours.get(exchange).map(|hours| hours.local_time(now))
    }

    /// Open/closed flag for every configured exchange.
    pub fn exchange_statuses(&self, now: UtcDateTime) -> BTreeMap<ExchangeCode, bool> {
        self.hours
            .iter()
            .map(|(code, hours)| (code.clone(), hours.is_open_at(now)))
            .collect()
    }

    /// Detailed per-exchange view for status reporting.
    pub fn exchange_reports(&self, now: UtcDateTime) -> Vec<ExchangeStatus> {
        self.hours
            .iter()
            .map(|(code, hours)| ExchangeStatus {
                exchange: code.clone(),
                timezone: hours.timezone.name().to_owned(),
                local_time: hours.local_time(now).format("%Y-%m-%d %H:%M:%S").to_string(),
                open: hours.open.format("%H:%M").to_string(),
                close: hours.close.format("%H:%M").to_string(),
                is_open: hours.is_open_at(now),
            })
            .collect()
    }

    /// Registry symbols whose exchange is currently open.
    pub fn active_symbols(&self, registry: &InstrumentRegistry, now: UtcDateTime) -> Vec<Symbol> {
        let statuses = self.exchange_statuses(now);
        registry
            .iter()
            .filter(|(_, exchange)| statuses.get(*exchange).copied().unwrap_or(false))
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeStatus {
    pub exchange: ExchangeCode,
    pub timezone: String,
    pub local_time: String,
    pub open: String,
    pub close: String,
    pub is_open: bool,
}

/// Static symbol → exchange mapping loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentRegistry {
    entries: BTreeMap<Symbol, ExchangeCode>,
}

impl InstrumentRegistry {
    /// Build a registry, checking every exchange against the calendar.
    pub fn new(
        entries: BTreeMap<Symbol, ExchangeCode>,
        calendar: &ExchangeCalendar,
    ) -> Result<Self, ConfigError> {
        if let Some((symbol, exchange)) = entries
            .iter()
            .find(|(_, exchange)| !calendar.contains(exchange))
        {
            return Err(ConfigError::UnknownExchange {
                symbol: symbol.to_string(),
                exchange: exchange.to_string(),
            });
        }

        Ok(Self { entries })
    }

    pub fn exchange_of(&self, symbol: &Symbol) -> Option<&ExchangeCode> {
        self.entries.get(symbol)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &ExchangeCode)> {
        self.entries.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Symbols designated for collection; always a subset of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    symbols: BTreeSet<Symbol>,
}

impl TargetSet {
    pub fn new(
        symbols: impl IntoIterator<Item = Symbol>,
        registry: &InstrumentRegistry,
    ) -> Result<Self, ConfigError> {
        let symbols = symbols.into_iter().collect::<BTreeSet<_>>();
        if let Some(symbol) = symbols.iter().find(|symbol| !registry.contains(symbol)) {
            return Err(ConfigError::TargetNotRegistered {
                symbol: symbol.to_string(),
            });
        }

        Ok(Self { symbols })
    }

    /// Every registry symbol is a target.
    pub fn all(registry: &InstrumentRegistry) -> Self {
        Self {
            symbols: registry.symbols().cloned().collect(),
        }
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> ExchangeCode {
        ExchangeCode::parse(raw).expect("valid exchange")
    }

    fn at(raw: &str) -> UtcDateTime {
        UtcDateTime::parse(raw).expect("valid timestamp")
    }

    fn hhmm(raw: &str) -> NaiveTime {
        NaiveTime::parse_from_str(raw, "%H:%M").expect("valid time")
    }

    fn calendar() -> ExchangeCalendar {
        let weekend = vec![Weekday::Sat, Weekday::Sun];
        let us = ExchangeHours::new(
            &code("US"),
            chrono_tz::America::New_York,
            hhmm("09:30"),
            hhmm("16:00"),
            weekend.clone(),
        )
        .expect("us hours");
        let kr = ExchangeHours::new(
            &code("KR"),
            chrono_tz::Asia::Seoul,
            hhmm("09:00"),
            hhmm("15:30"),
            weekend,
        )
        .expect("kr hours");
        ExchangeCalendar::new(BTreeMap::from([(code("US"), us), (code("KR"), kr)]))
    }

    #[test]
    fn open_and_close_instants_are_inclusive() {
        let calendar = calendar();
        // 2024-03-05 is a Tuesday; New York is UTC-5 before the DST switch.
        assert!(calendar.is_open(&code("US"), at("2024-03-05T14:30:00Z")));
        assert!(calendar.is_open(&code("US"), at("2024-03-05T21:00:00Z")));
        assert!(!calendar.is_open(&code("US"), at("2024-03-05T14:29:59Z")));
        assert!(!calendar.is_open(&code("US"), at("2024-03-05T21:00:01Z")));
    }

    #[test]
    fn daylight_saving_shifts_the_utc_window() {
        let calendar = calendar();
        // 2024-07-09 is a Tuesday in EDT (UTC-4).
        assert!(calendar.is_open(&code("US"), at("2024-07-09T13:30:00Z")));
        assert!(!calendar.is_open(&code("US"), at("2024-07-09T20:30:00Z")));
    }

    #[test]
    fn weekend_is_closed_even_inside_session_hours() {
        let calendar = calendar();
        // Saturday 2024-03-09 11:00 in Seoul.
        assert!(!calendar.is_open(&code("KR"), at("2024-03-09T02:00:00Z")));
    }

    #[test]
    fn weekday_is_judged_in_local_time() {
        let nz = ExchangeHours::new(
            &code("NZ"),
            chrono_tz::Pacific::Auckland,
            hhmm("10:00"),
            hhmm("16:45"),
            vec![Weekday::Sat, Weekday::Sun],
        )
        .expect("nz hours");

        // Monday 10:30 in Auckland (UTC+13) is still Sunday in UTC.
        assert!(nz.is_open_at(at("2024-03-10T21:30:00Z")));
        // Saturday 10:30 in Auckland is a Friday in UTC.
        assert!(!nz.is_open_at(at("2024-03-08T21:30:00Z")));
    }

    #[test]
    fn unknown_exchange_is_closed() {
        assert!(!calendar().is_open(&code("JP"), at("2024-03-05T01:00:00Z")));
    }

    #[test]
    fn active_symbols_follow_their_exchange() {
        let calendar = calendar();
        let registry = InstrumentRegistry::new(
            BTreeMap::from([
                (Symbol::parse("AAPL").expect("valid"), code("US")),
                (Symbol::parse("005930.KS").expect("valid"), code("KR")),
            ]),
            &calendar,
        )
        .expect("registry");

        // 10:00 in Seoul, 20:00 the previous evening in New York.
        let active = calendar.active_symbols(&registry, at("2024-03-05T01:00:00Z"));

        assert_eq!(active, vec![Symbol::parse("005930.KS").expect("valid")]);
    }

    #[test]
    fn open_must_precede_close() {
        let error = ExchangeHours::new(
            &code("US"),
            chrono_tz::America::New_York,
            hhmm("16:00"),
            hhmm("09:30"),
            Vec::new(),
        )
        .expect_err("must fail");
        assert!(matches!(error, ConfigError::OpenNotBeforeClose { .. }));
    }

    #[test]
    fn registry_rejects_exchange_without_hours() {
        let error = InstrumentRegistry::new(
            BTreeMap::from([(Symbol::parse("7203.T").expect("valid"), code("JP"))]),
            &calendar(),
        )
        .expect_err("must fail");
        assert!(matches!(error, ConfigError::UnknownExchange { .. }));
    }

    #[test]
    fn targets_must_be_registered() {
        let calendar = calendar();
        let registry = InstrumentRegistry::new(
            BTreeMap::from([(Symbol::parse("AAPL").expect("valid"), code("US"))]),
            &calendar,
        )
        .expect("registry");

        let error = TargetSet::new([Symbol::parse("MSFT").expect("valid")], &registry)
            .expect_err("must fail");
        assert!(matches!(error, ConfigError::TargetNotRegistered { .. }));
        assert_eq!(TargetSet::all(&registry).len(), 1);
    }
}

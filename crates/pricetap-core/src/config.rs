//! Layered settings: built-in defaults, an optional TOML file, then
//! `PRICETAP_*` environment overrides (`__` separates nested keys).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::calendar::{ExchangeCalendar, ExchangeHours, InstrumentRegistry, TargetSet};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::http_client::{HttpClientConfig, DEFAULT_TIMEOUT_MS, DEFAULT_USER_AGENT};
use crate::resolver::Strategy;
use crate::{ConfigError, ExchangeCode, Granularity, Period, Symbol};

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pricetap.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub collection: CollectionSettings,
    pub provider: ProviderSettings,
    pub warehouse: WarehouseSettings,
    pub logging: LoggingSettings,
    /// Keyed by exchange code; keys are matched case-insensitively.
    #[serde(default = "default_exchanges")]
    pub exchanges: BTreeMap<String, ExchangeSettings>,
    /// Symbols to collect. Absent means every registered symbol.
    pub targets: Option<Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection: CollectionSettings::default(),
            provider: ProviderSettings::default(),
            warehouse: WarehouseSettings::default(),
            logging: LoggingSettings::default(),
            exchanges: default_exchanges(),
            targets: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionSettings {
    pub interval_secs: u64,
    pub force_all: bool,
    pub max_concurrency: usize,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            force_all: true,
            max_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub requests_per_minute: u32,
    pub default_period: Period,
    pub default_granularity: Granularity,
    pub circuit_failure_threshold: u32,
    pub circuit_open_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            user_agent: String::from(DEFAULT_USER_AGENT),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            requests_per_minute: 120,
            default_period: Period::OneDay,
            default_granularity: Granularity::OneMinute,
            circuit_failure_threshold: 5,
            circuit_open_secs: 30,
        }
    }
}

impl ProviderSettings {
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            user_agent: self.user_agent.clone(),
            timeout_ms: self.timeout_ms,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_failure_threshold,
            open_timeout: Duration::from_secs(self.circuit_open_secs),
        }
    }

    pub fn strategy_chain(&self) -> Vec<Strategy> {
        Strategy::chain_starting_with(self.default_period, self.default_granularity)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WarehouseSettings {
    /// Falls back to `$PRICETAP_HOME/prices.duckdb`.
    pub db_path: Option<PathBuf>,
    pub max_pool_size: usize,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            max_pool_size: 4,
        }
    }
}

impl WarehouseSettings {
    pub fn warehouse_config(&self) -> pricetap_warehouse::WarehouseConfig {
        let mut config = pricetap_warehouse::WarehouseConfig::default();
        if let Some(path) = &self.db_path {
            config.db_path = path.clone();
        }
        config.max_pool_size = self.max_pool_size;
        config
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            json: false,
        }
    }
}

/// Trading hours and listed symbols for one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExchangeSettings {
    /// IANA zone name, e.g. `America/New_York`.
    pub timezone: String,
    /// Local session open, `HH:MM`.
    pub open: String,
    /// Local session close, `HH:MM`.
    pub close: String,
    #[serde(default = "default_weekend")]
    pub weekend: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
}

fn default_weekend() -> Vec<String> {
    vec![String::from("Sat"), String::from("Sun")]
}

fn default_exchanges() -> BTreeMap<String, ExchangeSettings> {
    let owned = |values: &[&str]| -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    };

    BTreeMap::from([
        (
            String::from("us"),
            ExchangeSettings {
                timezone: String::from("America/New_York"),
                open: String::from("09:30"),
                close: String::from("16:00"),
                weekend: default_weekend(),
                symbols: owned(&[
                    "AAPL", "GOOGL", "MSFT", "AMZN", "TSLA", "META", "NVDA", "JPM", "WMT", "DIS",
                ]),
            },
        ),
        (
            String::from("kr"),
            ExchangeSettings {
                timezone: String::from("Asia/Seoul"),
                open: String::from("09:00"),
                close: String::from("15:30"),
                weekend: default_weekend(),
                symbols: owned(&["005930.KS", "000660.KS"]),
            },
        ),
    ])
}

/// Typed view of the configured instrument universe.
#[derive(Debug, Clone)]
pub struct Universe {
    pub calendar: ExchangeCalendar,
    pub registry: InstrumentRegistry,
    pub targets: TargetSet,
}

impl Settings {
    /// Load settings from `path`, or from `pricetap.toml` when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let builder = Config::builder()
            .set_default("collection.interval_secs", 10)?
            .set_default("collection.force_all", true)?
            .set_default("collection.max_concurrency", 4)?
            .set_default("provider.timeout_ms", 10_000)?
            .set_default("provider.requests_per_minute", 120)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(file)
            // PRICETAP_COLLECTION__INTERVAL_SECS=30, PRICETAP_TARGETS=AAPL,MSFT
            .add_source(
                Environment::with_prefix("PRICETAP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("targets"),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn collection_interval(&self) -> Result<Duration, ConfigError> {
        if self.collection.interval_secs == 0 {
            return Err(ConfigError::NotPositive {
                field: "collection.interval_secs",
            });
        }
        Ok(Duration::from_secs(self.collection.interval_secs))
    }

    /// Check scalar limits and build the typed calendar, registry and target set.
    pub fn validate(&self) -> Result<Universe, ConfigError> {
        self.collection_interval()?;
        if self.collection.max_concurrency == 0 {
            return Err(ConfigError::NotPositive {
                field: "collection.max_concurrency",
            });
        }
        if self.provider.requests_per_minute == 0 {
            return Err(ConfigError::NotPositive {
                field: "provider.requests_per_minute",
            });
        }
        if self.warehouse.max_pool_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "warehouse.max_pool_size",
            });
        }

        let mut hours = BTreeMap::new();
        let mut entries = BTreeMap::<Symbol, ExchangeCode>::new();
        for (key, exchange) in &self.exchanges {
            let code = ExchangeCode::parse(&key.to_ascii_uppercase())?;
            hours.insert(code.clone(), exchange_hours(&code, exchange)?);

            for raw in &exchange.symbols {
                let symbol = Symbol::parse(raw)?;
                if let Some(first) = entries.get(&symbol) {
                    return Err(ConfigError::DuplicateSymbol {
                        symbol: symbol.to_string(),
                        first: first.to_string(),
                        second: code.to_string(),
                    });
                }
                entries.insert(symbol, code.clone());
            }
        }

        let calendar = ExchangeCalendar::new(hours);
        let registry = InstrumentRegistry::new(entries, &calendar)?;
        let targets = match &self.targets {
            Some(raw) => TargetSet::new(
                raw.iter()
                    .map(|symbol| Symbol::parse(symbol))
                    .collect::<Result<Vec<_>, _>>()?,
                &registry,
            )?,
            None => TargetSet::all(&registry),
        };

        tracing::debug!(
            exchanges = calendar.exchanges().count(),
            symbols = registry.len(),
            targets = targets.len(),
            "configuration validated"
        );

        Ok(Universe {
            calendar,
            registry,
            targets,
        })
    }
}

fn exchange_hours(code: &ExchangeCode, settings: &ExchangeSettings) -> Result<ExchangeHours, ConfigError> {
    let timezone = settings
        .timezone
        .parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimezone {
            exchange: code.to_string(),
            timezone: settings.timezone.clone(),
        })?;
    let open = time_of_day(code, "open", &settings.open)?;
    let close = time_of_day(code, "close", &settings.close)?;
    let weekend = settings
        .weekend
        .iter()
        .map(|day| {
            day.parse::<Weekday>().map_err(|_| ConfigError::InvalidWeekday {
                exchange: code.to_string(),
                value: day.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let distinct = weekend
        .iter()
        .enumerate()
        .filter(|(index, day)| !weekend[..*index].contains(day))
        .count();
    if weekend.len() != 2 || distinct != 2 {
        return Err(ConfigError::WeekendDays {
            exchange: code.to_string(),
            count: weekend.len(),
        });
    }

    ExchangeHours::new(code, timezone, open, close, weekend)
}

fn time_of_day(code: &ExchangeCode, field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTimeOfDay {
            exchange: code.to_string(),
            field,
            value: value.to_string(),
        })
}

//! Configuration structures for the reference-price extractor.

use crate::error::{Error, Result};
use crate::types::ClockBand;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session bands kept by the session filter.
    pub session: SessionConfig,
    /// Matching-price search windows.
    pub matching: MatchingConfig,
    /// Bid/ask search configuration.
    pub quotes: QuoteConfig,
    /// Input column names.
    pub schema: SchemaConfig,
    /// Pipeline execution configuration.
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Parse a JSON configuration and validate it.
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check band consistency.
    pub fn validate(&self) -> Result<()> {
        let bands = [
            ("session.pre_open", &self.session.pre_open),
            ("session.pre_close", &self.session.pre_close),
            ("matching.morning_window", &self.matching.morning_window),
            ("matching.closing_window", &self.matching.closing_window),
            ("quotes.closing_window", &self.quotes.closing_window),
        ];
        for (name, band) in bands {
            if !band.is_valid() {
                return Err(Error::config(format!("{name} {band} is empty")));
            }
        }

        if !self.session.pre_open.encloses(&self.matching.morning_window) {
            return Err(Error::config(format!(
                "matching.morning_window {} lies outside session.pre_open {}",
                self.matching.morning_window, self.session.pre_open
            )));
        }
        if !self.session.pre_close.encloses(&self.matching.closing_window) {
            return Err(Error::config(format!(
                "matching.closing_window {} lies outside session.pre_close {}",
                self.matching.closing_window, self.session.pre_close
            )));
        }
        if !self.session.pre_close.encloses(&self.quotes.closing_window) {
            return Err(Error::config(format!(
                "quotes.closing_window {} lies outside session.pre_close {}",
                self.quotes.closing_window, self.session.pre_close
            )));
        }
        if self.quotes.morning_lookback_secs < 0 {
            return Err(Error::config("quotes.morning_lookback_secs must be >= 0"));
        }
        Ok(())
    }
}

/// Band for a literal default; an out-of-range literal yields an empty band,
/// which [`Config::validate`] rejects.
fn band(start: (u32, u32, u32), end: (u32, u32, u32)) -> ClockBand {
    ClockBand::from_hms(start, end).unwrap_or(ClockBand::new(NaiveTime::MIN, NaiveTime::MIN))
}

/// Intraday bands in which reference-price discovery is attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pre-open band.
    pub pre_open: ClockBand,
    /// Pre-close band.
    pub pre_close: ClockBand,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pre_open: band((8, 58, 0), (9, 2, 0)),
            pre_close: band((16, 59, 0), (17, 16, 0)),
        }
    }
}

/// Windows searched for the last trade before each auction instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Opening auction window.
    pub morning_window: ClockBand,
    /// Closing auction window.
    pub closing_window: ClockBand,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            morning_window: band((8, 58, 0), (9, 0, 0)),
            closing_window: band((17, 4, 0), (17, 6, 0)),
        }
    }
}

/// Bid/ask resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// How far back from the morning matching timestamp to look for a quote.
    pub morning_lookback_secs: i64,
    /// Fixed pre-auction band used for closing quotes.
    pub closing_window: ClockBand,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            morning_lookback_secs: 120,
            closing_window: band((16, 59, 0), (17, 0, 0)),
        }
    }
}

/// Names of the input table columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub timestamp: String,
    pub instrument: String,
    pub trade_price: String,
    pub bid_price: String,
    pub ask_price: String,
    /// Optional matched-quantity column; ignored when absent from the table.
    pub quantity: Option<String>,
}

impl SchemaConfig {
    /// Columns that must be present in every input table.
    pub fn required_columns(&self) -> [&str; 5] {
        [
            self.timestamp.as_str(),
            self.instrument.as_str(),
            self.trade_price.as_str(),
            self.bid_price.as_str(),
            self.ask_price.as_str(),
        ]
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            timestamp: "timestamp".to_string(),
            instrument: "stockcode".to_string(),
            trade_price: "trade_price".to_string(),
            bid_price: "bid_price".to_string(),
            ask_price: "ask_price".to_string(),
            quantity: Some("mp_quantity".to_string()),
        }
    }
}

/// Pipeline execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of worker threads (0 = rayon default pool).
    pub workers: usize,
    /// Below this many groups the pipeline runs sequentially.
    pub min_parallel_groups: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            min_parallel_groups: 64,
        }
    }
}

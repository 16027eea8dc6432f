//! Column-oriented raw tick table and its conversion into typed ticks.
//!
//! Missing required columns are fatal. A cell that fails to parse is not:
//! the field becomes absent and a [`DataQualityIssue`] is recorded.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use refprice_core::config::SchemaConfig;
use refprice_core::{Error, Result, Tick};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Timestamp layouts accepted in text cells, after `D` separator normalization.
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// A single untyped table value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Float(f64),
    Int(i64),
    Timestamp(NaiveDateTime),
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(ts: NaiveDateTime) -> Self {
        Cell::Timestamp(ts)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Null, Into::into)
    }
}

/// A named column of cells.
#[derive(Debug, Clone)]
struct Column {
    name: String,
    cells: Vec<Cell>,
}

/// A field-level anomaly found while converting the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityIssue {
    /// Zero-based input row.
    pub row: usize,
    pub column: String,
    pub message: String,
    /// Instrument of the affected row, when it could be determined.
    pub instrument: Option<String>,
    /// Day of the affected row, when it could be determined.
    pub day: Option<NaiveDate>,
}

impl DataQualityIssue {
    /// The equivalent local error value.
    pub fn to_error(&self) -> Error {
        Error::data_quality(self.row, self.column.clone(), self.message.clone())
    }
}

/// Typed ticks plus every anomaly encountered while producing them.
#[derive(Debug, Clone, Default)]
pub struct TickBatch {
    pub ticks: Vec<Tick>,
    pub issues: Vec<DataQualityIssue>,
}

/// In-memory, column-oriented input table.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    columns: Vec<Column>,
}

impl RawTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, replacing any existing column with the same name.
    pub fn with_column<I, C>(mut self, name: impl Into<String>, cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.push_column(name, cells);
        self
    }

    /// Add a column in place, replacing any existing column with the same name.
    pub fn push_column<I, C>(&mut self, name: impl Into<String>, cells: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        let name = name.into();
        let cells: Vec<Cell> = cells.into_iter().map(Into::into).collect();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.cells = cells,
            None => self.columns.push(Column { name, cells }),
        }
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.cells.as_slice())
    }

    /// Whether a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Number of rows (length of the first column).
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.cells.len())
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Check that required columns exist and every column has the same length.
    pub fn validate(&self, schema: &SchemaConfig) -> Result<()> {
        for name in schema.required_columns() {
            if !self.has_column(name) {
                return Err(Error::schema(name));
            }
        }

        let expected = self.num_rows();
        for col in &self.columns {
            if col.cells.len() != expected {
                return Err(Error::ColumnLength {
                    column: col.name.clone(),
                    expected,
                    actual: col.cells.len(),
                });
            }
        }
        Ok(())
    }

    /// Convert the table into typed ticks.
    ///
    /// Rows without a usable timestamp or instrument cannot be grouped and
    /// are dropped; unparsable prices become absent fields.
    pub fn to_ticks(&self, schema: &SchemaConfig) -> Result<TickBatch> {
        self.validate(schema)?;

        let col = |name: &str| self.column(name).ok_or_else(|| Error::schema(name));
        let timestamps = col(&schema.timestamp)?;
        let instruments = col(&schema.instrument)?;
        let trade_prices = col(&schema.trade_price)?;
        let bids = col(&schema.bid_price)?;
        let asks = col(&schema.ask_price)?;
        let quantities = schema
            .quantity
            .as_deref()
            .and_then(|name| self.column(name).map(|cells| (name, cells)));

        let mut batch = TickBatch {
            ticks: Vec::with_capacity(self.num_rows()),
            issues: Vec::new(),
        };

        for row in 0..self.num_rows() {
            let timestamp = match parse_timestamp_cell(&timestamps[row]) {
                Ok(ts) => ts,
                Err(msg) => {
                    record(&mut batch.issues, row, &schema.timestamp, msg, None, None);
                    continue;
                }
            };
            let instrument = match parse_instrument_cell(&instruments[row]) {
                Ok(s) => s,
                Err(msg) => {
                    let day = Some(timestamp.date());
                    record(&mut batch.issues, row, &schema.instrument, msg, None, day);
                    continue;
                }
            };

            let mut price = |name: &str, cell: &Cell| match parse_price_cell(cell) {
                Ok(v) => v,
                Err(msg) => {
                    let inst = Some(instrument.clone());
                    let day = Some(timestamp.date());
                    record(&mut batch.issues, row, name, msg, inst, day);
                    None
                }
            };

            let trade_price = price(&schema.trade_price, &trade_prices[row]);
            let bid_price = price(&schema.bid_price, &bids[row]);
            let ask_price = price(&schema.ask_price, &asks[row]);
            let quantity = quantities.and_then(|(name, cells)| price(name, &cells[row]));

            batch.ticks.push(Tick {
                timestamp,
                instrument,
                trade_price,
                bid_price,
                ask_price,
                quantity,
            });
        }

        Ok(batch)
    }
}

fn record(
    issues: &mut Vec<DataQualityIssue>,
    row: usize,
    column: &str,
    message: String,
    instrument: Option<String>,
    day: Option<NaiveDate>,
) {
    warn!(row, column, instrument = ?instrument, "data quality: {message}");
    issues.push(DataQualityIssue {
        row,
        column: column.to_string(),
        message,
        instrument,
        day,
    });
}

/// Parse an exchange timestamp such as `2024-03-04D08:59:50.123456`.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let normalized = text.trim().replace('D', " ");
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
}

fn parse_timestamp_cell(cell: &Cell) -> std::result::Result<NaiveDateTime, String> {
    match cell {
        Cell::Timestamp(ts) => Ok(*ts),
        Cell::Text(s) => parse_timestamp(s).ok_or_else(|| format!("unparsable timestamp '{s}'")),
        Cell::Int(ms) => DateTime::from_timestamp_millis(*ms)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| format!("epoch milliseconds out of range: {ms}")),
        Cell::Null => Err("missing timestamp".to_string()),
        Cell::Float(v) => Err(format!("expected a timestamp, found number {v}")),
    }
}

fn parse_instrument_cell(cell: &Cell) -> std::result::Result<String, String> {
    match cell {
        Cell::Text(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Cell::Int(code) => Ok(code.to_string()),
        Cell::Text(_) | Cell::Null => Err("missing instrument".to_string()),
        other => Err(format!("expected an instrument label, found {other:?}")),
    }
}

/// Null, NaN and blank text are plain absence, not an anomaly.
fn parse_price_cell(cell: &Cell) -> std::result::Result<Option<f64>, String> {
    match cell {
        Cell::Null => Ok(None),
        Cell::Float(v) if v.is_nan() => Ok(None),
        Cell::Float(v) if v.is_finite() => Ok(Some(*v)),
        Cell::Float(v) => Err(format!("non-finite value {v}")),
        Cell::Int(v) => Ok(Some(*v as f64)),
        Cell::Text(s) if s.trim().is_empty() => Ok(None),
        Cell::Text(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            Ok(v) => Err(format!("non-finite value {v}")),
            Err(_) => Err(format!("not a number: '{s}'")),
        },
        Cell::Timestamp(ts) => Err(format!("expected a number, found timestamp {ts}")),
    }
}

//! PyO3 bindings for the reference-price extractor.
//!
//! Exposes the Rust implementation to Python:
//! - Session window filtering
//! - Morning/closing matching-price resolution
//! - Bid/ask resolution
//! - The daily aggregation pipeline over ticks or a dict of columns

use chrono::{NaiveDate, NaiveDateTime};
use pyo3::exceptions::{PyKeyError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyInt, PyString};

use refprice_core::{
    Config as RustConfig,
    DailySummaryRecord as RustDailySummaryRecord,
    Error as RustError,
    GroupKey,
    Tick as RustTick,
};
use refprice_ingestion::{Cell, DataQualityIssue as RustDataQualityIssue, RawTable, SessionFilter};
use refprice_pipeline::{DailyAggregator, DailyReport as RustDailyReport};
use refprice_resolvers::{BidAskResolver, MatchingPriceResolver};

// ============================================================================
// Helpers
// ============================================================================

fn to_py_err(err: RustError) -> PyErr {
    match err {
        RustError::Schema { .. } => PyKeyError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

fn load_config(config_json: Option<&str>) -> PyResult<RustConfig> {
    match config_json {
        Some(json) => RustConfig::from_json(json).map_err(to_py_err),
        None => Ok(RustConfig::default()),
    }
}

fn to_rust_ticks(ticks: Vec<Tick>) -> Vec<RustTick> {
    ticks.into_iter().map(Into::into).collect()
}

/// Convert a Python value into a table cell.
///
/// Unknown types fall back to their `str()` form and are parsed downstream.
fn to_cell(obj: &Bound<'_, PyAny>) -> PyResult<Cell> {
    if obj.is_none() {
        Ok(Cell::Null)
    } else if obj.is_instance_of::<PyString>() {
        Ok(Cell::Text(obj.extract()?))
    } else if obj.is_instance_of::<PyBool>() {
        Ok(Cell::Text(obj.str()?.to_string()))
    } else if obj.is_instance_of::<PyInt>() {
        Ok(Cell::Int(obj.extract()?))
    } else if obj.is_instance_of::<PyFloat>() {
        Ok(Cell::Float(obj.extract()?))
    } else if let Ok(ts) = obj.extract::<NaiveDateTime>() {
        Ok(Cell::Timestamp(ts))
    } else {
        Ok(Cell::Text(obj.str()?.to_string()))
    }
}

fn to_raw_table(columns: &Bound<'_, PyDict>) -> PyResult<RawTable> {
    let mut table = RawTable::new();
    for (name, values) in columns.iter() {
        let name: String = name.extract()?;
        let cells = values
            .iter()?
            .map(|item| item.and_then(|v| to_cell(&v)))
            .collect::<PyResult<Vec<Cell>>>()?;
        table.push_column(name, cells);
    }
    Ok(table)
}

// ============================================================================
// Python-exposed Types
// ============================================================================

/// A single tick.
#[pyclass]
#[derive(Clone)]
pub struct Tick {
    #[pyo3(get, set)]
    pub timestamp: NaiveDateTime,
    #[pyo3(get, set)]
    pub instrument: String,
    #[pyo3(get, set)]
    pub trade_price: Option<f64>,
    #[pyo3(get, set)]
    pub bid_price: Option<f64>,
    #[pyo3(get, set)]
    pub ask_price: Option<f64>,
    #[pyo3(get, set)]
    pub quantity: Option<f64>,
}

#[pymethods]
impl Tick {
    #[new]
    #[pyo3(signature = (timestamp, instrument, trade_price=None, bid_price=None, ask_price=None, quantity=None))]
    fn new(
        timestamp: NaiveDateTime,
        instrument: String,
        trade_price: Option<f64>,
        bid_price: Option<f64>,
        ask_price: Option<f64>,
        quantity: Option<f64>,
    ) -> Self {
        Tick { timestamp, instrument, trade_price, bid_price, ask_price, quantity }
    }

    #[getter]
    fn is_trade(&self) -> bool {
        RustTick::from(self.clone()).is_trade()
    }

    #[getter]
    fn is_quote(&self) -> bool {
        RustTick::from(self.clone()).is_quote()
    }

    fn __repr__(&self) -> String {
        format!(
            "Tick(timestamp={}, instrument={}, trade_price={:?}, bid_price={:?}, ask_price={:?})",
            self.timestamp, self.instrument, self.trade_price, self.bid_price, self.ask_price
        )
    }
}

/// NaN (pandas' missing value) and infinities cross the boundary as `None`.
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl From<Tick> for RustTick {
    fn from(t: Tick) -> Self {
        RustTick {
            timestamp: t.timestamp,
            instrument: t.instrument,
            trade_price: finite(t.trade_price),
            bid_price: finite(t.bid_price),
            ask_price: finite(t.ask_price),
            quantity: finite(t.quantity),
        }
    }
}

impl From<RustTick> for Tick {
    fn from(t: RustTick) -> Self {
        Tick {
            timestamp: t.timestamp,
            instrument: t.instrument,
            trade_price: t.trade_price,
            bid_price: t.bid_price,
            ask_price: t.ask_price,
            quantity: t.quantity,
        }
    }
}

/// One summary row per (day, instrument). `None` means "not found".
#[pyclass]
#[derive(Clone)]
pub struct DailySummaryRow {
    #[pyo3(get)]
    pub day: NaiveDate,
    #[pyo3(get)]
    pub instrument: String,
    #[pyo3(get)]
    pub morning_timestamp: Option<NaiveDateTime>,
    #[pyo3(get)]
    pub morning_price: Option<f64>,
    #[pyo3(get)]
    pub morning_bid: Option<f64>,
    #[pyo3(get)]
    pub morning_ask: Option<f64>,
    #[pyo3(get)]
    pub closing_timestamp: Option<NaiveDateTime>,
    #[pyo3(get)]
    pub closing_price: Option<f64>,
    #[pyo3(get)]
    pub closing_bid: Option<f64>,
    #[pyo3(get)]
    pub closing_ask: Option<f64>,
}

#[pymethods]
impl DailySummaryRow {
    /// Row as a dict keyed by output column name.
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new_bound(py);
        dict.set_item("day", self.day)?;
        dict.set_item("instrument", &self.instrument)?;
        dict.set_item("morning_timestamp", self.morning_timestamp)?;
        dict.set_item("morning_price", self.morning_price)?;
        dict.set_item("morning_bid", self.morning_bid)?;
        dict.set_item("morning_ask", self.morning_ask)?;
        dict.set_item("closing_timestamp", self.closing_timestamp)?;
        dict.set_item("closing_price", self.closing_price)?;
        dict.set_item("closing_bid", self.closing_bid)?;
        dict.set_item("closing_ask", self.closing_ask)?;
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "DailySummaryRow(day={}, instrument={}, morning_price={:?}, closing_price={:?})",
            self.day, self.instrument, self.morning_price, self.closing_price
        )
    }
}

impl From<RustDailySummaryRecord> for DailySummaryRow {
    fn from(r: RustDailySummaryRecord) -> Self {
        DailySummaryRow {
            day: r.day,
            instrument: r.instrument,
            morning_timestamp: r.morning_timestamp,
            morning_price: r.morning_price,
            morning_bid: r.morning_bid,
            morning_ask: r.morning_ask,
            closing_timestamp: r.closing_timestamp,
            closing_price: r.closing_price,
            closing_bid: r.closing_bid,
            closing_ask: r.closing_ask,
        }
    }
}

/// A cell that could not be parsed; the field was treated as absent.
#[pyclass]
#[derive(Clone)]
pub struct DataQualityIssue {
    #[pyo3(get)]
    pub row: usize,
    #[pyo3(get)]
    pub column: String,
    #[pyo3(get)]
    pub message: String,
    #[pyo3(get)]
    pub instrument: Option<String>,
    #[pyo3(get)]
    pub day: Option<NaiveDate>,
}

#[pymethods]
impl DataQualityIssue {
    fn __repr__(&self) -> String {
        format!(
            "DataQualityIssue(row={}, column={}, message={:?})",
            self.row, self.column, self.message
        )
    }
}

impl From<RustDataQualityIssue> for DataQualityIssue {
    fn from(i: RustDataQualityIssue) -> Self {
        DataQualityIssue {
            row: i.row,
            column: i.column,
            message: i.message,
            instrument: i.instrument,
            day: i.day,
        }
    }
}

/// Result of `process_table`.
#[pyclass]
pub struct DailyReport {
    inner: RustDailyReport,
}

#[pymethods]
impl DailyReport {
    #[getter]
    fn rows(&self) -> Vec<DailySummaryRow> {
        self.inner.records().into_iter().map(Into::into).collect()
    }

    #[getter]
    fn issues(&self) -> Vec<DataQualityIssue> {
        self.inner.issues.iter().cloned().map(Into::into).collect()
    }

    #[getter]
    fn morning_found(&self) -> usize {
        self.inner.morning_found()
    }

    #[getter]
    fn closing_found(&self) -> usize {
        self.inner.closing_found()
    }

    /// Rows where neither matching price was found.
    fn empty_groups(&self) -> Vec<DailySummaryRow> {
        self.inner
            .empty_groups()
            .map(|r| r.to_record().into())
            .collect()
    }

    /// Data quality issues attributed to one `(day, instrument)` group.
    fn issues_for(&self, day: NaiveDate, instrument: String) -> Vec<DataQualityIssue> {
        let key = GroupKey { day, instrument };
        self.inner.issues_for(&key).cloned().map(Into::into).collect()
    }

    /// Rows as a JSON array of flat records.
    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "DailyReport(rows={}, issues={}, morning_found={}, closing_found={})",
            self.inner.rows.len(),
            self.inner.issues.len(),
            self.inner.morning_found(),
            self.inner.closing_found()
        )
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Keep only ticks inside the pre-open and pre-close bands.
#[pyfunction]
#[pyo3(signature = (ticks, config_json=None))]
fn session_filter(ticks: Vec<Tick>, config_json: Option<&str>) -> PyResult<Vec<Tick>> {
    let config = load_config(config_json)?;
    let filter = SessionFilter::new(&config.session);
    Ok(filter
        .filter(&to_rust_ticks(ticks))
        .into_iter()
        .map(Into::into)
        .collect())
}

/// Morning matching `(timestamp, price)`, or `None`.
#[pyfunction]
#[pyo3(signature = (ticks, config_json=None))]
fn find_morning_matching_price(
    ticks: Vec<Tick>,
    config_json: Option<&str>,
) -> PyResult<Option<(NaiveDateTime, f64)>> {
    let config = load_config(config_json)?;
    Ok(MatchingPriceResolver::new(&config.matching)
        .morning(&to_rust_ticks(ticks))
        .map(|e| (e.timestamp, e.price.0)))
}

/// Closing matching `(timestamp, price)`, or `None`.
#[pyfunction]
#[pyo3(signature = (ticks, config_json=None))]
fn find_closing_matching_price(
    ticks: Vec<Tick>,
    config_json: Option<&str>,
) -> PyResult<Option<(NaiveDateTime, f64)>> {
    let config = load_config(config_json)?;
    Ok(MatchingPriceResolver::new(&config.matching)
        .closing(&to_rust_ticks(ticks))
        .map(|e| (e.timestamp, e.price.0)))
}

/// Best `(bid, ask)` around a matching timestamp.
///
/// A missing timestamp yields `(None, None)`.
#[pyfunction]
#[pyo3(signature = (ticks, timestamp, is_closing=false, config_json=None))]
fn find_bid_ask_prices(
    ticks: Vec<Tick>,
    timestamp: Option<NaiveDateTime>,
    is_closing: bool,
    config_json: Option<&str>,
) -> PyResult<(Option<f64>, Option<f64>)> {
    let Some(timestamp) = timestamp else {
        return Ok((None, None));
    };
    let config = load_config(config_json)?;
    let ticks = to_rust_ticks(ticks);
    Ok(BidAskResolver::new(&config.quotes)
        .select(&ticks, timestamp, is_closing)
        .map_or((None, None), |t| (t.bid(), t.ask())))
}

/// Run the daily pipeline over a list of ticks.
#[pyfunction]
#[pyo3(signature = (ticks, config_json=None))]
fn process_daily_data(
    py: Python<'_>,
    ticks: Vec<Tick>,
    config_json: Option<&str>,
) -> PyResult<Vec<DailySummaryRow>> {
    let aggregator = DailyAggregator::new(load_config(config_json)?).map_err(to_py_err)?;
    let ticks = to_rust_ticks(ticks);
    let rows = py.allow_threads(|| aggregator.process(&ticks));
    Ok(rows.iter().map(|r| r.to_record().into()).collect())
}

/// Run the daily pipeline over a dict of equally long column lists.
///
/// Raises `KeyError` when a required column is missing.
#[pyfunction]
#[pyo3(signature = (columns, config_json=None))]
fn process_table(
    py: Python<'_>,
    columns: &Bound<'_, PyDict>,
    config_json: Option<&str>,
) -> PyResult<DailyReport> {
    let aggregator = DailyAggregator::new(load_config(config_json)?).map_err(to_py_err)?;
    let table = to_raw_table(columns)?;
    let inner = py
        .allow_threads(|| aggregator.process_table(&table))
        .map_err(to_py_err)?;

    Ok(DailyReport { inner })
}

/// Install a `tracing` subscriber writing to stderr.
///
/// Returns `False` if a subscriber was already installed.
#[pyfunction]
#[pyo3(signature = (level="info"))]
fn init_logging(level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

// ============================================================================
// Module Definition
// ============================================================================

/// HFT reference prices - opening/closing matching prices from tick data.
#[pymodule]
fn hft_refprice(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Types
    m.add_class::<Tick>()?;
    m.add_class::<DailySummaryRow>()?;
    m.add_class::<DataQualityIssue>()?;
    m.add_class::<DailyReport>()?;

    // Functions
    m.add_function(wrap_pyfunction!(session_filter, m)?)?;
    m.add_function(wrap_pyfunction!(find_morning_matching_price, m)?)?;
    m.add_function(wrap_pyfunction!(find_closing_matching_price, m)?)?;
    m.add_function(wrap_pyfunction!(find_bid_ask_prices, m)?)?;
    m.add_function(wrap_pyfunction!(process_daily_data, m)?)?;
    m.add_function(wrap_pyfunction!(process_table, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;

    tracing::debug!("hft_refprice module initialised");
    Ok(())
}

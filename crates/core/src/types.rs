//! Core data types for the reference-price extractor.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Price type with ordering support.
pub type Price = OrderedFloat<f64>;

/// Build a clock time, `None` for out-of-range fields.
#[inline]
pub fn hms(hour: u32, min: u32, sec: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour, min, sec)
}

#[inline]
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// A half-open clock-time interval `[start, end)`, independent of calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockBand {
    /// Inclusive lower bound.
    pub start: NaiveTime,
    /// Exclusive upper bound.
    pub end: NaiveTime,
}

impl ClockBand {
    /// Create a band from two clock times.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Create a band from `(hour, minute, second)` triples.
    ///
    /// Returns `None` if either triple is not a valid clock time.
    pub fn from_hms(start: (u32, u32, u32), end: (u32, u32, u32)) -> Option<Self> {
        Some(Self::new(
            hms(start.0, start.1, start.2)?,
            hms(end.0, end.1, end.2)?,
        ))
    }

    /// Whether the clock time falls inside the band.
    #[inline]
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time < self.end
    }

    /// Whether the time-of-day of a timestamp falls inside the band.
    #[inline]
    pub fn contains_timestamp(&self, ts: NaiveDateTime) -> bool {
        self.contains(ts.time())
    }

    /// A band is usable only if it is non-empty and does not wrap midnight.
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Whether `other` lies entirely inside this band.
    pub fn encloses(&self, other: &ClockBand) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

impl fmt::Display for ClockBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// One row of the input tick table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Exchange-local timestamp.
    pub timestamp: NaiveDateTime,
    /// Ticker symbol.
    pub instrument: String,
    /// Last traded price, absent on non-trade ticks.
    pub trade_price: Option<f64>,
    /// Best bid at this tick.
    pub bid_price: Option<f64>,
    /// Best ask at this tick.
    pub ask_price: Option<f64>,
    /// Matched quantity, when the feed carries one.
    pub quantity: Option<f64>,
}

impl Tick {
    /// Create a trade tick.
    pub fn trade(timestamp: NaiveDateTime, instrument: impl Into<String>, price: f64) -> Self {
        Self {
            timestamp,
            instrument: instrument.into(),
            trade_price: Some(price),
            bid_price: None,
            ask_price: None,
            quantity: None,
        }
    }

    /// Create a quote tick.
    pub fn quote(
        timestamp: NaiveDateTime,
        instrument: impl Into<String>,
        bid: Option<f64>,
        ask: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            instrument: instrument.into(),
            trade_price: None,
            bid_price: bid,
            ask_price: ask,
            quantity: None,
        }
    }

    /// Attach a matched quantity.
    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Calendar day of the tick.
    #[inline]
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Clock time of the tick.
    #[inline]
    pub fn clock(&self) -> NaiveTime {
        self.timestamp.time()
    }

    /// Trade price, treating NaN and infinities as absent.
    #[inline]
    pub fn traded_price(&self) -> Option<f64> {
        finite(self.trade_price)
    }

    /// Bid price, treating NaN and infinities as absent.
    #[inline]
    pub fn bid(&self) -> Option<f64> {
        finite(self.bid_price)
    }

    /// Ask price, treating NaN and infinities as absent.
    #[inline]
    pub fn ask(&self) -> Option<f64> {
        finite(self.ask_price)
    }

    /// A trade tick carries a price and, if a quantity is reported, a non-zero one.
    #[inline]
    pub fn is_trade(&self) -> bool {
        self.traded_price().is_some() && self.quantity.map_or(true, |q| q != 0.0)
    }

    /// A quote tick carries a bid or an ask.
    #[inline]
    pub fn is_quote(&self) -> bool {
        self.bid().is_some() || self.ask().is_some()
    }

    /// The `(day, instrument)` group this tick belongs to.
    pub fn group_key(&self) -> GroupKey {
        GroupKey {
            day: self.day(),
            instrument: self.instrument.clone(),
        }
    }
}

/// Unit of independent computation.
///
/// Ordering is by day first, then instrument.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub day: NaiveDate,
    pub instrument: String,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.day, self.instrument)
    }
}

/// Which auction a reference price belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Opening ("morning matching") auction.
    Morning,
    /// Closing auction.
    Closing,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Morning => "morning",
            EventKind::Closing => "closing",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved opening or closing matching price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingPriceEvent {
    pub day: NaiveDate,
    pub instrument: String,
    pub kind: EventKind,
    /// Timestamp of the selected trade tick.
    pub timestamp: NaiveDateTime,
    /// Selected trade price.
    pub price: Price,
}

/// Best bid/ask around a matching-price event.
///
/// Both sides come from the same tick, so the pair is always consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub day: NaiveDate,
    pub instrument: String,
    pub kind: EventKind,
    /// Timestamp of the selected quote tick.
    pub timestamp: NaiveDateTime,
    pub bid_price: Option<Price>,
    pub ask_price: Option<Price>,
}

/// One output row per `(day, instrument)` group.
///
/// Every sub-result is optional; `None` means "not found", never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummaryRow {
    pub day: NaiveDate,
    pub instrument: String,
    pub morning: Option<MatchingPriceEvent>,
    pub morning_quote: Option<QuoteSnapshot>,
    pub closing: Option<MatchingPriceEvent>,
    pub closing_quote: Option<QuoteSnapshot>,
}

impl DailySummaryRow {
    /// A row with every sub-result absent.
    pub fn empty(key: GroupKey) -> Self {
        Self {
            day: key.day,
            instrument: key.instrument,
            morning: None,
            morning_quote: None,
            closing: None,
            closing_quote: None,
        }
    }

    pub fn morning_timestamp(&self) -> Option<NaiveDateTime> {
        self.morning.as_ref().map(|e| e.timestamp)
    }

    pub fn morning_price(&self) -> Option<f64> {
        self.morning.as_ref().map(|e| e.price.0)
    }

    pub fn morning_bid(&self) -> Option<f64> {
        self.morning_quote.as_ref().and_then(|q| q.bid_price).map(|p| p.0)
    }

    pub fn morning_ask(&self) -> Option<f64> {
        self.morning_quote.as_ref().and_then(|q| q.ask_price).map(|p| p.0)
    }

    pub fn closing_timestamp(&self) -> Option<NaiveDateTime> {
        self.closing.as_ref().map(|e| e.timestamp)
    }

    pub fn closing_price(&self) -> Option<f64> {
        self.closing.as_ref().map(|e| e.price.0)
    }

    pub fn closing_bid(&self) -> Option<f64> {
        self.closing_quote.as_ref().and_then(|q| q.bid_price).map(|p| p.0)
    }

    pub fn closing_ask(&self) -> Option<f64> {
        self.closing_quote.as_ref().and_then(|q| q.ask_price).map(|p| p.0)
    }

    /// True when neither matching price could be determined.
    pub fn is_empty(&self) -> bool {
        self.morning.is_none() && self.closing.is_none()
    }

    /// Flatten into the tabular output layout.
    pub fn to_record(&self) -> DailySummaryRecord {
        DailySummaryRecord {
            day: self.day,
            instrument: self.instrument.clone(),
            morning_timestamp: self.morning_timestamp(),
            morning_price: self.morning_price(),
            morning_bid: self.morning_bid(),
            morning_ask: self.morning_ask(),
            closing_timestamp: self.closing_timestamp(),
            closing_price: self.closing_price(),
            closing_bid: self.closing_bid(),
            closing_ask: self.closing_ask(),
        }
    }
}

/// Output column names, in order.
pub const SUMMARY_COLUMNS: [&str; 10] = [
    "day",
    "instrument",
    "morning_timestamp",
    "morning_price",
    "morning_bid",
    "morning_ask",
    "closing_timestamp",
    "closing_price",
    "closing_bid",
    "closing_ask",
];

/// Flat, nullable-per-column view of a [`DailySummaryRow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryRecord {
    pub day: NaiveDate,
    pub instrument: String,
    pub morning_timestamp: Option<NaiveDateTime>,
    pub morning_price: Option<f64>,
    pub morning_bid: Option<f64>,
    pub morning_ask: Option<f64>,
    pub closing_timestamp: Option<NaiveDateTime>,
    pub closing_price: Option<f64>,
    pub closing_bid: Option<f64>,
    pub closing_ask: Option<f64>,
}

impl From<&DailySummaryRow> for DailySummaryRecord {
    fn from(row: &DailySummaryRow) -> Self {
        row.to_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_time(hms(h, m, s).unwrap())
    }

    #[test]
    fn test_clock_band_half_open() {
        let band = ClockBand::from_hms((8, 58, 0), (9, 2, 0)).unwrap();
        assert!(band.contains(hms(8, 58, 0).unwrap()));
        assert!(band.contains(hms(9, 1, 59).unwrap()));
        assert!(!band.contains(hms(9, 2, 0).unwrap()));
        assert!(!band.contains(hms(8, 57, 59).unwrap()));
        assert_eq!(band.to_string(), "[08:58:00, 09:02:00)");
    }

    #[test]
    fn test_clock_band_encloses() {
        let session = ClockBand::from_hms((16, 59, 0), (17, 16, 0)).unwrap();
        assert!(session.encloses(&ClockBand::from_hms((17, 4, 0), (17, 6, 0)).unwrap()));
        assert!(!session.encloses(&ClockBand::from_hms((16, 58, 0), (17, 0, 0)).unwrap()));
        assert!(!ClockBand::from_hms((9, 0, 0), (9, 0, 0)).unwrap().is_valid());
    }

    #[test]
    fn test_zero_quantity_is_not_a_trade() {
        let tick = Tick::trade(at(8, 59, 0), "CJLU", 10.0);
        assert!(tick.is_trade());
        assert!(!tick.clone().with_quantity(0.0).is_trade());
        assert!(tick.with_quantity(200.0).is_trade());
        assert!(!Tick::quote(at(8, 59, 0), "CJLU", Some(9.9), None).is_trade());
    }

    #[test]
    fn test_group_key_orders_by_day_first() {
        let a = GroupKey { day: at(0, 0, 0).date(), instrument: "ZZZ".into() };
        let b = GroupKey {
            day: at(0, 0, 0).date().succ_opt().unwrap(),
            instrument: "AAA".into(),
        };
        assert!(a < b);
    }

    #[test]
    fn test_record_keeps_absence() {
        let key = GroupKey { day: at(0, 0, 0).date(), instrument: "CJLU".into() };
        let mut row = DailySummaryRow::empty(key);
        row.closing = Some(MatchingPriceEvent {
            day: row.day,
            instrument: row.instrument.clone(),
            kind: EventKind::Closing,
            timestamp: at(17, 5, 30),
            price: OrderedFloat(20.0),
        });

        let record = row.to_record();
        assert_eq!(record.morning_price, None);
        assert_eq!(record.morning_timestamp, None);
        assert_relative_eq!(record.closing_price.unwrap(), 20.0);
        assert_eq!(record.closing_bid, None);
        assert!(!row.is_empty());
    }

    #[test]
    fn test_non_finite_prices_are_absent() {
        let nan_trade = Tick::trade(at(8, 59, 0), "CJLU", f64::NAN);
        assert!(!nan_trade.is_trade());
        assert_eq!(nan_trade.traded_price(), None);

        let quote = Tick::quote(at(8, 59, 0), "CJLU", Some(f64::NEG_INFINITY), Some(f64::NAN));
        assert!(!quote.is_quote());
        assert_eq!(quote.bid(), None);
        assert_eq!(quote.ask(), None);
    }
}

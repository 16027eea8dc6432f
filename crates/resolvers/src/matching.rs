//! Matching-price resolution.
//!
//! The exchange publishes its auction price at a fixed instant; the last trade
//! printed inside the window just before that instant is the closest proxy
//! available from tick data.

use chrono::NaiveDateTime;
use ordered_float::OrderedFloat;
use refprice_core::config::MatchingConfig;
use refprice_core::{ClockBand, EventKind, MatchingPriceEvent, Tick};
use tracing::debug;

/// Finds the opening and closing matching prices of one `(day, instrument)` group.
#[derive(Debug, Clone)]
pub struct MatchingPriceResolver {
    morning_window: ClockBand,
    closing_window: ClockBand,
}

impl MatchingPriceResolver {
    /// Create a resolver from configuration.
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            morning_window: config.morning_window,
            closing_window: config.closing_window,
        }
    }

    /// Search window for an event kind.
    pub fn window(&self, kind: EventKind) -> ClockBand {
        match kind {
            EventKind::Morning => self.morning_window,
            EventKind::Closing => self.closing_window,
        }
    }

    /// Select the latest trade tick inside the window for `kind`.
    ///
    /// Ticks need not be sorted. Equal timestamps resolve to the later tick in
    /// input order. Returns `None` when no trade tick falls in the window.
    pub fn resolve<'a, I>(&self, ticks: I, kind: EventKind) -> Option<MatchingPriceEvent>
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        let window = self.window(kind);
        // max_by_key keeps the last of equal maxima
        let tick = ticks
            .into_iter()
            .filter(|t| t.is_trade() && window.contains(t.clock()))
            .max_by_key(|t| t.timestamp)?;
        let price = tick.traded_price()?;

        debug!(
            instrument = %tick.instrument,
            %kind,
            timestamp = %tick.timestamp,
            price,
            "matching price resolved"
        );

        Some(MatchingPriceEvent {
            day: tick.day(),
            instrument: tick.instrument.clone(),
            kind,
            timestamp: tick.timestamp,
            price: OrderedFloat(price),
        })
    }

    /// Opening ("morning matching") price.
    pub fn morning<'a, I>(&self, ticks: I) -> Option<MatchingPriceEvent>
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        self.resolve(ticks, EventKind::Morning)
    }

    /// Closing matching price.
    pub fn closing<'a, I>(&self, ticks: I) -> Option<MatchingPriceEvent>
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        self.resolve(ticks, EventKind::Closing)
    }
}

impl Default for MatchingPriceResolver {
    fn default() -> Self {
        Self::new(&MatchingConfig::default())
    }
}

/// Morning matching `(timestamp, price)` of a single-day, single-instrument slice.
pub fn find_morning_matching_price(
    ticks: &[Tick],
    config: &MatchingConfig,
) -> Option<(NaiveDateTime, f64)> {
    MatchingPriceResolver::new(config)
        .morning(ticks)
        .map(|e| (e.timestamp, e.price.0))
}

/// Closing matching `(timestamp, price)` of a single-day, single-instrument slice.
pub fn find_closing_matching_price(
    ticks: &[Tick],
    config: &MatchingConfig,
) -> Option<(NaiveDateTime, f64)> {
    MatchingPriceResolver::new(config)
        .closing(ticks)
        .map(|e| (e.timestamp, e.price.0))
}

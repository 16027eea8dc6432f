//! Session window filtering.
//!
//! Keeps only ticks whose time of day falls in the pre-open or pre-close band.
//! The calendar date is ignored.

use chrono::NaiveDateTime;
use refprice_core::config::SessionConfig;
use refprice_core::{ClockBand, Tick};

/// Filter restricting ticks to the two session bands.
#[derive(Debug, Clone, Copy)]
pub struct SessionFilter {
    pre_open: ClockBand,
    pre_close: ClockBand,
}

impl SessionFilter {
    /// Create a filter from session configuration.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            pre_open: config.pre_open,
            pre_close: config.pre_close,
        }
    }

    /// Whether a timestamp falls in either band.
    #[inline]
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.pre_open.contains_timestamp(ts) || self.pre_close.contains_timestamp(ts)
    }

    /// Return copies of the ticks inside either band, in input order.
    pub fn filter(&self, ticks: &[Tick]) -> Vec<Tick> {
        ticks
            .iter()
            .filter(|t| self.contains(t.timestamp))
            .cloned()
            .collect()
    }

    /// Borrowing variant of [`filter`](Self::filter).
    pub fn filter_refs<'a, I>(&self, ticks: I) -> Vec<&'a Tick>
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        ticks
            .into_iter()
            .filter(|t| self.contains(t.timestamp))
            .collect()
    }

    /// Drop ticks outside both bands in place.
    pub fn retain(&self, ticks: &mut Vec<Tick>) {
        ticks.retain(|t| self.contains(t.timestamp));
    }
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

/// Keep only ticks inside the configured session bands.
pub fn session_filter(ticks: &[Tick], config: &SessionConfig) -> Vec<Tick> {
    SessionFilter::new(config).filter(ticks)
}

//! Bid/ask resolution around a matching-price event.
//!
//! Morning quotes are searched backwards from the matching timestamp. Closing
//! quotes always come from the fixed pre-auction band, whatever the exact
//! closing print time was.

use chrono::{Duration, NaiveDateTime};
use ordered_float::OrderedFloat;
use refprice_core::config::QuoteConfig;
use refprice_core::{ClockBand, EventKind, MatchingPriceEvent, QuoteSnapshot, Tick};
use tracing::debug;

/// Longest useful morning lookback; groups never span more than a day.
const MAX_LOOKBACK_SECS: i64 = 86_400;

/// Finds the freshest bid/ask quote for a matching-price event.
#[derive(Debug, Clone)]
pub struct BidAskResolver {
    morning_lookback: Duration,
    closing_window: ClockBand,
}

impl BidAskResolver {
    /// Create a resolver from configuration.
    pub fn new(config: &QuoteConfig) -> Self {
        Self {
            morning_lookback: Duration::seconds(
                config.morning_lookback_secs.clamp(0, MAX_LOOKBACK_SECS),
            ),
            closing_window: config.closing_window,
        }
    }

    /// Whether a quote tick qualifies for a matching timestamp.
    fn in_window(&self, tick: &Tick, timestamp: NaiveDateTime, is_closing: bool) -> bool {
        if is_closing {
            tick.day() == timestamp.date() && self.closing_window.contains(tick.clock())
        } else {
            tick.timestamp <= timestamp && tick.timestamp >= timestamp - self.morning_lookback
        }
    }

    /// Select the quote tick to read bid and ask from.
    ///
    /// Picks the latest qualifying quote tick; equal timestamps resolve to the
    /// later tick in input order.
    pub fn select<'a, I>(&self, ticks: I, timestamp: NaiveDateTime, is_closing: bool) -> Option<&'a Tick>
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        ticks
            .into_iter()
            .filter(|t| t.is_quote() && self.in_window(t, timestamp, is_closing))
            .max_by_key(|t| t.timestamp)
    }

    /// Resolve the quote snapshot for an event.
    ///
    /// Bid and ask are read from the same tick, so either may be absent on its own.
    pub fn resolve<'a, I>(&self, ticks: I, event: &MatchingPriceEvent) -> Option<QuoteSnapshot>
    where
        I: IntoIterator<Item = &'a Tick>,
    {
        let is_closing = event.kind == EventKind::Closing;
        let Some(tick) = self.select(ticks, event.timestamp, is_closing) else {
            debug!(
                instrument = %event.instrument,
                kind = %event.kind,
                "no quote tick found"
            );
            return None;
        };

        Some(QuoteSnapshot {
            day: event.day,
            instrument: event.instrument.clone(),
            kind: event.kind,
            timestamp: tick.timestamp,
            bid_price: tick.bid().map(OrderedFloat),
            ask_price: tick.ask().map(OrderedFloat),
        })
    }
}

impl Default for BidAskResolver {
    fn default() -> Self {
        Self::new(&QuoteConfig::default())
    }
}

/// Best `(bid, ask)` around a matching timestamp.
///
/// Returns `(None, None)` when no quote tick qualifies.
pub fn find_bid_ask_prices(
    ticks: &[Tick],
    timestamp: NaiveDateTime,
    is_closing: bool,
    config: &QuoteConfig,
) -> (Option<f64>, Option<f64>) {
    BidAskResolver::new(config)
        .select(ticks, timestamp, is_closing)
        .map_or((None, None), |t| (t.bid(), t.ask()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use refprice_core::hms;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_time(hms(h, m, s).unwrap())
    }

    fn make_quote(h: u32, m: u32, s: u32, bid: f64, ask: f64) -> Tick {
        Tick::quote(at(h, m, s), "CJLU", Some(bid), Some(ask))
    }

    fn make_event(kind: EventKind, ts: NaiveDateTime, price: f64) -> MatchingPriceEvent {
        MatchingPriceEvent {
            day: ts.date(),
            instrument: "CJLU".to_string(),
            kind,
            timestamp: ts,
            price: OrderedFloat(price),
        }
    }

    #[test]
    fn test_closing_uses_pre_auction_band() {
        let ticks = vec![
            make_quote(16, 59, 10, 19.7, 19.9),
            make_quote(16, 59, 50, 19.75, 19.95),
            make_quote(17, 5, 0, 19.9, 20.1),
        ];
        let event = make_event(EventKind::Closing, at(17, 5, 30), 20.0);
        let snapshot = BidAskResolver::default().resolve(&ticks, &event).unwrap();

        assert_eq!(snapshot.timestamp, at(16, 59, 50));
        assert_relative_eq!(snapshot.bid_price.unwrap().0, 19.75);
        assert_relative_eq!(snapshot.ask_price.unwrap().0, 19.95);
    }

    #[test]
    fn test_closing_ignores_event_timestamp() {
        let ticks = vec![make_quote(16, 59, 10, 19.7, 19.9), make_quote(16, 59, 50, 19.75, 19.95)];
        let config = QuoteConfig::default();
        let early = find_bid_ask_prices(&ticks, at(17, 4, 0), true, &config);
        let late = find_bid_ask_prices(&ticks, at(17, 5, 59), true, &config);
        assert_eq!(early, late);
        assert_eq!(early, (Some(19.75), Some(19.95)));
    }

    #[test]
    fn test_closing_band_upper_bound_exclusive() {
        let ticks = vec![make_quote(16, 59, 59, 19.7, 19.9), make_quote(17, 0, 0, 19.8, 20.0)];
        let (bid, _) = find_bid_ask_prices(&ticks, at(17, 5, 0), true, &QuoteConfig::default());
        assert_eq!(bid, Some(19.7));
    }

    #[test]
    fn test_closing_ignores_other_days() {
        let other_day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_time(hms(16, 59, 30).unwrap());
        let ticks = vec![Tick::quote(other_day, "CJLU", Some(1.0), Some(2.0))];
        let got = find_bid_ask_prices(&ticks, at(17, 5, 0), true, &QuoteConfig::default());
        assert_eq!(got, (None, None));
    }

    #[test]
    fn test_morning_takes_latest_quote_not_after_match() {
        let ticks = vec![
            make_quote(8, 58, 20, 9.8, 10.2),
            make_quote(8, 59, 40, 10.4, 10.6),
            make_quote(8, 59, 55, 10.5, 10.7),
        ];
        let event = make_event(EventKind::Morning, at(8, 59, 50), 10.5);
        let snapshot = BidAskResolver::default().resolve(&ticks, &event).unwrap();
        assert_eq!(snapshot.timestamp, at(8, 59, 40));
        assert_relative_eq!(snapshot.bid_price.unwrap().0, 10.4);
    }

    #[test]
    fn test_morning_includes_match_instant() {
        let ticks = vec![make_quote(8, 59, 50, 10.4, 10.6)];
        let got = find_bid_ask_prices(&ticks, at(8, 59, 50), false, &QuoteConfig::default());
        assert_eq!(got, (Some(10.4), Some(10.6)));
    }

    #[test]
    fn test_morning_lookback_limit() {
        let ticks = vec![make_quote(8, 57, 0, 9.0, 9.5)];
        let config = QuoteConfig {
            morning_lookback_secs: 60,
            ..QuoteConfig::default()
        };
        let got = find_bid_ask_prices(&ticks, at(8, 59, 50), false, &config);
        assert_eq!(got, (None, None));
    }

    #[test]
    fn test_one_sided_quote_keeps_pair_from_same_tick() {
        let ticks = vec![
            make_quote(16, 59, 10, 19.7, 19.9),
            Tick::quote(at(16, 59, 40), "CJLU", Some(19.8), None),
        ];
        let got = find_bid_ask_prices(&ticks, at(17, 5, 0), true, &QuoteConfig::default());
        assert_eq!(got, (Some(19.8), None));
    }

    #[test]
    fn test_trade_only_ticks_do_not_qualify() {
        let ticks = vec![Tick::trade(at(16, 59, 30), "CJLU", 19.8)];
        let event = make_event(EventKind::Closing, at(17, 5, 0), 19.8);
        assert_eq!(BidAskResolver::default().resolve(&ticks, &event), None);
    }

    #[test]
    fn test_nan_quote_tick_skipped() {
        let ticks = vec![
            Tick::quote(at(8, 59, 40), "CJLU", Some(9.9), Some(10.1)),
            Tick::quote(at(8, 59, 50), "CJLU", Some(f64::NAN), Some(f64::NAN)),
        ];
        let (bid, ask) = find_bid_ask_prices(&ticks, at(8, 59, 55), false, &QuoteConfig::default());
        assert_relative_eq!(bid.unwrap(), 9.9);
        assert_relative_eq!(ask.unwrap(), 10.1);
    }

    #[test]
    fn test_nan_side_reported_absent() {
        let ticks = vec![Tick::quote(at(16, 59, 30), "CJLU", Some(19.75), Some(f64::NAN))];
        let (bid, ask) = find_bid_ask_prices(&ticks, at(17, 5, 0), true, &QuoteConfig::default());
        assert_relative_eq!(bid.unwrap(), 19.75);
        assert_eq!(ask, None);
    }
}

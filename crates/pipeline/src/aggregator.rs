//! Daily aggregation.
//!
//! Groups ticks by `(day, instrument)`, resolves both matching prices and
//! their quotes per group, and emits exactly one row per group.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use refprice_core::{Config, DailySummaryRow, Error, GroupKey, Result, Tick};
use refprice_ingestion::{RawTable, SessionFilter};
use refprice_resolvers::{BidAskResolver, MatchingPriceResolver};
use tracing::{debug, info, warn};

use crate::report::DailyReport;

/// Partition ticks into `(day, instrument)` groups, ascending by key.
///
/// Every tick lands in exactly one group; input order is kept within a group.
pub fn group_ticks(ticks: &[Tick]) -> BTreeMap<GroupKey, Vec<&Tick>> {
    let mut groups: BTreeMap<GroupKey, Vec<&Tick>> = BTreeMap::new();
    for tick in ticks {
        groups.entry(tick.group_key()).or_default().push(tick);
    }
    groups
}

/// Orchestrates the session filter and both resolvers over every group.
pub struct DailyAggregator {
    config: Config,
    session: SessionFilter,
    matching: MatchingPriceResolver,
    quotes: BidAskResolver,
    /// Dedicated pool when a worker count is configured.
    pool: Option<rayon::ThreadPool>,
}

impl DailyAggregator {
    /// Create an aggregator, validating the configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = if config.pipeline.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.pipeline.workers)
                .build()
                .map_err(|e| Error::config(format!("thread pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            session: SessionFilter::new(&config.session),
            matching: MatchingPriceResolver::new(&config.matching),
            quotes: BidAskResolver::new(&config.quotes),
            pool,
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve a single group.
    ///
    /// Absent sub-results never abort the group; a row is always returned.
    pub fn process_group(&self, key: &GroupKey, ticks: &[&Tick]) -> DailySummaryRow {
        let in_session = self.session.filter_refs(ticks.iter().copied());

        let morning = self.matching.morning(in_session.iter().copied());
        let closing = self.matching.closing(in_session.iter().copied());

        let morning_quote = morning
            .as_ref()
            .and_then(|event| self.quotes.resolve(in_session.iter().copied(), event));
        let closing_quote = closing
            .as_ref()
            .and_then(|event| self.quotes.resolve(in_session.iter().copied(), event));

        debug!(
            group = %key,
            ticks = ticks.len(),
            in_session = in_session.len(),
            morning = morning.is_some(),
            closing = closing.is_some(),
            "group resolved"
        );

        DailySummaryRow {
            day: key.day,
            instrument: key.instrument.clone(),
            morning,
            morning_quote,
            closing,
            closing_quote,
        }
    }

    /// Produce one summary row per `(day, instrument)` group, ascending by key.
    pub fn process(&self, ticks: &[Tick]) -> Vec<DailySummaryRow> {
        let start = Instant::now();
        let groups: Vec<(GroupKey, Vec<&Tick>)> = group_ticks(ticks).into_iter().collect();

        let rows: Vec<DailySummaryRow> = if groups.len() >= self.config.pipeline.min_parallel_groups {
            let run = || {
                groups
                    .par_iter()
                    .map(|(key, group)| self.process_group(key, group))
                    .collect::<Vec<_>>()
            };
            match &self.pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        } else {
            groups
                .iter()
                .map(|(key, group)| self.process_group(key, group))
                .collect()
        };

        info!(
            "Processed {} ticks into {} daily rows ({} morning, {} closing) in {:.2}ms",
            ticks.len(),
            rows.len(),
            rows.iter().filter(|r| r.morning.is_some()).count(),
            rows.iter().filter(|r| r.closing.is_some()).count(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        rows
    }

    /// Validate and convert a raw table, then process it.
    ///
    /// Fails only on schema errors; cell-level problems are reported in the
    /// returned [`DailyReport`].
    pub fn process_table(&self, table: &RawTable) -> Result<DailyReport> {
        let batch = table.to_ticks(&self.config.schema)?;
        if !batch.issues.is_empty() {
            warn!(
                "{} data quality issues while reading {} rows",
                batch.issues.len(),
                table.num_rows()
            );
        }

        let rows = self.process(&batch.ticks);
        Ok(DailyReport::new(rows, batch.issues))
    }
}

/// Run the daily pipeline over already-typed ticks.
pub fn process_daily_data(ticks: &[Tick], config: &Config) -> Result<Vec<DailySummaryRow>> {
    Ok(DailyAggregator::new(config.clone())?.process(ticks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, NaiveDateTime};
    use proptest::prelude::*;
    use refprice_core::hms;
    use refprice_ingestion::Cell;

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_time(hms(h, m, s).unwrap())
    }

    fn make_trade(inst: &str, day: u32, h: u32, m: u32, s: u32, price: f64) -> Tick {
        Tick::trade(at(day, h, m, s), inst, price)
    }

    fn make_quote(inst: &str, day: u32, h: u32, m: u32, s: u32, bid: f64, ask: f64) -> Tick {
        Tick::quote(at(day, h, m, s), inst, Some(bid), Some(ask))
    }

    fn aggregator() -> DailyAggregator {
        DailyAggregator::new(Config::default()).unwrap()
    }

    fn full_day(inst: &str, day: u32, base: f64) -> Vec<Tick> {
        vec![
            make_quote(inst, day, 8, 58, 10, base - 0.1, base + 0.1),
            make_trade(inst, day, 8, 58, 30, base),
            make_quote(inst, day, 8, 59, 45, base + 0.4, base + 0.6),
            make_trade(inst, day, 8, 59, 50, base + 0.5),
            make_trade(inst, day, 11, 0, 0, base + 3.0),
            make_quote(inst, day, 16, 59, 10, base + 9.7, base + 9.9),
            make_quote(inst, day, 16, 59, 50, base + 9.75, base + 9.95),
            make_trade(inst, day, 17, 4, 10, base + 9.8),
            make_trade(inst, day, 17, 5, 30, base + 10.0),
        ]
    }

    #[test]
    fn test_full_day_row() {
        let rows = aggregator().process(&full_day("CJLU", 4, 10.0));
        assert_eq!(rows.len(), 1);
        let row = &rows[0];

        assert_eq!(row.morning_timestamp(), Some(at(4, 8, 59, 50)));
        assert_relative_eq!(row.morning_price().unwrap(), 10.5);
        assert_relative_eq!(row.morning_bid().unwrap(), 10.4);
        assert_relative_eq!(row.morning_ask().unwrap(), 10.6);

        assert_eq!(row.closing_timestamp(), Some(at(4, 17, 5, 30)));
        assert_relative_eq!(row.closing_price().unwrap(), 20.0);
        assert_relative_eq!(row.closing_bid().unwrap(), 19.75);
        assert_relative_eq!(row.closing_ask().unwrap(), 19.95);
    }

    #[test]
    fn test_two_instruments_no_cross_contamination() {
        let mut ticks = full_day("AAA", 4, 10.0);
        ticks.extend(full_day("BBB", 4, 50.0));
        // interleave to make sure grouping does not rely on input order
        ticks.sort_by_key(|t| t.timestamp);

        let rows = aggregator().process(&ticks);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].instrument, "AAA");
        assert_eq!(rows[1].instrument, "BBB");
        assert_relative_eq!(rows[0].morning_price().unwrap(), 10.5);
        assert_relative_eq!(rows[1].morning_price().unwrap(), 50.5);
        assert_relative_eq!(rows[0].closing_bid().unwrap(), 19.75);
        assert_relative_eq!(rows[1].closing_bid().unwrap(), 59.75);
    }

    #[test]
    fn test_group_outside_bands_still_emits_row() {
        let ticks = vec![
            make_trade("CJLU", 4, 10, 0, 0, 10.0),
            make_quote("CJLU", 4, 13, 0, 0, 9.9, 10.1),
        ];
        let rows = aggregator().process(&ticks);
        assert_eq!(rows.len(), 1);
        let record = rows[0].to_record();
        assert!(rows[0].is_empty());
        assert_eq!(record.morning_price, None);
        assert_eq!(record.morning_bid, None);
        assert_eq!(record.closing_price, None);
        assert_eq!(record.closing_ask, None);
    }

    #[test]
    fn test_nan_prices_never_reach_the_row() {
        let ticks = vec![
            make_trade("CJLU", 4, 8, 58, 30, 10.0),
            make_quote("CJLU", 4, 8, 58, 20, 9.9, 10.1),
            make_quote("CJLU", 4, 8, 58, 25, f64::NAN, f64::NAN),
            make_trade("CJLU", 4, 8, 59, 59, f64::NAN),
        ];
        let row = &aggregator().process(&ticks)[0];
        assert_eq!(row.morning_timestamp(), Some(at(4, 8, 58, 30)));
        assert_relative_eq!(row.morning_price().unwrap(), 10.0);
        assert_relative_eq!(row.morning_bid().unwrap(), 9.9);
        assert_relative_eq!(row.morning_ask().unwrap(), 10.1);
    }

    #[test]
    fn test_missing_morning_does_not_abort_closing() {
        let ticks: Vec<Tick> = full_day("CJLU", 4, 10.0)
            .into_iter()
            .filter(|t| t.clock() >= hms(12, 0, 0).unwrap())
            .collect();
        let rows = aggregator().process(&ticks);
        assert_eq!(rows[0].morning, None);
        assert_eq!(rows[0].morning_quote, None);
        assert_relative_eq!(rows[0].closing_price().unwrap(), 20.0);
        assert_relative_eq!(rows[0].closing_ask().unwrap(), 19.95);
    }

    #[test]
    fn test_rows_ordered_by_day_then_instrument() {
        let mut ticks = full_day("ZZZ", 5, 1.0);
        ticks.extend(full_day("AAA", 5, 1.0));
        ticks.extend(full_day("ZZZ", 4, 1.0));
        let rows = aggregator().process(&ticks);
        let keys: Vec<(u32, &str)> = rows
            .iter()
            .map(|r| (chrono::Datelike::day(&r.day), r.instrument.as_str()))
            .collect();
        assert_eq!(keys, vec![(4, "ZZZ"), (5, "AAA"), (5, "ZZZ")]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let ticks: Vec<Tick> = (1..=20u32)
            .flat_map(|day| {
                ["AAA", "BBB", "CCC"]
                    .into_iter()
                    .flat_map(move |inst| full_day(inst, day, f64::from(day)))
            })
            .collect();

        let sequential = aggregator().process(&ticks);

        let mut config = Config::default();
        config.pipeline.min_parallel_groups = 1;
        config.pipeline.workers = 4;
        let parallel = DailyAggregator::new(config).unwrap().process(&ticks);

        assert_eq!(sequential.len(), 60);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_process_table_schema_error_before_processing() {
        let table = RawTable::new()
            .with_column("timestamp", ["2024-03-04D08:59:50"])
            .with_column("trade_price", [10.5])
            .with_column("bid_price", [Cell::Null])
            .with_column("ask_price", [Cell::Null]);
        let err = aggregator().process_table(&table).unwrap_err();
        assert!(matches!(err, Error::Schema { ref column } if column == "stockcode"));
    }

    #[test]
    fn test_process_table_bad_cell_is_local() {
        let table = RawTable::new()
            .with_column(
                "timestamp",
                ["2024-03-04D08:59:50.000000", "2024-03-04D17:05:30.000000", "2024-03-04D17:05:40.000000"],
            )
            .with_column("stockcode", ["CJLU", "CJLU", "CJLU"])
            .with_column("trade_price", ["10.5", "20.0", "n/a"])
            .with_column("bid_price", [Cell::Null, Cell::Null, Cell::Null])
            .with_column("ask_price", [Cell::Null, Cell::Null, Cell::Null]);

        let report = aggregator().process_table(&table).unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.issues.len(), 1);
        assert_relative_eq!(report.rows[0].morning_price().unwrap(), 10.5);
        // the malformed 17:05:40 print is absent, so the earlier one wins
        assert_relative_eq!(report.rows[0].closing_price().unwrap(), 20.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.quotes.closing_window = refprice_core::ClockBand::from_hms((16, 0, 0), (16, 30, 0)).unwrap();
        assert!(DailyAggregator::new(config).is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(process_daily_data(&[], &Config::default()).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_one_row_per_distinct_group(
            raw in prop::collection::vec((1u32..=5, 0usize..4, 0u32..86_400, 1.0f64..100.0), 0..200)
        ) {
            let instruments = ["AAA", "BBB", "CCC", "DDD"];
            let ticks: Vec<Tick> = raw
                .iter()
                .map(|&(day, inst, secs, price)| {
                    let ts = at(day, secs / 3600, (secs / 60) % 60, secs % 60);
                    Tick::trade(ts, instruments[inst], price)
                })
                .collect();

            let distinct: std::collections::BTreeSet<GroupKey> =
                ticks.iter().map(Tick::group_key).collect();
            let rows = aggregator().process(&ticks);

            prop_assert_eq!(rows.len(), distinct.len());
            let row_keys: Vec<GroupKey> = rows
                .iter()
                .map(|r| GroupKey { day: r.day, instrument: r.instrument.clone() })
                .collect();
            prop_assert_eq!(row_keys, distinct.into_iter().collect::<Vec<_>>());

            let grouped: usize = group_ticks(&ticks).values().map(Vec::len).sum();
            prop_assert_eq!(grouped, ticks.len());
        }
    }
}

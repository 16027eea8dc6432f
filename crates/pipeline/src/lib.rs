//! Daily aggregation pipeline for the reference-price extractor.
//!
//! This crate provides:
//! - Partitioning of ticks into `(day, instrument)` groups
//! - Per-group resolution of matching prices and quotes, fanned out on rayon
//! - The run report (summary rows plus data quality issues)

pub mod aggregator;
pub mod report;

pub use aggregator::{group_ticks, process_daily_data, DailyAggregator};
pub use report::DailyReport;

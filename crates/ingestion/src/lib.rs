//! Input normalization for the reference-price extractor.
//!
//! This crate handles:
//! - Schema validation of the raw tick table
//! - Timestamp and price cell parsing
//! - Session window filtering (pre-open and pre-close bands)

pub mod table;
pub mod session_filter;

pub use table::{Cell, DataQualityIssue, RawTable, TickBatch};
pub use session_filter::{session_filter, SessionFilter};

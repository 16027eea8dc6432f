//! Reference-price resolution for the reference-price extractor.
//!
//! This crate handles:
//! - Opening and closing matching-price selection
//! - Bid/ask resolution around a matching-price event

pub mod matching;
pub mod quotes;

pub use matching::{find_closing_matching_price, find_morning_matching_price, MatchingPriceResolver};
pub use quotes::{find_bid_ask_prices, BidAskResolver};

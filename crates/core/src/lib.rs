//! Core types and configuration for the reference-price extractor.
//!
//! This crate provides shared types used across all other crates:
//! - Tick, matching-price event and quote snapshot types
//! - Session clock bands and configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

//! Test doubles for sources and clocks.
//!
//! `MockSource` stands in for a pseudo-file so samplers, delta engines and
//! tickers can be exercised on any platform, including failing reads.
//! `scenarios` holds canned `/proc` contents.

pub mod scenarios;
mod source;

pub use source::{ManualClock, MockSource};

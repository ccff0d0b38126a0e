//! proctick-core - periodic sampling of Linux `/proc` pseudo-files.
//!
//! Provides:
//! - `collector` - pseudo-file handles, line tokenizer, per-domain samplers,
//!   delta engine and the periodic driver (`Ticker`)

pub mod collector;

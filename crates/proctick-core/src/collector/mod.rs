//! Sampling of Linux `/proc` pseudo-files.
//!
//! A pseudo-file is opened once and re-read from the start on every sample.
//! Each read yields one timestamped record; counter domains can be turned
//! into deltas between consecutive samples, and any of them can be driven on
//! a fixed interval by a [`Ticker`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Ticker                             │
//! │   timer ──► get() ──► outputs (rendezvous)                   │
//! │                  └──► errors  (unbounded)                    │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ Sample
//!                   ┌────────────┴────────────┐
//!            ┌──────▼──────┐           ┌──────▼──────┐
//!            │ DeltaEngine │──────────►│   Sampler   │
//!            │ prior/delta │           │ Domain + Clock
//!            └─────────────┘           └──────┬──────┘
//!                                             │
//!                          ┌──────────────────┼──────────────────┐
//!                   ┌──────▼──────┐    ┌──────▼──────┐    ┌──────▼──────┐
//!                   │  ProcFile   │    │  tokenizer  │    │   procfs    │
//!                   │ reset/lines │    │ split/parse │    │  domains    │
//!                   └─────────────┘    └─────────────┘    └─────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use proctick_core::collector::{Sampler, procfs::Stat};
//!
//! let mut stat = Sampler::<Stat>::open_default()?;
//! let record = stat.get()?;
//! ```
//!
//! ## Testing (with MockSource)
//!
//! ```
//! use proctick_core::collector::mock::{MockSource, scenarios};
//! use proctick_core::collector::procfs::Meminfo;
//! use proctick_core::collector::{ProcFile, Sampler};
//!
//! let file = ProcFile::from_reader(MockSource::with_content(scenarios::MEMINFO));
//! let mut sampler = Sampler::new(Meminfo, file);
//! let record = sampler.get().unwrap();
//! assert!(record.mem_total > 0);
//! ```

pub mod clock;
pub mod delta;
pub mod error;
pub mod mock;
pub mod procfs;
pub mod sampler;
pub mod source;
pub mod ticker;
pub mod tokenizer;

pub use clock::{Clock, SystemClock};
pub use delta::{Delta, DeltaEngine, counter_delta, per_second};
pub use error::{CollectError, NumError, ParseError};
pub use sampler::{DEFAULT_PROC_ROOT, Domain, Sample, Sampler};
pub use source::ProcFile;
pub use ticker::{Ticker, TickerError, TickerState};
pub use tokenizer::{FieldParser, ParsePolicy};

//! Generic sampler: one timestamped record per call.
//!
//! A metric domain only describes how lines map to fields ([`Domain`]); the
//! rewind / read / dispatch loop lives here once.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::collector::clock::{Clock, SystemClock};
use crate::collector::error::{CollectError, ParseError};
use crate::collector::source::ProcFile;
use crate::collector::tokenizer::{FieldParser, ParsePolicy};

/// Default mount point of procfs.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Field layout of one pseudo-file.
///
/// Sub-entity domains keep the entity being filled in `self` and follow
/// flush-then-start-new: the in-progress entity is pushed when the next
/// start marker shows up, and [`finish`](Domain::finish) pushes the last one.
pub trait Domain: Send {
    type Record: Send;

    /// Short name used in logs and output frames.
    const NAME: &'static str;

    /// Path of the source relative to the procfs root.
    const PATH: &'static str;

    /// Starts a new record. Must also drop any per-sample state left over
    /// from an aborted previous call.
    fn begin(&mut self, timestamp: i64) -> Self::Record;

    /// Dispatches one raw line. Unknown labels are ignored.
    fn parse_line(
        &mut self,
        line: &[u8],
        record: &mut Self::Record,
        parser: &mut FieldParser,
    ) -> Result<(), ParseError>;

    /// Called once after the last line.
    fn finish(&mut self, _record: &mut Self::Record) {}
}

/// Anything that yields one value per call; the unit a ticker drives.
pub trait Sample {
    type Output;

    fn get(&mut self) -> Result<Self::Output, CollectError>;

    /// Errors recovered during the last successful `get`.
    fn take_diagnostics(&mut self) -> Vec<ParseError> {
        Vec::new()
    }
}

/// Drives a [`ProcFile`] and a [`Domain`] to produce records.
pub struct Sampler<D, R = File> {
    file: ProcFile<R>,
    domain: D,
    clock: Arc<dyn Clock>,
    parser: FieldParser,
}

impl<D: Domain + Default> Sampler<D, File> {
    /// Opens the domain's source under `/proc`.
    pub fn open_default() -> Result<Self, CollectError> {
        Self::open_in(DEFAULT_PROC_ROOT)
    }

    /// Opens the domain's source under a custom procfs root.
    pub fn open_in(proc_root: impl AsRef<Path>) -> Result<Self, CollectError> {
        let file = ProcFile::open(proc_root.as_ref().join(D::PATH))?;
        Ok(Self::new(D::default(), file))
    }
}

impl<D: Domain, R: Read + Seek> Sampler<D, R> {
    pub fn new(domain: D, file: ProcFile<R>) -> Self {
        Self {
            file,
            domain,
            clock: Arc::new(SystemClock),
            parser: FieldParser::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: ParsePolicy) -> Self {
        self.parser.set_policy(policy);
        self
    }

    pub fn policy(&self) -> ParsePolicy {
        self.parser.policy()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Takes a fresh sample of the whole source.
    ///
    /// A read error discards the partial record.
    pub fn get(&mut self) -> Result<D::Record, CollectError> {
        self.parser.clear();
        self.file.reset()?;

        let mut record = self.domain.begin(self.clock.now_nanos());
        while let Some(line) = self.file.read_line()? {
            self.domain.parse_line(line, &mut record, &mut self.parser)?;
        }
        self.domain.finish(&mut record);

        for diag in self.parser.diagnostics() {
            warn!(domain = D::NAME, "{}: substituted zero for {}", self.file.path().display(), diag);
        }
        trace!(domain = D::NAME, "sampled {}", self.file.path().display());

        Ok(record)
    }

    /// Errors recovered under the lenient policy during the last `get`.
    pub fn diagnostics(&self) -> &[ParseError] {
        self.parser.diagnostics()
    }
}

impl<D: Domain, R: Read + Seek> Sample for Sampler<D, R> {
    type Output = D::Record;

    fn get(&mut self) -> Result<D::Record, CollectError> {
        Sampler::get(self)
    }

    fn take_diagnostics(&mut self) -> Vec<ParseError> {
        self.parser.take_diagnostics()
    }
}

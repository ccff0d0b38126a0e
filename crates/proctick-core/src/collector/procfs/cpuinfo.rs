//! `/proc/cpuinfo`: one `key : value` block per logical processor.

use serde::{Deserialize, Serialize};

use crate::collector::error::{NumError, ParseError};
use crate::collector::sampler::Domain;
use crate::collector::tokenizer::{FieldParser, Separator, parse_u64, split_key_value};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessorInfo {
    pub processor: u32,
    pub vendor_id: String,
    pub model_name: String,
    pub cpu_family: u32,
    pub model: u32,
    /// Current frequency in MHz.
    pub mhz: f64,
    pub cache_size_kb: u64,
    pub physical_id: u32,
    pub core_id: u32,
    pub cpu_cores: u32,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CpuinfoRecord {
    pub timestamp: i64,
    /// Processors in file order.
    pub processors: Vec<ProcessorInfo>,
}

impl CpuinfoRecord {
    /// Number of distinct `(physical id, core id)` pairs.
    pub fn physical_cores(&self) -> usize {
        let mut seen: Vec<(u32, u32)> = self
            .processors
            .iter()
            .map(|p| (p.physical_id, p.core_id))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

/// A `processor` line starts a new block; keys before the first one are
/// ignored.
#[derive(Debug, Default)]
pub struct Cpuinfo {
    current: Option<ProcessorInfo>,
}

impl Cpuinfo {
    fn flush(&mut self, record: &mut CpuinfoRecord) {
        if let Some(done) = self.current.take() {
            record.processors.push(done);
        }
    }
}

impl Domain for Cpuinfo {
    type Record = CpuinfoRecord;
    const NAME: &'static str = "cpuinfo";
    const PATH: &'static str = "cpuinfo";

    fn begin(&mut self, timestamp: i64) -> CpuinfoRecord {
        self.current = None;
        CpuinfoRecord {
            timestamp,
            processors: Vec::new(),
        }
    }

    fn parse_line(
        &mut self,
        line: &[u8],
        record: &mut CpuinfoRecord,
        parser: &mut FieldParser,
    ) -> Result<(), ParseError> {
        let Some((name, value)) = split_key_value(line, Separator::Colon) else {
            return Ok(());
        };

        if name == b"processor" {
            self.flush(record);
            let id = parse_u64(value).map_err(|kind| ParseError::new("processor", kind))?;
            let processor =
                u32::try_from(id).map_err(|_| ParseError::new("processor", NumError::Overflow))?;
            self.current = Some(ProcessorInfo {
                processor,
                ..Default::default()
            });
            return Ok(());
        }

        let Some(cpu) = self.current.as_mut() else {
            return Ok(());
        };
        match name {
            b"vendor_id" => cpu.vendor_id = String::from_utf8_lossy(value).into_owned(),
            b"model name" => cpu.model_name = String::from_utf8_lossy(value).into_owned(),
            b"cpu family" => cpu.cpu_family = narrow(parser.u64("cpu family", value)?),
            b"model" => cpu.model = narrow(parser.u64("model", value)?),
            b"cpu MHz" => cpu.mhz = parser.f64("cpu MHz", value)?,
            b"cache size" => cpu.cache_size_kb = parser.leading_u64("cache size", value)?,
            b"physical id" => cpu.physical_id = narrow(parser.u64("physical id", value)?),
            b"core id" => cpu.core_id = narrow(parser.u64("core id", value)?),
            b"cpu cores" => cpu.cpu_cores = narrow(parser.u64("cpu cores", value)?),
            _ => {}
        }
        Ok(())
    }

    fn finish(&mut self, record: &mut CpuinfoRecord) {
        self.flush(record);
    }
}

fn narrow(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

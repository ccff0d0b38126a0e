//! `/proc/meminfo`: memory usage gauges, in kB.

use serde::{Deserialize, Serialize};

use crate::collector::error::ParseError;
use crate::collector::sampler::Domain;
use crate::collector::tokenizer::{FieldParser, Separator, split_key_value};

/// Memory statistics. All sizes are in kB as reported by the kernel.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MeminfoRecord {
    pub timestamp: i64,
    pub mem_total: u64,
    pub mem_free: u64,
    /// Estimate of memory available for new workloads without swapping.
    pub mem_available: u64,
    pub buffers: u64,
    pub cached: u64,
    pub swap_cached: u64,
    pub active: u64,
    pub inactive: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub dirty: u64,
    pub writeback: u64,
    pub slab: u64,
    pub s_reclaimable: u64,
    pub s_unreclaim: u64,
}

impl MeminfoRecord {
    /// Memory in use, excluding reclaimable caches.
    pub fn used(&self) -> u64 {
        self.mem_total.saturating_sub(self.mem_available)
    }
}

/// `Name:   value kB` lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct Meminfo;

impl Domain for Meminfo {
    type Record = MeminfoRecord;
    const NAME: &'static str = "meminfo";
    const PATH: &'static str = "meminfo";

    fn begin(&mut self, timestamp: i64) -> MeminfoRecord {
        MeminfoRecord {
            timestamp,
            ..Default::default()
        }
    }

    fn parse_line(
        &mut self,
        line: &[u8],
        record: &mut MeminfoRecord,
        parser: &mut FieldParser,
    ) -> Result<(), ParseError> {
        let Some((name, value)) = split_key_value(line, Separator::Colon) else {
            return Ok(());
        };

        let (field, slot) = match name {
            b"MemTotal" => ("MemTotal", &mut record.mem_total),
            b"MemFree" => ("MemFree", &mut record.mem_free),
            b"MemAvailable" => ("MemAvailable", &mut record.mem_available),
            b"Buffers" => ("Buffers", &mut record.buffers),
            b"Cached" => ("Cached", &mut record.cached),
            b"SwapCached" => ("SwapCached", &mut record.swap_cached),
            b"Active" => ("Active", &mut record.active),
            b"Inactive" => ("Inactive", &mut record.inactive),
            b"SwapTotal" => ("SwapTotal", &mut record.swap_total),
            b"SwapFree" => ("SwapFree", &mut record.swap_free),
            b"Dirty" => ("Dirty", &mut record.dirty),
            b"Writeback" => ("Writeback", &mut record.writeback),
            b"Slab" => ("Slab", &mut record.slab),
            b"SReclaimable" => ("SReclaimable", &mut record.s_reclaimable),
            b"SUnreclaim" => ("SUnreclaim", &mut record.s_unreclaim),
            _ => return Ok(()),
        };
        *slot = parser.leading_u64(field, value)?;
        Ok(())
    }
}

//! `/proc/vmstat`: virtual memory event counters.

use serde::{Deserialize, Serialize};

use crate::collector::delta::{Delta, counter_delta};
use crate::collector::error::ParseError;
use crate::collector::sampler::Domain;
use crate::collector::tokenizer::{FieldParser, Separator, split_key_value};

/// Selected counters from `/proc/vmstat`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct VmstatRecord {
    pub timestamp: i64,
    /// Pages paged in from disk.
    pub pgpgin: u64,
    /// Pages paged out to disk.
    pub pgpgout: u64,
    /// Pages swapped in.
    pub pswpin: u64,
    /// Pages swapped out.
    pub pswpout: u64,
    pub pgfault: u64,
    pub pgmajfault: u64,
    pub pgsteal_kswapd: u64,
    pub pgsteal_direct: u64,
    pub pgscan_kswapd: u64,
    pub pgscan_direct: u64,
    pub oom_kill: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct VmstatDelta {
    /// Capture time of the current sample.
    pub timestamp: i64,
    pub time_delta: i64,
    pub pgpgin: i64,
    pub pgpgout: i64,
    pub pswpin: i64,
    pub pswpout: i64,
    pub pgfault: i64,
    pub pgmajfault: i64,
    pub pgsteal_kswapd: i64,
    pub pgsteal_direct: i64,
    pub pgscan_kswapd: i64,
    pub pgscan_direct: i64,
    pub oom_kill: i64,
}

/// `name value` lines; anything not listed in [`VmstatRecord`] is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vmstat;

impl Domain for Vmstat {
    type Record = VmstatRecord;
    const NAME: &'static str = "vmstat";
    const PATH: &'static str = "vmstat";

    fn begin(&mut self, timestamp: i64) -> VmstatRecord {
        VmstatRecord {
            timestamp,
            ..Default::default()
        }
    }

    fn parse_line(
        &mut self,
        line: &[u8],
        record: &mut VmstatRecord,
        parser: &mut FieldParser,
    ) -> Result<(), ParseError> {
        let Some((name, value)) = split_key_value(line, Separator::Whitespace) else {
            return Ok(());
        };
        // Most of the ~170 lines are nr_* gauges; discard them on the first byte.
        if name.first() != Some(&b'p') && name != b"oom_kill" {
            return Ok(());
        }

        let (field, slot) = match name {
            b"pgpgin" => ("pgpgin", &mut record.pgpgin),
            b"pgpgout" => ("pgpgout", &mut record.pgpgout),
            b"pswpin" => ("pswpin", &mut record.pswpin),
            b"pswpout" => ("pswpout", &mut record.pswpout),
            b"pgfault" => ("pgfault", &mut record.pgfault),
            b"pgmajfault" => ("pgmajfault", &mut record.pgmajfault),
            b"pgsteal_kswapd" => ("pgsteal_kswapd", &mut record.pgsteal_kswapd),
            b"pgsteal_direct" => ("pgsteal_direct", &mut record.pgsteal_direct),
            b"pgscan_kswapd" => ("pgscan_kswapd", &mut record.pgscan_kswapd),
            b"pgscan_direct" => ("pgscan_direct", &mut record.pgscan_direct),
            b"oom_kill" => ("oom_kill", &mut record.oom_kill),
            _ => return Ok(()),
        };
        *slot = parser.u64(field, value)?;
        Ok(())
    }
}

impl Delta for VmstatRecord {
    type Output = VmstatDelta;

    fn delta(&self, prior: &Self) -> VmstatDelta {
        VmstatDelta {
            timestamp: self.timestamp,
            time_delta: self.timestamp - prior.timestamp,
            pgpgin: counter_delta(self.pgpgin, prior.pgpgin),
            pgpgout: counter_delta(self.pgpgout, prior.pgpgout),
            pswpin: counter_delta(self.pswpin, prior.pswpin),
            pswpout: counter_delta(self.pswpout, prior.pswpout),
            pgfault: counter_delta(self.pgfault, prior.pgfault),
            pgmajfault: counter_delta(self.pgmajfault, prior.pgmajfault),
            pgsteal_kswapd: counter_delta(self.pgsteal_kswapd, prior.pgsteal_kswapd),
            pgsteal_direct: counter_delta(self.pgsteal_direct, prior.pgsteal_direct),
            pgscan_kswapd: counter_delta(self.pgscan_kswapd, prior.pgscan_kswapd),
            pgscan_direct: counter_delta(self.pgscan_direct, prior.pgscan_direct),
            oom_kill: counter_delta(self.oom_kill, prior.oom_kill),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockSource, scenarios};
    use crate::collector::sampler::Sampler;
    use crate::collector::source::ProcFile;

    #[test]
    fn test_parse_vmstat() {
        let mut sampler = Sampler::new(
            Vmstat,
            ProcFile::from_reader(MockSource::with_content(scenarios::VMSTAT)),
        );
        let info = sampler.get().unwrap();

        assert_eq!(info.pgpgin, 123456);
        assert_eq!(info.pgpgout, 654321);
        assert_eq!(info.pswpin, 100);
        assert_eq!(info.pswpout, 200);
        assert_eq!(info.pgfault, 999999);
        assert_eq!(info.pgmajfault, 1234);
        assert_eq!(info.pgsteal_kswapd, 5000);
        assert_eq!(info.pgsteal_direct, 1000);
        assert_eq!(info.pgscan_kswapd, 10000);
        assert_eq!(info.pgscan_direct, 2000);
        assert_eq!(info.oom_kill, 5);
        assert!(sampler.diagnostics().is_empty());
    }

    #[test]
    fn test_bad_counter_is_reported_by_name() {
        let mut sampler = Sampler::new(
            Vmstat,
            ProcFile::from_reader(MockSource::with_content("pgfault 12x\npgpgin 3\noom_kill ?\n")),
        );
        let info = sampler.get().unwrap();
        assert_eq!(info.pgfault, 0);
        assert_eq!(info.pgpgin, 3);
        let fields: Vec<&str> = sampler.diagnostics().iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, ["pgfault", "oom_kill"]);
    }
}

//! `/proc/loadavg`: load averages and scheduler entity counts.

use memchr::memchr;
use serde::{Deserialize, Serialize};

use crate::collector::error::ParseError;
use crate::collector::sampler::Domain;
use crate::collector::tokenizer::{Columns, FieldParser, strip_terminator, trim_blanks};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct LoadavgRecord {
    pub timestamp: i64,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    /// Currently runnable scheduling entities.
    pub running: u32,
    /// Scheduling entities that exist on the system.
    pub total: u32,
    pub last_pid: u32,
}

/// Single line: `0.15 0.10 0.05 1/150 1234`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Loadavg;

impl Domain for Loadavg {
    type Record = LoadavgRecord;
    const NAME: &'static str = "loadavg";
    const PATH: &'static str = "loadavg";

    fn begin(&mut self, timestamp: i64) -> LoadavgRecord {
        LoadavgRecord {
            timestamp,
            ..Default::default()
        }
    }

    fn parse_line(
        &mut self,
        line: &[u8],
        record: &mut LoadavgRecord,
        parser: &mut FieldParser,
    ) -> Result<(), ParseError> {
        if trim_blanks(strip_terminator(line)).is_empty() {
            return Ok(());
        }
        let mut cols = Columns::new(line);
        record.load1 = cols.next_f64(parser, "load1")?;
        record.load5 = cols.next_f64(parser, "load5")?;
        record.load15 = cols.next_f64(parser, "load15")?;

        if let Some(tasks) = cols.next_token() {
            let (running, total) = match memchr(b'/', tasks) {
                Some(slash) => (&tasks[..slash], &tasks[slash + 1..]),
                None => (tasks, &tasks[tasks.len()..]),
            };
            record.running = to_u32(parser.u64("running", running)?);
            record.total = to_u32(parser.u64("total", total)?);
        }
        record.last_pid = to_u32(cols.next_u64(parser, "last_pid")?);
        Ok(())
    }
}

fn to_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockSource, scenarios};
    use crate::collector::sampler::Sampler;
    use crate::collector::source::ProcFile;

    #[test]
    fn test_parse_loadavg() {
        let mut sampler = Sampler::new(
            Loadavg,
            ProcFile::from_reader(MockSource::with_content(scenarios::LOADAVG)),
        );
        let load = sampler.get().unwrap();

        assert!((load.load1 - 0.15).abs() < 0.001);
        assert!((load.load5 - 0.10).abs() < 0.001);
        assert!((load.load15 - 0.05).abs() < 0.001);
        assert_eq!(load.running, 1);
        assert_eq!(load.total, 150);
        assert_eq!(load.last_pid, 1234);
    }

    #[test]
    fn test_missing_slash_reports_total() {
        let mut sampler = Sampler::new(
            Loadavg,
            ProcFile::from_reader(MockSource::with_content("1.0 2.0 3.0 4 5\n")),
        );
        let load = sampler.get().unwrap();
        assert_eq!(load.running, 4);
        assert_eq!(load.total, 0);
        assert_eq!(load.last_pid, 5);
        assert_eq!(sampler.diagnostics()[0].field, "total");
    }
}

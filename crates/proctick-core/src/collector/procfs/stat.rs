//! `/proc/stat`: CPU time counters and scheduler totals.

use serde::{Deserialize, Serialize};

use crate::collector::delta::{Delta, counter_delta, diff_entities, per_second};
use crate::collector::error::{NumError, ParseError};
use crate::collector::sampler::Domain;
use crate::collector::tokenizer::{Columns, FieldParser, Separator, parse_u64, split_key_value};

/// One `cpu`/`cpuN` line. Values are cumulative jiffies.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CpuTimes {
    /// `None` for the aggregate `cpu` line, `Some(n)` for `cpuN`.
    pub cpu: Option<u32>,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    /// Columns in `/proc/stat` order.
    pub fn values(&self) -> [u64; 10] {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ]
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct StatRecord {
    pub timestamp: i64,
    /// Aggregate line first (when present), then per-CPU lines in file order.
    pub cpus: Vec<CpuTimes>,
    /// Context switches since boot.
    pub ctxt: u64,
    /// Boot time, seconds since the epoch.
    pub btime: u64,
    /// Forks since boot.
    pub processes: u64,
    pub procs_running: u32,
    pub procs_blocked: u32,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CpuTimesDelta {
    pub cpu: Option<u32>,
    pub user: i64,
    pub nice: i64,
    pub system: i64,
    pub idle: i64,
    pub iowait: i64,
    pub irq: i64,
    pub softirq: i64,
    pub steal: i64,
    pub guest: i64,
    pub guest_nice: i64,
}

impl CpuTimesDelta {
    /// Jiffies elapsed on this CPU. Guest time is already part of user/nice.
    pub fn total(&self) -> i64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Fraction of elapsed time spent neither idle nor waiting on I/O.
    pub fn busy_ratio(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| (total - self.idle - self.iowait) as f64 / total as f64)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct StatDelta {
    /// Capture time of the current sample.
    pub timestamp: i64,
    pub time_delta: i64,
    pub cpus: Vec<CpuTimesDelta>,
    pub ctxt: i64,
    pub processes: i64,
    /// Gauge, current value.
    pub procs_running: u32,
    /// Gauge, current value.
    pub procs_blocked: u32,
    /// CPUs appeared or disappeared between the two samples.
    pub topology_changed: bool,
}

impl StatDelta {
    pub fn ctxt_per_sec(&self) -> Option<f64> {
        per_second(self.ctxt, self.time_delta)
    }

    pub fn forks_per_sec(&self) -> Option<f64> {
        per_second(self.processes, self.time_delta)
    }
}

/// Columnar `label n1 n2 ...` lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stat;

impl Domain for Stat {
    type Record = StatRecord;
    const NAME: &'static str = "stat";
    const PATH: &'static str = "stat";

    fn begin(&mut self, timestamp: i64) -> StatRecord {
        StatRecord {
            timestamp,
            ..Default::default()
        }
    }

    fn parse_line(
        &mut self,
        line: &[u8],
        record: &mut StatRecord,
        parser: &mut FieldParser,
    ) -> Result<(), ParseError> {
        let Some((label, value)) = split_key_value(line, Separator::Whitespace) else {
            return Ok(());
        };

        if let Some(suffix) = label.strip_prefix(b"cpu") {
            let cpu = if suffix.is_empty() {
                None
            } else {
                let id = parse_u64(suffix).map_err(|kind| ParseError::new("cpu", kind))?;
                Some(u32::try_from(id).map_err(|_| ParseError::new("cpu", NumError::Overflow))?)
            };
            record.cpus.push(parse_cpu_line(cpu, value, parser)?);
            return Ok(());
        }

        match label {
            b"ctxt" => record.ctxt = parser.u64("ctxt", value)?,
            b"btime" => record.btime = parser.u64("btime", value)?,
            b"processes" => record.processes = parser.u64("processes", value)?,
            b"procs_running" => {
                record.procs_running = saturate(parser.u64("procs_running", value)?)
            }
            b"procs_blocked" => {
                record.procs_blocked = saturate(parser.u64("procs_blocked", value)?)
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_cpu_line(
    cpu: Option<u32>,
    value: &[u8],
    parser: &mut FieldParser,
) -> Result<CpuTimes, ParseError> {
    let mut cols = Columns::new(value);
    Ok(CpuTimes {
        cpu,
        user: cols.next_u64(parser, "user")?,
        nice: cols.next_u64(parser, "nice")?,
        system: cols.next_u64(parser, "system")?,
        idle: cols.next_u64(parser, "idle")?,
        iowait: cols.next_u64(parser, "iowait")?,
        irq: cols.next_u64(parser, "irq")?,
        softirq: cols.next_u64(parser, "softirq")?,
        steal: cols.next_u64(parser, "steal")?,
        guest: cols.next_u64(parser, "guest")?,
        guest_nice: cols.next_u64(parser, "guest_nice")?,
    })
}

fn saturate(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

impl Delta for StatRecord {
    type Output = StatDelta;

    fn delta(&self, prior: &Self) -> StatDelta {
        let (cpus, topology_changed) =
            diff_entities(&self.cpus, &prior.cpus, |c| c.cpu, |cur, prev| CpuTimesDelta {
                cpu: cur.cpu,
                user: counter_delta(cur.user, prev.user),
                nice: counter_delta(cur.nice, prev.nice),
                system: counter_delta(cur.system, prev.system),
                idle: counter_delta(cur.idle, prev.idle),
                iowait: counter_delta(cur.iowait, prev.iowait),
                irq: counter_delta(cur.irq, prev.irq),
                softirq: counter_delta(cur.softirq, prev.softirq),
                steal: counter_delta(cur.steal, prev.steal),
                guest: counter_delta(cur.guest, prev.guest),
                guest_nice: counter_delta(cur.guest_nice, prev.guest_nice),
            });

        StatDelta {
            timestamp: self.timestamp,
            time_delta: self.timestamp - prior.timestamp,
            cpus,
            ctxt: counter_delta(self.ctxt, prior.ctxt),
            processes: counter_delta(self.processes, prior.processes),
            procs_running: self.procs_running,
            procs_blocked: self.procs_blocked,
            topology_changed,
        }
    }
}

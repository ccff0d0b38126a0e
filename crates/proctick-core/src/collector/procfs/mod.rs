//! Metric domains backed by `/proc` pseudo-files.
//!
//! Each domain is a [`Domain`](crate::collector::sampler::Domain)
//! implementation plus its record types. Domains whose fields are monotonic
//! counters also implement [`Delta`](crate::collector::delta::Delta).

pub mod cpuinfo;
pub mod loadavg;
pub mod meminfo;
pub mod net_dev;
pub mod stat;
pub mod vmstat;

pub use cpuinfo::{Cpuinfo, CpuinfoRecord, ProcessorInfo};
pub use loadavg::{Loadavg, LoadavgRecord};
pub use meminfo::{Meminfo, MeminfoRecord};
pub use net_dev::{InterfaceCounters, InterfaceDelta, NetDev, NetDevDelta, NetDevRecord};
pub use stat::{CpuTimes, CpuTimesDelta, Stat, StatDelta, StatRecord};
pub use vmstat::{Vmstat, VmstatDelta, VmstatRecord};

//! `/proc/net/dev`: per-interface traffic counters.

use serde::{Deserialize, Serialize};

use crate::collector::delta::{Delta, counter_delta, diff_entities, per_second};
use crate::collector::error::ParseError;
use crate::collector::sampler::Domain;
use crate::collector::tokenizer::{Columns, FieldParser, Separator, split_key_value};

/// Counters of one interface, in the 16-column kernel order.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub rx_fifo: u64,
    pub rx_frame: u64,
    pub rx_compressed: u64,
    pub rx_multicast: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
    pub tx_fifo: u64,
    pub tx_colls: u64,
    pub tx_carrier: u64,
    pub tx_compressed: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetDevRecord {
    pub timestamp: i64,
    /// Interfaces in file order.
    pub interfaces: Vec<InterfaceCounters>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct InterfaceDelta {
    pub name: String,
    pub rx_bytes: i64,
    pub rx_packets: i64,
    pub rx_errs: i64,
    pub rx_drop: i64,
    pub rx_fifo: i64,
    pub rx_frame: i64,
    pub rx_compressed: i64,
    pub rx_multicast: i64,
    pub tx_bytes: i64,
    pub tx_packets: i64,
    pub tx_errs: i64,
    pub tx_drop: i64,
    pub tx_fifo: i64,
    pub tx_colls: i64,
    pub tx_carrier: i64,
    pub tx_compressed: i64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetDevDelta {
    /// Capture time of the current sample.
    pub timestamp: i64,
    pub time_delta: i64,
    /// Interfaces present in both samples, in current file order.
    pub interfaces: Vec<InterfaceDelta>,
    /// Interfaces appeared or disappeared between the two samples.
    pub topology_changed: bool,
}

impl NetDevDelta {
    pub fn interface(&self, name: &str) -> Option<&InterfaceDelta> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// `(rx, tx)` bytes per second for one interface.
    pub fn throughput(&self, name: &str) -> Option<(f64, f64)> {
        let iface = self.interface(name)?;
        Some((
            per_second(iface.rx_bytes, self.time_delta)?,
            per_second(iface.tx_bytes, self.time_delta)?,
        ))
    }
}

/// `iface: n1 ... n16` lines after two header lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetDev;

impl Domain for NetDev {
    type Record = NetDevRecord;
    const NAME: &'static str = "net_dev";
    const PATH: &'static str = "net/dev";

    fn begin(&mut self, timestamp: i64) -> NetDevRecord {
        NetDevRecord {
            timestamp,
            interfaces: Vec::new(),
        }
    }

    fn parse_line(
        &mut self,
        line: &[u8],
        record: &mut NetDevRecord,
        parser: &mut FieldParser,
    ) -> Result<(), ParseError> {
        // Header lines carry no colon.
        let Some((name, value)) = split_key_value(line, Separator::Colon) else {
            return Ok(());
        };
        if name.is_empty() {
            return Ok(());
        }

        let mut cols = Columns::new(value);
        record.interfaces.push(InterfaceCounters {
            name: String::from_utf8_lossy(name).into_owned(),
            rx_bytes: cols.next_u64(parser, "rx_bytes")?,
            rx_packets: cols.next_u64(parser, "rx_packets")?,
            rx_errs: cols.next_u64(parser, "rx_errs")?,
            rx_drop: cols.next_u64(parser, "rx_drop")?,
            rx_fifo: cols.next_u64(parser, "rx_fifo")?,
            rx_frame: cols.next_u64(parser, "rx_frame")?,
            rx_compressed: cols.next_u64(parser, "rx_compressed")?,
            rx_multicast: cols.next_u64(parser, "rx_multicast")?,
            tx_bytes: cols.next_u64(parser, "tx_bytes")?,
            tx_packets: cols.next_u64(parser, "tx_packets")?,
            tx_errs: cols.next_u64(parser, "tx_errs")?,
            tx_drop: cols.next_u64(parser, "tx_drop")?,
            tx_fifo: cols.next_u64(parser, "tx_fifo")?,
            tx_colls: cols.next_u64(parser, "tx_colls")?,
            tx_carrier: cols.next_u64(parser, "tx_carrier")?,
            tx_compressed: cols.next_u64(parser, "tx_compressed")?,
        });
        Ok(())
    }
}

impl Delta for NetDevRecord {
    type Output = NetDevDelta;

    fn delta(&self, prior: &Self) -> NetDevDelta {
        let (interfaces, topology_changed) = diff_entities(
            &self.interfaces,
            &prior.interfaces,
            |i| i.name.as_str(),
            |cur, prev| InterfaceDelta {
                name: cur.name.clone(),
                rx_bytes: counter_delta(cur.rx_bytes, prev.rx_bytes),
                rx_packets: counter_delta(cur.rx_packets, prev.rx_packets),
                rx_errs: counter_delta(cur.rx_errs, prev.rx_errs),
                rx_drop: counter_delta(cur.rx_drop, prev.rx_drop),
                rx_fifo: counter_delta(cur.rx_fifo, prev.rx_fifo),
                rx_frame: counter_delta(cur.rx_frame, prev.rx_frame),
                rx_compressed: counter_delta(cur.rx_compressed, prev.rx_compressed),
                rx_multicast: counter_delta(cur.rx_multicast, prev.rx_multicast),
                tx_bytes: counter_delta(cur.tx_bytes, prev.tx_bytes),
                tx_packets: counter_delta(cur.tx_packets, prev.tx_packets),
                tx_errs: counter_delta(cur.tx_errs, prev.tx_errs),
                tx_drop: counter_delta(cur.tx_drop, prev.tx_drop),
                tx_fifo: counter_delta(cur.tx_fifo, prev.tx_fifo),
                tx_colls: counter_delta(cur.tx_colls, prev.tx_colls),
                tx_carrier: counter_delta(cur.tx_carrier, prev.tx_carrier),
                tx_compressed: counter_delta(cur.tx_compressed, prev.tx_compressed),
            },
        );

        NetDevDelta {
            timestamp: self.timestamp,
            time_delta: self.timestamp - prior.timestamp,
            interfaces,
            topology_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockSource, scenarios};
    use crate::collector::sampler::Sampler;
    use crate::collector::source::ProcFile;

    fn sample(content: &str) -> NetDevRecord {
        Sampler::new(NetDev, ProcFile::from_reader(MockSource::with_content(content)))
            .get()
            .unwrap()
    }

    #[test]
    fn test_parse_net_dev() {
        let devices = sample(scenarios::NET_DEV).interfaces;

        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].name, "lo");
        assert_eq!(devices[0].rx_bytes, 1234567);
        assert_eq!(devices[0].rx_packets, 1234);
        assert_eq!(devices[0].rx_errs, 0);
        assert_eq!(devices[0].tx_bytes, 1234567);
        assert_eq!(devices[0].tx_packets, 1234);

        assert_eq!(devices[1].name, "eth0");
        assert_eq!(devices[1].rx_bytes, 9876543);
        assert_eq!(devices[1].rx_errs, 1);
        assert_eq!(devices[1].rx_drop, 2);
        assert_eq!(devices[1].rx_multicast, 10);
        assert_eq!(devices[1].tx_bytes, 87654321);
        assert_eq!(devices[1].tx_errs, 3);
        assert_eq!(devices[1].tx_drop, 4);
    }

    #[test]
    fn test_counter_glued_to_colon() {
        // Large counters leave no space after the colon on old kernels.
        let devices = sample("  eth1:4294967296 7 0 0 0 0 0 0 1 2 0 0 0 0 0 0\n").interfaces;
        assert_eq!(devices[0].name, "eth1");
        assert_eq!(devices[0].rx_bytes, 4294967296);
        assert_eq!(devices[0].tx_packets, 2);
    }

    #[test]
    fn test_throughput() {
        let mut prior = sample("eth0: 1000 0 0 0 0 0 0 0 500 0 0 0 0 0 0 0\n");
        let mut current = sample("eth0: 3000 0 0 0 0 0 0 0 1500 0 0 0 0 0 0 0\n");
        prior.timestamp = 0;
        current.timestamp = 2_000_000_000;

        let delta = current.delta(&prior);
        assert_eq!(delta.throughput("eth0"), Some((1000.0, 500.0)));
        assert!(delta.throughput("wlan0").is_none());
    }
}

//! Canned `/proc` contents for tests and dry runs.

use std::io;
use std::path::Path;

pub const STAT: &str = "\
cpu  10132153 290696 3084719 46828483 16683 0 25195 0 175628 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 23933 0
cpu1 1335008 34521 553512 13346780 4223 0 3105 0 23412 0
intr 1462898 0 0 0 0 0 0 0 0 1 0 0 0
ctxt 1990473
btime 1062191376
processes 2915
procs_running 1
procs_blocked 0
softirq 12121 0 1 2 3 4 5 6 7 8 9
";

pub const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
  eth0: 9876543     5678    1    2    0     0          0        10 87654321     4321    3    4    0     0       0          0
";

pub const VMSTAT: &str = "\
nr_free_pages 123456
pgpgin 123456
pgpgout 654321
pswpin 100
pswpout 200
pgfault 999999
pgmajfault 1234
pgsteal_kswapd 5000
pgsteal_direct 1000
pgscan_kswapd 10000
pgscan_direct 2000
oom_kill 5
";

pub const MEMINFO: &str = "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:        10240 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Dirty:              1024 kB
Writeback:             0 kB
Slab:             512000 kB
SReclaimable:     256000 kB
SUnreclaim:       256000 kB
HugePages_Total:       0
";

pub const LOADAVG: &str = "0.15 0.10 0.05 1/150 1234\n";

pub const CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 142
model name\t: Intel(R) Core(TM) i7-8550U CPU @ 1.80GHz
cpu MHz\t\t: 1992.000
cache size\t: 8192 KB
physical id\t: 0
core id\t\t: 0
cpu cores\t: 2
flags\t\t: fpu vme de pse

processor\t: 1
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 142
model name\t: Intel(R) Core(TM) i7-8550U CPU @ 1.80GHz
cpu MHz\t\t: 2100.500
cache size\t: 8192 KB
physical id\t: 0
core id\t\t: 1
cpu cores\t: 2
flags\t\t: fpu vme de pse

";

/// Writes every fixture under `root` with its procfs-relative path.
pub fn write_proc_root(root: &Path) -> io::Result<()> {
    let files = [
        ("stat", STAT),
        ("net/dev", NET_DEV),
        ("vmstat", VMSTAT),
        ("meminfo", MEMINFO),
        ("loadavg", LOADAVG),
        ("cpuinfo", CPUINFO),
    ];
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
    }
    Ok(())
}

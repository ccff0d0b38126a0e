//! proctickd - /proc sampling daemon.
//!
//! Samples the selected `/proc` domains on a fixed interval and writes one
//! frame per record to stdout, either as JSON lines or as length-prefixed
//! postcard frames.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use serde::Serialize;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use proctick_core::collector::procfs::{Cpuinfo, Loadavg, Meminfo, NetDev, Stat, Vmstat};
use proctick_core::collector::{
    CollectError, Delta, DeltaEngine, Domain, ParsePolicy, Sample, Sampler, Ticker, TickerError,
    TickerState,
};

/// /proc sampling daemon.
#[derive(Parser, Debug)]
#[command(name = "proctickd", about = "Periodic /proc sampler", version)]
struct Args {
    /// Sampling interval in milliseconds.
    #[arg(short, long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// Domain to sample. Repeat for several; all domains when omitted.
    #[arg(short, long = "domain", value_enum)]
    domains: Vec<DomainArg>,

    /// Emit differences between consecutive samples instead of absolute
    /// values. Gauge-only domains are emitted as is.
    #[arg(long)]
    delta: bool,

    /// Output encoding.
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Stop after this many frames.
    #[arg(short, long)]
    count: Option<u64>,

    /// Abort a sample on the first malformed field instead of substituting
    /// zero.
    #[arg(long)]
    strict: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DomainArg {
    Stat,
    NetDev,
    Vmstat,
    Meminfo,
    Loadavg,
    Cpuinfo,
}

impl DomainArg {
    const ALL: [DomainArg; 6] = [
        DomainArg::Stat,
        DomainArg::NetDev,
        DomainArg::Vmstat,
        DomainArg::Meminfo,
        DomainArg::Loadavg,
        DomainArg::Cpuinfo,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// One JSON object per line.
    Json,
    /// Little-endian u32 length followed by a postcard payload.
    Postcard,
}

impl Args {
    fn selected_domains(&self) -> Vec<DomainArg> {
        if self.domains.is_empty() {
            return DomainArg::ALL.to_vec();
        }
        let mut out = Vec::with_capacity(self.domains.len());
        for d in &self.domains {
            if !out.contains(d) {
                out.push(*d);
            }
        }
        out
    }

    fn policy(&self) -> ParsePolicy {
        if self.strict {
            ParsePolicy::Strict
        } else {
            ParsePolicy::Lenient
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["proctickd", "proctick_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Frames go to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Envelope written for every record.
#[derive(Serialize)]
struct Frame<'a, T> {
    domain: &'a str,
    data: &'a T,
}

#[derive(Debug)]
enum EncodeError {
    Json(serde_json::Error),
    Postcard(postcard::Error),
    TooLarge(usize),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::Json(e) => write!(f, "JSON encoding failed: {}", e),
            EncodeError::Postcard(e) => write!(f, "postcard encoding failed: {}", e),
            EncodeError::TooLarge(n) => write!(f, "frame of {} bytes exceeds u32 length", n),
        }
    }
}

impl std::error::Error for EncodeError {}

fn encode<T: Serialize>(format: Format, domain: &str, data: &T) -> Result<Vec<u8>, EncodeError> {
    let frame = Frame { domain, data };
    match format {
        Format::Json => {
            let mut out = serde_json::to_vec(&frame).map_err(EncodeError::Json)?;
            out.push(b'\n');
            Ok(out)
        }
        Format::Postcard => {
            let payload = postcard::to_allocvec(&frame).map_err(EncodeError::Postcard)?;
            let len = u32::try_from(payload.len())
                .map_err(|_| EncodeError::TooLarge(payload.len()))?;
            let mut out = Vec::with_capacity(4 + payload.len());
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&payload);
            Ok(out)
        }
    }
}

#[derive(Debug)]
enum StartError {
    Collect(CollectError),
    Ticker(TickerError),
}

impl std::fmt::Display for StartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartError::Collect(e) => write!(f, "{}", e),
            StartError::Ticker(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StartError {}

impl From<CollectError> for StartError {
    fn from(e: CollectError) -> Self {
        StartError::Collect(e)
    }
}

impl From<TickerError> for StartError {
    fn from(e: TickerError) -> Self {
        StartError::Ticker(e)
    }
}

/// A running ticker plus the threads draining its two streams.
trait Task {
    fn name(&self) -> &str;

    /// Stops the ticker, closes its streams and joins the helper threads.
    /// Returns the number of errors seen on the error stream.
    fn shutdown(self: Box<Self>) -> u64;
}

struct DomainTask<S: Sample> {
    ticker: Ticker<S>,
    forwarder: Option<JoinHandle<()>>,
    reporter: Option<JoinHandle<u64>>,
}

impl<S> Task for DomainTask<S>
where
    S: Sample + Send + 'static,
    S::Output: Send + 'static,
{
    fn name(&self) -> &str {
        self.ticker.name()
    }

    fn shutdown(mut self: Box<Self>) -> u64 {
        if let Err(e) = self.ticker.stop() {
            error!("{}: {}", self.ticker.name(), e);
        }
        if let Err(e) = self.ticker.close() {
            debug!("{}: {}", self.ticker.name(), e);
        }
        if let Some(h) = self.forwarder.take() {
            let _ = h.join();
        }
        self.reporter
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or(0)
    }
}

/// Starts a ticker over `source` and the threads that encode its outputs
/// into `frames` and account for its errors.
fn spawn_task<S>(
    name: &'static str,
    source: S,
    interval: Duration,
    format: Format,
    frames: Sender<Vec<u8>>,
) -> Result<Box<dyn Task>, StartError>
where
    S: Sample + Send + 'static,
    S::Output: Serialize + Send + 'static,
{
    let mut ticker = Ticker::new(name, source, interval);
    let (Some(outputs), Some(errors)) = (ticker.outputs(), ticker.errors()) else {
        return Err(TickerError::InvalidTransition {
            from: ticker.state(),
            to: TickerState::Running,
        }
        .into());
    };
    ticker.start()?;

    let forwarder = thread::Builder::new()
        .name(format!("{}-out", name))
        .spawn(move || forward(name, format, outputs, frames))
        .map_err(|e| StartError::Ticker(TickerError::Spawn(e)))?;
    let reporter = thread::Builder::new()
        .name(format!("{}-err", name))
        .spawn(move || report(name, errors))
        .map_err(|e| StartError::Ticker(TickerError::Spawn(e)))?;

    Ok(Box::new(DomainTask {
        ticker,
        forwarder: Some(forwarder),
        reporter: Some(reporter),
    }))
}

fn forward<T: Serialize>(
    name: &str,
    format: Format,
    outputs: Receiver<T>,
    frames: Sender<Vec<u8>>,
) {
    for value in outputs.iter() {
        match encode(format, name, &value) {
            Ok(bytes) => {
                if frames.send(bytes).is_err() {
                    break;
                }
            }
            Err(e) => error!("{}: {}", name, e),
        }
    }
    debug!("{}: output stream finished", name);
}

fn report(name: &str, errors: Receiver<CollectError>) -> u64 {
    let mut count = 0;
    for e in errors.iter() {
        count += 1;
        // The ticker already logs failed samples; diagnostics are logged by
        // the sampler.
        debug!("{}: {}", name, e);
    }
    count
}

fn open_sampler<D: Domain + Default>(
    proc_path: &Path,
    policy: ParsePolicy,
) -> Result<Sampler<D>, CollectError> {
    Ok(Sampler::<D>::open_in(proc_path)?.with_policy(policy))
}

fn start_raw<D>(args: &Args, frames: Sender<Vec<u8>>) -> Result<Box<dyn Task>, StartError>
where
    D: Domain + Default + 'static,
    D::Record: Serialize + 'static,
{
    let sampler = open_sampler::<D>(&args.proc_path, args.policy())?;
    info!("{}: sampling {}", D::NAME, sampler.path().display());
    spawn_task(
        D::NAME,
        sampler,
        Duration::from_millis(args.interval),
        args.format,
        frames,
    )
}

fn start_delta<D>(args: &Args, frames: Sender<Vec<u8>>) -> Result<Box<dyn Task>, StartError>
where
    D: Domain + Default + 'static,
    D::Record: Delta + 'static,
    <D::Record as Delta>::Output: Serialize + Send + 'static,
{
    let engine = DeltaEngine::new(open_sampler::<D>(&args.proc_path, args.policy())?)?;
    info!(
        "{}: sampling deltas of {}",
        D::NAME,
        engine.sampler().path().display()
    );
    spawn_task(
        D::NAME,
        engine,
        Duration::from_millis(args.interval),
        args.format,
        frames,
    )
}

fn start_domain(
    domain: DomainArg,
    args: &Args,
    frames: Sender<Vec<u8>>,
) -> Result<Box<dyn Task>, StartError> {
    match (domain, args.delta) {
        (DomainArg::Stat, true) => start_delta::<Stat>(args, frames),
        (DomainArg::Stat, false) => start_raw::<Stat>(args, frames),
        (DomainArg::NetDev, true) => start_delta::<NetDev>(args, frames),
        (DomainArg::NetDev, false) => start_raw::<NetDev>(args, frames),
        (DomainArg::Vmstat, true) => start_delta::<Vmstat>(args, frames),
        (DomainArg::Vmstat, false) => start_raw::<Vmstat>(args, frames),
        (DomainArg::Meminfo, delta) => {
            if delta {
                info!("{}: gauges only, emitting absolute values", Meminfo::NAME);
            }
            start_raw::<Meminfo>(args, frames)
        }
        (DomainArg::Loadavg, delta) => {
            if delta {
                info!("{}: gauges only, emitting absolute values", Loadavg::NAME);
            }
            start_raw::<Loadavg>(args, frames)
        }
        (DomainArg::Cpuinfo, delta) => {
            if delta {
                info!("{}: no counters, emitting absolute values", Cpuinfo::NAME);
            }
            start_raw::<Cpuinfo>(args, frames)
        }
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("proctickd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}ms, proc={}, delta={}, format={:?}, policy={:?}",
        args.interval,
        args.proc_path.display(),
        args.delta,
        args.format,
        args.policy()
    );

    let (frames_tx, frames_rx) = bounded::<Vec<u8>>(64);

    let mut tasks: Vec<Box<dyn Task>> = Vec::new();
    for domain in args.selected_domains() {
        match start_domain(domain, &args, frames_tx.clone()) {
            Ok(task) => tasks.push(task),
            Err(e) => error!("{:?}: not started: {}", domain, e),
        }
    }
    drop(frames_tx);

    if tasks.is_empty() {
        error!("No domain could be started");
        std::process::exit(1);
    }

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let written = write_frames(&frames_rx, &running, args.count, &mut std::io::stdout().lock());

    // Graceful shutdown
    info!("Shutting down after {} frames...", written);
    drop(frames_rx);

    for task in tasks {
        let name = task.name().to_string();
        let errors = task.shutdown();
        if errors > 0 {
            info!("{}: {} errors reported", name, errors);
        }
    }

    info!("Shutdown complete");
}

/// Copies frames to `out` until stopped, the limit is reached or all
/// producers are gone. Returns the number of frames written.
fn write_frames(
    frames: &Receiver<Vec<u8>>,
    running: &AtomicBool,
    limit: Option<u64>,
    out: &mut impl Write,
) -> u64 {
    // Upper bound on shutdown latency.
    let poll = Duration::from_millis(100);
    let mut written: u64 = 0;

    while running.load(Ordering::SeqCst) && limit.is_none_or(|n| written < n) {
        match frames.recv_timeout(poll) {
            Ok(bytes) => {
                if let Err(e) = out.write_all(&bytes).and_then(|_| out.flush()) {
                    error!("Failed to write frame: {}", e);
                    break;
                }
                written += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctick_core::collector::mock::scenarios;
    use proctick_core::collector::procfs::{LoadavgRecord, VmstatDelta};

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["proctickd"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn all_domains_when_none_selected() {
        let a = args(&[]);
        assert_eq!(a.selected_domains(), DomainArg::ALL.to_vec());
        assert_eq!(a.policy(), ParsePolicy::Lenient);
        assert_eq!(a.interval, 1000);
    }

    #[test]
    fn repeated_domains_deduplicated() {
        let a = args(&["-d", "net-dev", "--domain", "stat", "-d", "net-dev", "--strict"]);
        assert_eq!(a.selected_domains(), vec![DomainArg::NetDev, DomainArg::Stat]);
        assert_eq!(a.policy(), ParsePolicy::Strict);
    }

    #[test]
    fn zero_interval_rejected() {
        assert!(Args::try_parse_from(["proctickd", "--interval", "0"]).is_err());
    }

    #[test]
    fn json_frame_is_one_line() {
        let record = LoadavgRecord {
            timestamp: 7,
            load1: 0.5,
            ..Default::default()
        };
        let bytes = encode(Format::Json, "loadavg", &record).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 1);

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["domain"], "loadavg");
        assert_eq!(value["data"]["timestamp"], 7);
        assert_eq!(value["data"]["load1"], 0.5);
    }

    #[test]
    fn postcard_frame_is_length_prefixed() {
        let delta = VmstatDelta {
            time_delta: 1_000_000_000,
            pgpgin: 50,
            ..Default::default()
        };
        let bytes = encode(Format::Postcard, "vmstat", &delta).unwrap();
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len() - 4);

        #[derive(serde::Deserialize)]
        struct Owned {
            domain: String,
            data: VmstatDelta,
        }
        let frame: Owned = postcard::from_bytes(&bytes[4..]).unwrap();
        assert_eq!(frame.domain, "vmstat");
        assert_eq!(frame.data, delta);
    }

    #[test]
    fn write_frames_stops_at_limit() {
        let (tx, rx) = bounded(8);
        for i in 0..5u8 {
            tx.send(vec![i]).unwrap();
        }
        let running = AtomicBool::new(true);
        let mut out = Vec::new();
        assert_eq!(write_frames(&rx, &running, Some(3), &mut out), 3);
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn write_frames_ends_when_producers_gone() {
        let (tx, rx) = bounded(8);
        tx.send(b"x".to_vec()).unwrap();
        drop(tx);
        let running = AtomicBool::new(true);
        let mut out = Vec::new();
        assert_eq!(write_frames(&rx, &running, None, &mut out), 1);
    }

    #[test]
    fn delta_task_over_fixture_root() {
        let dir = tempfile::tempdir().unwrap();
        scenarios::write_proc_root(dir.path()).unwrap();
        let root = dir.path().to_str().unwrap();
        let a = args(&["--proc-path", root, "--interval", "10", "--delta", "-d", "stat"]);

        let (tx, rx) = bounded(4);
        let task = start_domain(DomainArg::Stat, &a, tx).unwrap();
        let bytes = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(rx);
        assert_eq!(task.shutdown(), 0);

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["domain"], "stat");
        // Fixture does not change between samples.
        assert_eq!(value["data"]["ctxt"], 0);
        assert_eq!(value["data"]["topology_changed"], false);
        assert!(value["data"]["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn missing_source_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let a = args(&["--proc-path", dir.path().to_str().unwrap()]);
        let (tx, _rx) = bounded(1);
        let err = start_domain(DomainArg::Meminfo, &a, tx).err().unwrap();
        assert!(matches!(err, StartError::Collect(CollectError::Open { .. })));
    }
}

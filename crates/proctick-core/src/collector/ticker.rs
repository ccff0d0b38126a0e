//! Periodic driver: runs a sampler on a fixed interval on its own thread.
//!
//! ```text
//!   Idle --start--> Running --stop--> Stopped --close--> Closed
//! ```
//!
//! Results are handed over through a zero-capacity channel, so a slow
//! consumer holds the sampling loop back instead of ticks piling up.
//! Errors go to a separate channel and never block sampling. That channel
//! is unbounded by default; [`Ticker::with_error_capacity`] bounds it and
//! drops the oldest error when full.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{
    Receiver, Sender, TryRecvError, TrySendError, bounded, select, tick, unbounded,
};
use tracing::{debug, error, info, warn};

use crate::collector::error::CollectError;
use crate::collector::sampler::Sample;

/// Lifecycle of a [`Ticker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    Idle,
    Running,
    Stopped,
    Closed,
}

impl std::fmt::Display for TickerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TickerState::Idle => "idle",
            TickerState::Running => "running",
            TickerState::Stopped => "stopped",
            TickerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Misuse of the ticker lifecycle.
#[derive(Debug)]
pub enum TickerError {
    InvalidTransition {
        from: TickerState,
        to: TickerState,
    },
    /// The sampling thread could not be spawned; the source is lost.
    Spawn(std::io::Error),
    /// The sampling thread panicked; the source is lost.
    WorkerPanicked,
}

impl std::fmt::Display for TickerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickerError::InvalidTransition { from, to } => {
                write!(f, "invalid ticker transition {} -> {}", from, to)
            }
            TickerError::Spawn(e) => write!(f, "failed to spawn ticker thread: {}", e),
            TickerError::WorkerPanicked => write!(f, "ticker thread panicked"),
        }
    }
}

impl std::error::Error for TickerError {}

/// Runs a [`Sample`] implementation every `interval`.
pub struct Ticker<S: Sample> {
    name: String,
    interval: Duration,
    state: TickerState,
    source: Option<S>,
    output_tx: Option<Sender<S::Output>>,
    output_rx: Option<Receiver<S::Output>>,
    error_tx: Option<Sender<CollectError>>,
    error_rx: Option<Receiver<CollectError>>,
    error_capacity: Option<usize>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<S>>,
}

impl<S> Ticker<S>
where
    S: Sample + Send + 'static,
    S::Output: Send + 'static,
{
    pub fn new(name: impl Into<String>, source: S, interval: Duration) -> Self {
        let (output_tx, output_rx) = bounded(0);
        let (error_tx, error_rx) = unbounded();
        Self {
            name: name.into(),
            interval,
            state: TickerState::Idle,
            source: Some(source),
            output_tx: Some(output_tx),
            output_rx: Some(output_rx),
            error_tx: Some(error_tx),
            error_rx: Some(error_rx),
            error_capacity: None,
            stop_tx: None,
            worker: None,
        }
    }

    /// Keeps at most `capacity` undrained errors, discarding the oldest.
    ///
    /// Receivers obtained from [`errors`](Ticker::errors) before this call
    /// are not connected to the new stream.
    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        let (error_tx, error_rx) = bounded(capacity.max(1));
        self.error_tx = Some(error_tx);
        self.error_rx = Some(error_rx);
        self.error_capacity = Some(capacity.max(1));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> TickerState {
        self.state
    }

    fn transition(&self, expected: TickerState, to: TickerState) -> Result<(), TickerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TickerError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    /// Receiving end of the result stream.
    ///
    /// Returns `None` once the ticker is closed.
    pub fn outputs(&self) -> Option<Receiver<S::Output>> {
        self.output_rx.clone()
    }

    /// Receiving end of the error stream.
    ///
    /// Unless bounded with [`with_error_capacity`](Ticker::with_error_capacity),
    /// undrained errors accumulate for as long as the ticker runs; a field
    /// that stays malformed adds one per tick.
    pub fn errors(&self) -> Option<Receiver<CollectError>> {
        self.error_rx.clone()
    }

    /// Spawns the sampling thread.
    pub fn start(&mut self) -> Result<(), TickerError> {
        self.transition(TickerState::Idle, TickerState::Running)?;

        let (Some(source), Some(outputs), Some(errors)) = (
            self.source.take(),
            self.output_tx.clone(),
            self.error_tx.clone(),
        ) else {
            return Err(TickerError::InvalidTransition {
                from: self.state,
                to: TickerState::Running,
            });
        };
        let errors = ErrorSink {
            tx: errors,
            overflow: self.error_capacity.and(self.error_rx.clone()),
            dropped: 0,
        };
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let interval = self.interval;
        let name = self.name.clone();

        let spawned = thread::Builder::new()
            .name(format!("ticker-{}", self.name))
            .spawn(move || run(&name, source, interval, outputs, errors, stop_rx));

        match spawned {
            Ok(handle) => {
                info!(ticker = %self.name, "started, interval {:?}", self.interval);
                self.worker = Some(handle);
                self.stop_tx = Some(stop_tx);
                self.state = TickerState::Running;
                Ok(())
            }
            Err(e) => {
                self.release();
                self.state = TickerState::Closed;
                Err(TickerError::Spawn(e))
            }
        }
    }

    /// Signals the thread to stop and waits for it.
    ///
    /// A sample in progress is allowed to finish; a publish blocked on a
    /// missing receiver is abandoned. The streams stay open.
    pub fn stop(&mut self) -> Result<(), TickerError> {
        self.transition(TickerState::Running, TickerState::Stopped)?;
        self.state = TickerState::Stopped;
        self.halt()
    }

    /// Releases both streams. Receivers observe disconnection once drained.
    pub fn close(&mut self) -> Result<(), TickerError> {
        self.transition(TickerState::Stopped, TickerState::Closed)?;
        self.release();
        self.state = TickerState::Closed;
        debug!(ticker = %self.name, "closed");
        Ok(())
    }

    /// Gives the source back. Available while idle, stopped or closed.
    pub fn into_inner(mut self) -> Option<S> {
        if self.state == TickerState::Running {
            return None;
        }
        self.source.take()
    }

    fn halt(&mut self) -> Result<(), TickerError> {
        drop(self.stop_tx.take());
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok(source) => {
                self.source = Some(source);
                info!(ticker = %self.name, "stopped");
                Ok(())
            }
            Err(_) => Err(TickerError::WorkerPanicked),
        }
    }

    fn release(&mut self) {
        self.output_tx = None;
        self.output_rx = None;
        self.error_tx = None;
        self.error_rx = None;
    }
}

impl<S: Sample> Drop for Ticker<S> {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Sending side of the error stream as seen by the sampling thread.
struct ErrorSink {
    tx: Sender<CollectError>,
    /// Set for bounded streams: used to evict the oldest entry.
    overflow: Option<Receiver<CollectError>>,
    dropped: u64,
}

impl ErrorSink {
    fn publish(&mut self, err: CollectError) {
        let err = match self.tx.try_send(err) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => return,
            Err(TrySendError::Full(err)) => err,
        };
        if let Some(rx) = &self.overflow {
            let _ = rx.try_recv();
        }
        if self.tx.try_send(err).is_err() {
            self.dropped += 1;
        }
        self.dropped += 1;
    }
}

/// Sampling loop. Returns the source so the ticker can hand it back.
fn run<S: Sample>(
    name: &str,
    mut source: S,
    interval: Duration,
    outputs: Sender<S::Output>,
    mut errors: ErrorSink,
    stop: Receiver<()>,
) -> S {
    let timer = tick(interval);
    let mut ticks: u64 = 0;

    loop {
        select! {
            recv(stop) -> _ => break,
            recv(timer) -> _ => {}
        }
        // Both may be ready at once; stop wins.
        if matches!(stop.try_recv(), Err(TryRecvError::Disconnected)) {
            break;
        }
        ticks += 1;

        match source.get() {
            Ok(value) => {
                for diag in source.take_diagnostics() {
                    errors.publish(CollectError::Parse(diag));
                }
                select! {
                    send(outputs, value) -> res => {
                        if res.is_err() {
                            debug!(ticker = name, "output stream closed");
                            break;
                        }
                    }
                    recv(stop) -> _ => break,
                }
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(ticker = name, tick = ticks, "sample failed: {}", e);
                } else {
                    error!(ticker = name, tick = ticks, "sample failed: {}", e);
                }
                errors.publish(e);
            }
        }
    }

    if errors.dropped > 0 {
        warn!(ticker = name, "{} errors discarded from a full error stream", errors.dropped);
    }
    debug!(ticker = name, "loop exited after {} ticks", ticks);
    source
}

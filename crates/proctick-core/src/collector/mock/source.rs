//! In-memory pseudo-file and manual clock.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::collector::clock::Clock;

#[derive(Debug, Default)]
struct MockState {
    content: Vec<u8>,
    /// Contents installed one by one on each rewind.
    frames: VecDeque<Vec<u8>>,
    /// Number of upcoming rewinds that fail.
    failures: u32,
    /// Number of upcoming reads that fail after the first line.
    read_failures: u32,
    rewinds: u64,
}

/// Seekable in-memory source whose content can change between samples.
///
/// Clones share the same content, so a test keeps one clone as a control
/// handle while the sampler owns another.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
    pos: usize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(content: impl Into<Vec<u8>>) -> Self {
        let source = Self::new();
        source.set_content(content);
        source
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the content seen from the next rewind on.
    pub fn set_content(&self, content: impl Into<Vec<u8>>) {
        self.lock().content = content.into();
    }

    /// Queues a content to be installed by a future rewind.
    pub fn push_frame(&self, content: impl Into<Vec<u8>>) {
        self.lock().frames.push_back(content.into());
    }

    /// Makes the next `count` rewinds fail with an I/O error.
    pub fn fail_next(&self, count: u32) {
        self.lock().failures = count;
    }

    /// Makes the next `count` passes over the content fail with an I/O
    /// error once the first line has been delivered.
    pub fn fail_reads(&self, count: u32) {
        self.lock().read_failures = count;
    }

    /// Number of successful rewinds so far.
    pub fn rewinds(&self) -> u64 {
        self.lock().rewinds
    }
}

impl Read for MockSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut end = state.content.len();
        if state.read_failures > 0 {
            end = state
                .content
                .iter()
                .position(|&b| b == b'\n')
                .map_or(end, |i| i + 1);
            if self.pos >= end {
                state.read_failures -= 1;
                return Err(io::Error::other("mock source read interrupted"));
            }
        }
        let rest = state.content.get(self.pos..end).unwrap_or_default();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        drop(state);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for MockSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.failures > 0 {
            state.failures -= 1;
            return Err(io::Error::other("mock source unreadable"));
        }

        let target = match pos {
            SeekFrom::Start(0) => {
                if let Some(frame) = state.frames.pop_front() {
                    state.content = frame;
                }
                state.rewinds += 1;
                0
            }
            SeekFrom::Start(n) => n as usize,
            SeekFrom::Current(delta) => offset(self.pos, delta)?,
            SeekFrom::End(delta) => offset(state.content.len(), delta)?,
        };
        self.pos = target;
        Ok(target as u64)
    }
}

fn offset(base: usize, delta: i64) -> io::Result<usize> {
    let target = base as i64 + delta;
    usize::try_from(target)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))
}

/// Clock returning `start`, `start + step`, `start + 2 * step`, ...
#[derive(Debug)]
pub struct ManualClock {
    next: AtomicI64,
    step: i64,
}

impl ManualClock {
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
            step,
        }
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

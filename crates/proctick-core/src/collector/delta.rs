//! Turns consecutive absolute samples into rate-of-change records.

use std::fs::File;
use std::io::{Read, Seek};

use tracing::debug;

use crate::collector::error::{CollectError, ParseError};
use crate::collector::sampler::{Domain, Sample, Sampler};

/// Field-wise difference between two records of the same domain.
pub trait Delta {
    type Output;

    /// `self - prior` for every counter; gauges and the timestamp keep the
    /// value of `self`.
    fn delta(&self, prior: &Self) -> Self::Output;
}

/// Signed difference of two counter readings.
///
/// Not clamped: a counter that was reset or wrapped yields a negative delta.
#[inline]
pub fn counter_delta(current: u64, prior: u64) -> i64 {
    current.wrapping_sub(prior) as i64
}

/// Converts a delta over `time_delta` nanoseconds into a per-second rate.
///
/// Returns `None` when no time elapsed.
pub fn per_second(delta: i64, time_delta: i64) -> Option<f64> {
    (time_delta > 0).then(|| delta as f64 * 1e9 / time_delta as f64)
}

/// Pairs sub-entities of two samples by key and diffs the matched ones.
///
/// Output follows the order of `current`. Entities without a prior
/// counterpart are skipped and vanished ones dropped; the returned flag is
/// `true` whenever the two lists did not pair up one-to-one.
pub fn diff_entities<'a, E, K, O>(
    current: &'a [E],
    prior: &'a [E],
    key: impl Fn(&'a E) -> K,
    diff: impl Fn(&'a E, &'a E) -> O,
) -> (Vec<O>, bool)
where
    K: PartialEq,
{
    let mut out = Vec::with_capacity(current.len());
    let mut matched = 0;

    for (idx, cur) in current.iter().enumerate() {
        let k = key(cur);
        // Entities almost always keep their position between samples.
        let prev = match prior.get(idx) {
            Some(p) if key(p) == k => Some(p),
            _ => prior.iter().find(|&p| key(p) == k),
        };
        if let Some(prev) = prev {
            out.push(diff(cur, prev));
            matched += 1;
        }
    }

    let changed = matched != current.len() || matched != prior.len();
    (out, changed)
}

/// Holds the previous sample of a domain and diffs each new one against it.
pub struct DeltaEngine<D: Domain, R = File> {
    sampler: Sampler<D, R>,
    prior: D::Record,
}

impl<D, R> DeltaEngine<D, R>
where
    D: Domain,
    D::Record: Delta,
    R: Read + Seek,
{
    /// Primes the engine with one baseline sample.
    pub fn new(mut sampler: Sampler<D, R>) -> Result<Self, CollectError> {
        let prior = sampler.get()?;
        debug!(domain = D::NAME, "delta baseline taken");
        Ok(Self { sampler, prior })
    }

    /// Samples again and returns the difference to the previous sample.
    ///
    /// On error the previous sample is kept as baseline.
    pub fn get(&mut self) -> Result<<D::Record as Delta>::Output, CollectError> {
        let current = self.sampler.get()?;
        let delta = current.delta(&self.prior);
        self.prior = current;
        Ok(delta)
    }

    /// The sample the next delta will be computed against.
    pub fn prior(&self) -> &D::Record {
        &self.prior
    }

    pub fn sampler(&self) -> &Sampler<D, R> {
        &self.sampler
    }
}

impl<D, R> Sample for DeltaEngine<D, R>
where
    D: Domain,
    D::Record: Delta,
    R: Read + Seek,
{
    type Output = <D::Record as Delta>::Output;

    fn get(&mut self) -> Result<Self::Output, CollectError> {
        DeltaEngine::get(self)
    }

    fn take_diagnostics(&mut self) -> Vec<ParseError> {
        self.sampler.take_diagnostics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::collector::mock::{ManualClock, MockSource};
    use crate::collector::procfs::{NetDev, Vmstat};
    use crate::collector::source::ProcFile;

    fn engine<D: Domain + Default>(frames: &[&str]) -> (DeltaEngine<D, MockSource>, MockSource)
    where
        D::Record: Delta,
    {
        let source = MockSource::new();
        for frame in frames {
            source.push_frame(*frame);
        }
        let sampler = Sampler::new(D::default(), ProcFile::from_reader(source.clone()))
            .with_clock(Arc::new(ManualClock::new(1_000_000_000, 1_000_000_000)));
        (DeltaEngine::new(sampler).unwrap(), source)
    }

    #[test]
    fn test_counter_delta_correctness() {
        let (mut engine, _) = engine::<Vmstat>(&[
            "pgpgin 100\npgpgout 200\n",
            "pgpgin 150\npgpgout 205\n",
        ]);
        assert_eq!(engine.prior().timestamp, 1_000_000_000);

        let delta = engine.get().unwrap();
        assert_eq!([delta.pgpgin, delta.pgpgout], [50, 5]);
        assert_eq!(delta.time_delta, 1_000_000_000);
        assert_eq!(delta.timestamp, 2_000_000_000);
        assert_eq!(engine.prior().timestamp, 2_000_000_000);
    }

    #[test]
    fn test_prior_is_replaced() {
        let (mut engine, _) = engine::<Vmstat>(&["pgpgin 1\n", "pgpgin 4\n", "pgpgin 10\n"]);
        assert_eq!(engine.get().unwrap().pgpgin, 3);
        assert_eq!(engine.get().unwrap().pgpgin, 6);
    }

    #[test]
    fn test_counter_reset_gives_negative_delta() {
        let (mut engine, _) = engine::<Vmstat>(&["pgfault 1000\n", "pgfault 10\n"]);
        assert_eq!(engine.get().unwrap().pgfault, -990);
    }

    #[test]
    fn test_error_keeps_baseline() {
        let (mut engine, source) = engine::<Vmstat>(&["pgpgin 100\n"]);
        source.fail_next(1);
        assert!(engine.get().is_err());

        source.set_content("pgpgin 130\n");
        let delta = engine.get().unwrap();
        assert_eq!(delta.pgpgin, 30);
        // The failed attempt never reached the clock.
        assert_eq!(delta.time_delta, 1_000_000_000);
    }

    #[test]
    fn test_interface_added_between_samples() {
        let before = "  eth0: 100 1 0 0 0 0 0 0 200 2 0 0 0 0 0 0\n";
        let after = "\
  eth0: 150 2 0 0 0 0 0 0 205 3 0 0 0 0 0 0
  wlan0: 999 9 0 0 0 0 0 0 999 9 0 0 0 0 0 0
";
        let (mut engine, _) = engine::<NetDev>(&[before, after]);
        let delta = engine.get().unwrap();

        assert!(delta.topology_changed);
        assert_eq!(delta.interfaces.len(), 1);
        assert_eq!(delta.interfaces[0].name, "eth0");
        assert_eq!(delta.interfaces[0].rx_bytes, 50);
        assert_eq!(delta.interfaces[0].tx_bytes, 5);
    }

    #[test]
    fn test_diff_entities_reordered() {
        let prior = [("a", 1u64), ("b", 2)];
        let current = [("b", 5u64), ("a", 4)];
        let (out, changed) = diff_entities(
            &current,
            &prior,
            |e| e.0,
            |c, p| (c.0, counter_delta(c.1, p.1)),
        );
        assert_eq!(out, vec![("b", 3), ("a", 3)]);
        assert!(!changed);
    }

    #[test]
    fn test_diff_entities_vanished() {
        let prior = [("a", 1u64), ("b", 2)];
        let current = [("a", 1u64)];
        let (out, changed) = diff_entities(&current, &prior, |e| e.0, |c, p| c.1 - p.1);
        assert_eq!(out, vec![0]);
        assert!(changed);
    }

    #[test]
    fn test_per_second() {
        assert_eq!(per_second(50, 500_000_000), Some(100.0));
        assert_eq!(per_second(50, 0), None);
    }
}

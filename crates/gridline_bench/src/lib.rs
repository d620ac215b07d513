//! Wall-clock benchmarking of pipeline variants.
//!
//! Purely observational: the runner times each variant a fixed number of
//! repetitions and never inspects or alters what the variant produces.

pub mod report;
mod stats;

pub use stats::Stats;

use std::time::{Duration, Instant};

use tracing::debug;

/// Runs each variant a fixed number of repetitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runner {
    /// How many times to run each variant.
    pub reps: usize,
}

/// Timing samples collected for one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantTimes {
    pub name: String,
    pub samples: Vec<Duration>,
}

impl VariantTimes {
    pub fn stats(&self) -> Option<Stats> {
        Stats::from_samples(&self.samples)
    }
}

impl Runner {
    /// Time `reps` executions of `f`, discarding its output unchanged.
    pub fn run<T, E>(
        &self,
        name: impl Into<String>,
        mut f: impl FnMut() -> Result<T, E>,
    ) -> Result<VariantTimes, E> {
        let name = name.into();
        let mut samples = Vec::with_capacity(self.reps);
        for sample in self.sample_iter(&mut f) {
            samples.push(sample?);
        }
        debug!(variant = %name, reps = samples.len(), "collected samples");
        Ok(VariantTimes { name, samples })
    }

    /// Lazy bounded iterator of timing samples; each `next` runs the
    /// variant once. Restartable by calling again with the same closure.
    pub fn sample_iter<'a, T, E>(
        &self,
        f: &'a mut impl FnMut() -> Result<T, E>,
    ) -> impl Iterator<Item = Result<Duration, E>> + 'a {
        let reps = self.reps;
        (0..reps).map(move |_| {
            let start = Instant::now();
            f()?;
            Ok(start.elapsed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_exactly_reps_times() {
        let runner = Runner { reps: 4 };
        let mut calls = 0usize;
        let times = runner
            .run("counting", || {
                calls += 1;
                Ok::<_, std::convert::Infallible>(calls)
            })
            .unwrap();
        assert_eq!(calls, 4);
        assert_eq!(times.samples.len(), 4);
        assert_eq!(times.name, "counting");
    }

    #[test]
    fn variant_error_stops_the_run() {
        let runner = Runner { reps: 3 };
        let mut calls = 0usize;
        let err = runner.run("failing", || {
            calls += 1;
            if calls == 2 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(err.unwrap_err(), "boom");
        assert_eq!(calls, 2);
    }

    #[test]
    fn sample_iter_is_lazy() {
        let runner = Runner { reps: 10 };
        let mut calls = 0usize;
        let mut f = || {
            calls += 1;
            Ok::<_, std::convert::Infallible>(())
        };
        let mut iter = runner.sample_iter(&mut f);
        iter.next();
        iter.next();
        drop(iter);
        assert_eq!(calls, 2);
    }
}

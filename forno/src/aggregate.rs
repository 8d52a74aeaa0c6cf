use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use forno_macros::aggregate;
use serde::{Serialize, de::DeserializeOwned};

use crate::metric::{HttpMetric, Metric, Sample, Tags};

/// The `Aggregate` trait defines how raw [`Metric`] values are collected and
/// combined into an intermediate, mergeable representation.
///
/// Each worker owns its aggregate for the whole run, so `consume` is called
/// from exactly one task and never needs a lock. After the executor stops all
/// workers it merges the worker-local aggregates into one.
///
/// **Important:** aggregates should **not** compute final statistics such as
/// percentiles or rates. Those belong in a `Report`, which is converted from
/// the merged aggregate once at the end of the run. Aggregates keep the raw
/// material (samples, counters) that the report stage derives numbers from.
///
/// # Implementor notes
/// - `merge` must be associative and commutative so the order workers are
///   drained in does not affect results.
/// - `fault` is invoked when an iteration panicked and produced no metric at
///   all. The default does nothing; implementations that track totals should
///   record the lost iteration so it is not silently dropped.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    ///
    /// This default implementation calls [`consume`](Aggregate::consume) for
    /// each metric.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);

    /// Record an iteration that panicked before it could produce a metric.
    fn fault(&mut self, _label: &str) {}
}

/// Pass/fail tally for one named check.
#[derive(
    serde::Serialize, serde::Deserialize, PartialOrd, PartialEq, Debug, Clone, Copy, Default,
)]
pub struct CheckCounter {
    pub passes: u64,
    pub fails: u64,
}

impl CheckCounter {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// Collector for [`HttpMetric`] observations.
///
/// Samples are retained individually so the report can compute exact
/// percentiles and group by tag afterwards. Check outcomes collapse into
/// per-name counters immediately since nothing downstream needs them
/// one-by-one.
///
/// A fault shows up as a status-less, zero-length sample plus a failed check
/// under the fault label, so panicked iterations stay visible in both the
/// request totals and the check table.
#[aggregate]
#[derive(Default)]
pub struct HttpAggregate {
    pub samples: Vec<Sample>,
    pub checks: BTreeMap<String, CheckCounter>,
}

impl Aggregate for HttpAggregate {
    type Metric = HttpMetric;

    fn new() -> Self {
        HttpAggregate::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        self.samples.push(metric.sample.clone());
        for check in &metric.checks {
            let counter = self.checks.entry(check.name.clone()).or_default();
            if check.passed {
                counter.passes += 1;
            } else {
                counter.fails += 1;
            }
        }
    }

    fn merge(&mut self, other: Self) {
        self.samples.extend(other.samples);
        for (name, counter) in other.checks {
            let slot = self.checks.entry(name).or_default();
            slot.passes += counter.passes;
            slot.fails += counter.fails;
        }
    }

    fn fault(&mut self, label: &str) {
        self.samples.push(Sample {
            timestamp: SystemTime::now(),
            duration: Duration::ZERO,
            status: None,
            tags: Tags::new(),
        });
        self.checks.entry(label.to_string()).or_default().fails += 1;
    }
}

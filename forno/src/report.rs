//! End-of-run summaries.
//!
//! The executor hands back one merged [`HttpAggregate`]; everything derived
//! (percentiles, rates, per-tag views) is computed here, once. [`RunReport`]
//! wraps those numbers together with threshold verdicts and per-scenario
//! outcomes and is what a process should base its exit code on.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::aggregate::{Aggregate, CheckCounter, HttpAggregate};
use crate::metric::Sample;
use crate::threshold::ThresholdOutcome;

pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

#[async_trait]
pub trait Reporter<R> {
    async fn report(&self, report: &R) -> Result<(), Box<dyn std::error::Error>>;
}

/// Tag keys that get their own stat lines in the report. Per-request keys
/// like `vu` and `iteration` stay on the samples; grouping by them would
/// produce one bucket per request.
pub const GROUP_KEYS: [&str; 4] = ["scenario", "test_type", "name", "test_case"];

/// Latency and error statistics for one set of samples.
///
/// All derived fields are `None` when the set is empty, so a threshold
/// against a group that saw no traffic can notice instead of comparing
/// against zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SummaryStats {
    pub count: u64,
    pub error_count: u64,
    pub error_rate: Option<f64>,
    pub min: Option<Duration>,
    pub mean: Option<Duration>,
    pub p50: Option<Duration>,
    pub p90: Option<Duration>,
    pub p95: Option<Duration>,
    pub p99: Option<Duration>,
    pub max: Option<Duration>,
}

impl SummaryStats {
    fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut durations: Vec<Duration> = Vec::new();
        let mut error_count = 0u64;
        for sample in samples {
            durations.push(sample.duration);
            if sample.is_error() {
                error_count += 1;
            }
        }
        let count = durations.len() as u64;
        if count == 0 {
            return Self::default();
        }

        durations.sort_unstable();
        let total: Duration = durations.iter().sum();
        Self {
            count,
            error_count,
            error_rate: Some(error_count as f64 / count as f64),
            min: durations.first().copied(),
            mean: Some(total.div_f64(count as f64)),
            p50: nearest_rank(&durations, 50),
            p90: nearest_rank(&durations, 90),
            p95: nearest_rank(&durations, 95),
            p99: nearest_rank(&durations, 99),
            max: durations.last().copied(),
        }
    }

    /// The percentiles this report keeps. Anything else returns `None`.
    pub fn percentile(&self, percentile: u8) -> Option<Duration> {
        match percentile {
            50 => self.p50,
            90 => self.p90,
            95 => self.p95,
            99 => self.p99,
            _ => None,
        }
    }
}

/// Nearest-rank percentile over an already sorted slice.
fn nearest_rank(sorted: &[Duration], percentile: u64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len() as u64;
    let rank = (n * percentile).div_ceil(100).max(1);
    sorted.get(rank as usize - 1).copied()
}

/// Pass/fail totals across every check that ran, plus the per-name table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CheckSummary {
    pub total: u64,
    pub passed: u64,
    pub rate: Option<f64>,
    pub by_name: BTreeMap<String, CheckCounter>,
}

/// Statistics derived from one merged [`HttpAggregate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpReport {
    pub requests: SummaryStats,
    pub by_tag: BTreeMap<String, SummaryStats>,
    pub checks: CheckSummary,
}

impl HttpReport {
    /// Like `From<HttpAggregate>` but with a custom set of tag keys to group
    /// by. Group labels are `key:value`.
    pub fn with_group_by(aggregate: HttpAggregate, keys: &[&str]) -> Self {
        let requests = SummaryStats::from_samples(&aggregate.samples);

        let mut groups: BTreeMap<String, Vec<&Sample>> = BTreeMap::new();
        for sample in &aggregate.samples {
            for (key, value) in &sample.tags {
                if keys.contains(&key.as_str()) {
                    groups
                        .entry(format!("{key}:{value}"))
                        .or_default()
                        .push(sample);
                }
            }
        }
        let by_tag = groups
            .into_iter()
            .map(|(label, samples)| (label, SummaryStats::from_samples(samples)))
            .collect();

        let mut checks = CheckSummary::default();
        for (name, counter) in &aggregate.checks {
            checks.total += counter.total();
            checks.passed += counter.passes;
            checks.by_name.insert(name.clone(), *counter);
        }
        if checks.total > 0 {
            checks.rate = Some(checks.passed as f64 / checks.total as f64);
        }

        Self {
            requests,
            by_tag,
            checks,
        }
    }
}

impl From<HttpAggregate> for HttpReport {
    fn from(aggregate: HttpAggregate) -> Self {
        Self::with_group_by(aggregate, &GROUP_KEYS)
    }
}

impl Report<HttpAggregate> for HttpReport {}

/// How one registered scenario ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Completed,
    Aborted { reason: String },
}

/// The full outcome of a run: metrics, threshold verdicts, and what happened
/// to each scenario. `success` is false as soon as any threshold failed or
/// any scenario aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: SystemTime,
    pub duration: Duration,
    pub metrics: HttpReport,
    pub thresholds: Vec<ThresholdOutcome>,
    pub scenarios: BTreeMap<String, ScenarioStatus>,
    pub success: bool,
}

impl RunReport {
    /// For `std::process::exit` in binaries: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }
}

fn fmt_ms(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format!("{:.2}ms", d.as_secs_f64() * 1000.0),
        None => "n/a".to_string(),
    }
}

fn fmt_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.2}%", r * 100.0),
        None => "n/a".to_string(),
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let requests = &self.metrics.requests;
        writeln!(f, "run finished in {:.1}s", self.duration.as_secs_f64())?;
        writeln!(
            f,
            "requests: {} total, {} errors ({})",
            requests.count,
            requests.error_count,
            fmt_rate(requests.error_rate)
        )?;
        writeln!(
            f,
            "latency: min {} / mean {} / p50 {} / p95 {} / p99 {} / max {}",
            fmt_ms(requests.min),
            fmt_ms(requests.mean),
            fmt_ms(requests.p50),
            fmt_ms(requests.p95),
            fmt_ms(requests.p99),
            fmt_ms(requests.max)
        )?;

        if !self.metrics.by_tag.is_empty() {
            writeln!(f, "groups:")?;
            for (label, stats) in &self.metrics.by_tag {
                writeln!(
                    f,
                    "  {label}: {} requests, errors {}, p95 {}",
                    stats.count,
                    fmt_rate(stats.error_rate),
                    fmt_ms(stats.p95)
                )?;
            }
        }

        let checks = &self.metrics.checks;
        writeln!(
            f,
            "checks: {}/{} passed ({})",
            checks.passed,
            checks.total,
            fmt_rate(checks.rate)
        )?;
        for (name, counter) in &checks.by_name {
            if counter.fails > 0 {
                writeln!(f, "  FAIL {name}: {} of {}", counter.fails, counter.total())?;
            }
        }

        if !self.thresholds.is_empty() {
            writeln!(f, "thresholds:")?;
            for outcome in &self.thresholds {
                writeln!(f, "  {outcome}")?;
            }
        }

        if !self.scenarios.is_empty() {
            writeln!(f, "scenarios:")?;
            for (name, status) in &self.scenarios {
                match status {
                    ScenarioStatus::Completed => writeln!(f, "  {name}: completed")?,
                    ScenarioStatus::Aborted { reason } => {
                        writeln!(f, "  {name}: aborted ({reason})")?
                    }
                }
            }
        }

        write!(f, "result: {}", if self.success { "PASSED" } else { "FAILED" })
    }
}

/// Prints the whole run summary to stdout.
pub struct StdoutReporter;

#[async_trait]
impl Reporter<RunReport> for StdoutReporter {
    async fn report(&self, report: &RunReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{report}");
        Ok(())
    }
}

#[async_trait]
impl Reporter<HttpReport> for StdoutReporter {
    async fn report(&self, report: &HttpReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{report:#?}");
        Ok(())
    }
}

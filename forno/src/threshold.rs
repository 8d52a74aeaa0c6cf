//! Pass/fail criteria in the `p(95)<2000` style, evaluated once against the
//! end-of-run report.
//!
//! A threshold names a metric (`http_req_duration`, `http_req_failed`,
//! `checks`), optionally narrowed to one tag with `{key:value}`, and carries
//! one or more expressions of the form `stat cmp limit`. Durations compare in
//! milliseconds, rates as fractions.
//!
//! A threshold that cannot be resolved against the data, for example a tag
//! filter no sample carried, counts as not met. A run that produced nothing
//! must not look like a pass.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::report::{HttpReport, SummaryStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum MetricName {
    HttpReqDuration,
    HttpReqFailed,
    Checks,
}

impl MetricName {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "http_req_duration" => Some(Self::HttpReqDuration),
            "http_req_failed" => Some(Self::HttpReqFailed),
            "checks" => Some(Self::Checks),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn holds(self, actual: f64, limit: f64) -> bool {
        match self {
            Self::Lt => actual < limit,
            Self::Le => actual <= limit,
            Self::Gt => actual > limit,
            Self::Ge => actual >= limit,
        }
    }
}

/// The statistic an expression compares. Percentiles are limited to the ones
/// the report actually computes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Stat {
    Percentile(u8),
    Avg,
    Med,
    Min,
    Max,
    Rate,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Expr {
    stat: Stat,
    comparator: Comparator,
    limit: f64,
    source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MetricSelector {
    metric: MetricName,
    filter: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    selector: MetricSelector,
    selector_source: String,
    exprs: Vec<Expr>,
}

/// Verdict for a single expression, kept in the run report so a summary can
/// say which criterion failed and by how much.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOutcome {
    pub selector: String,
    pub expr: String,
    pub actual: Option<f64>,
    pub limit: f64,
    pub passed: bool,
}

impl fmt::Display for ThresholdOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        match self.actual {
            Some(actual) => write!(
                f,
                "{verdict} {} {} (actual {:.2})",
                self.selector, self.expr, actual
            ),
            None => write!(f, "{verdict} {} {} (no data)", self.selector, self.expr),
        }
    }
}

impl Threshold {
    /// Parses a selector like `http_req_duration{test_type:smoke}` together
    /// with its expressions, e.g. `["p(95)<1000", "avg<500"]`.
    pub fn new(selector: &str, exprs: &[&str]) -> Result<Self> {
        let parsed_selector = parse_selector(selector)?;
        if exprs.is_empty() {
            return Err(Error::Threshold {
                expr: selector.to_string(),
                reason: "threshold needs at least one expression".to_string(),
            });
        }
        let exprs = exprs
            .iter()
            .map(|expr| parse_expr(expr))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            selector: parsed_selector,
            selector_source: selector.to_string(),
            exprs,
        })
    }

    /// One outcome per expression. Expressions whose statistic cannot be
    /// resolved, because the group is empty or the stat does not apply to
    /// the metric, come back failed with `actual: None`.
    pub fn evaluate(&self, report: &HttpReport) -> Vec<ThresholdOutcome> {
        let stats: Option<&SummaryStats> = match &self.selector.filter {
            None => Some(&report.requests),
            Some((key, value)) => report.by_tag.get(&format!("{key}:{value}")),
        };

        self.exprs
            .iter()
            .map(|expr| {
                let actual = self.resolve(expr.stat, stats, report);
                let passed = actual
                    .map(|a| expr.comparator.holds(a, expr.limit))
                    .unwrap_or(false);
                ThresholdOutcome {
                    selector: self.selector_source.clone(),
                    expr: expr.source.clone(),
                    actual,
                    limit: expr.limit,
                    passed,
                }
            })
            .collect()
    }

    fn resolve(
        &self,
        stat: Stat,
        stats: Option<&SummaryStats>,
        report: &HttpReport,
    ) -> Option<f64> {
        // Nanosecond-based conversion keeps whole-millisecond durations exact.
        let as_ms = |d: Option<Duration>| d.map(|d| d.as_nanos() as f64 / 1e6);
        match self.selector.metric {
            MetricName::HttpReqDuration => {
                let stats = stats?;
                match stat {
                    Stat::Percentile(p) => as_ms(stats.percentile(p)),
                    Stat::Avg => as_ms(stats.mean),
                    Stat::Med => as_ms(stats.p50),
                    Stat::Min => as_ms(stats.min),
                    Stat::Max => as_ms(stats.max),
                    Stat::Count => Some(stats.count as f64),
                    Stat::Rate => None,
                }
            }
            MetricName::HttpReqFailed => {
                let stats = stats?;
                match stat {
                    Stat::Rate => stats.error_rate,
                    Stat::Count => Some(stats.error_count as f64),
                    _ => None,
                }
            }
            MetricName::Checks => {
                // Check outcomes are not grouped by tag.
                if self.selector.filter.is_some() {
                    return None;
                }
                match stat {
                    Stat::Rate => report.checks.rate,
                    Stat::Count => Some(report.checks.total as f64),
                    _ => None,
                }
            }
        }
    }
}

fn threshold_error(source: &str, reason: impl Into<String>) -> Error {
    Error::Threshold {
        expr: source.to_string(),
        reason: reason.into(),
    }
}

fn parse_selector(source: &str) -> Result<MetricSelector> {
    let (name, filter) = match source.find('{') {
        None => (source, None),
        Some(open) => {
            let Some(inner) = source[open + 1..].strip_suffix('}') else {
                return Err(threshold_error(source, "missing closing '}' in tag filter"));
            };
            let Some((key, value)) = inner.split_once(':') else {
                return Err(threshold_error(source, "tag filter must be key:value"));
            };
            (
                &source[..open],
                Some((key.trim().to_string(), value.trim().to_string())),
            )
        }
    };

    let Some(metric) = MetricName::parse(name.trim()) else {
        return Err(threshold_error(
            source,
            format!("unknown metric {:?}", name.trim()),
        ));
    };
    Ok(MetricSelector { metric, filter })
}

fn parse_expr(source: &str) -> Result<Expr> {
    let Some(cmp_at) = source.find(|c| c == '<' || c == '>') else {
        return Err(threshold_error(source, "missing comparator"));
    };
    let stat = parse_stat(source, source[..cmp_at].trim())?;

    let rest = &source[cmp_at..];
    let (comparator, cmp_len) = if rest.starts_with("<=") {
        (Comparator::Le, 2)
    } else if rest.starts_with(">=") {
        (Comparator::Ge, 2)
    } else if rest.starts_with('<') {
        (Comparator::Lt, 1)
    } else {
        (Comparator::Gt, 1)
    };

    let limit_text = rest[cmp_len..].trim();
    let limit: f64 = limit_text
        .parse()
        .map_err(|_| threshold_error(source, format!("invalid limit {limit_text:?}")))?;
    if !limit.is_finite() {
        return Err(threshold_error(source, "limit must be finite"));
    }

    Ok(Expr {
        stat,
        comparator,
        limit,
        source: source.to_string(),
    })
}

fn parse_stat(source: &str, stat: &str) -> Result<Stat> {
    match stat {
        "avg" => Ok(Stat::Avg),
        "med" => Ok(Stat::Med),
        "min" => Ok(Stat::Min),
        "max" => Ok(Stat::Max),
        "rate" => Ok(Stat::Rate),
        "count" => Ok(Stat::Count),
        _ => {
            let Some(inner) = stat.strip_prefix("p(").and_then(|s| s.strip_suffix(')')) else {
                return Err(threshold_error(source, format!("unknown statistic {stat:?}")));
            };
            let percentile: u8 = inner
                .parse()
                .map_err(|_| threshold_error(source, format!("invalid percentile {inner:?}")))?;
            match percentile {
                50 | 90 | 95 | 99 => Ok(Stat::Percentile(percentile)),
                _ => Err(threshold_error(
                    source,
                    format!("unsupported percentile p({percentile}); use 50, 90, 95 or 99"),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregate, CheckCounter, HttpAggregate};
    use crate::metric::Sample;
    use std::time::SystemTime;

    fn tagged_sample(millis: u64, status: u16, tags: &[(&str, &str)]) -> Sample {
        Sample {
            timestamp: SystemTime::UNIX_EPOCH,
            duration: Duration::from_millis(millis),
            status: Some(status),
            tags: tags
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    /// 100 smoke-tagged samples at 1..=100ms, four of them errors.
    fn report() -> HttpReport {
        let mut agg = HttpAggregate::new();
        for i in 1..=100u64 {
            let status = if i <= 4 { 500 } else { 200 };
            agg.samples
                .push(tagged_sample(i, status, &[("test_type", "smoke")]));
        }
        HttpReport::from(agg)
    }

    #[test]
    fn plain_duration_threshold_passes_and_fails() {
        let report = report();
        let pass = Threshold::new("http_req_duration", &["p(95)<100"]).unwrap();
        assert!(pass.evaluate(&report)[0].passed);

        let fail = Threshold::new("http_req_duration", &["p(95)<95"]).unwrap();
        let outcome = &fail.evaluate(&report)[0];
        assert!(!outcome.passed);
        assert_eq!(outcome.actual, Some(95.0));
    }

    #[test]
    fn filtered_selector_reads_the_tag_group() {
        let report = report();
        let threshold =
            Threshold::new("http_req_duration{test_type:smoke}", &["p(99)<100"]).unwrap();
        let outcome = &threshold.evaluate(&report)[0];
        assert!(outcome.passed);
        assert_eq!(outcome.actual, Some(99.0));
    }

    #[test]
    fn missing_tag_group_is_not_met() {
        let report = report();
        let threshold =
            Threshold::new("http_req_duration{test_type:spike}", &["p(95)<5000"]).unwrap();
        let outcome = &threshold.evaluate(&report)[0];
        assert!(!outcome.passed);
        assert_eq!(outcome.actual, None);
        assert!(outcome.to_string().contains("no data"));
    }

    #[test]
    fn empty_report_never_meets_thresholds() {
        let empty = HttpReport::from(HttpAggregate::new());
        let threshold = Threshold::new("http_req_failed", &["rate<0.1"]).unwrap();
        assert!(!threshold.evaluate(&empty)[0].passed);
    }

    #[test]
    fn error_rate_threshold() {
        let report = report();
        let lenient = Threshold::new("http_req_failed", &["rate<0.1"]).unwrap();
        let outcome = &lenient.evaluate(&report)[0];
        assert!(outcome.passed);
        assert_eq!(outcome.actual, Some(0.04));

        let strict = Threshold::new("http_req_failed", &["rate<0.01"]).unwrap();
        assert!(!strict.evaluate(&report)[0].passed);
    }

    #[test]
    fn check_rate_threshold_reads_the_check_table() {
        let mut agg = HttpAggregate::new();
        agg.checks.insert(
            "status is 200".to_string(),
            CheckCounter {
                passes: 96,
                fails: 4,
            },
        );
        let report = HttpReport::from(agg);

        let threshold = Threshold::new("checks", &["rate>0.95"]).unwrap();
        let outcome = &threshold.evaluate(&report)[0];
        assert!(outcome.passed);
        assert_eq!(outcome.actual, Some(0.96));

        // Checks cannot be narrowed by tag; that selector never resolves.
        let filtered = Threshold::new("checks{test_type:smoke}", &["rate>0.5"]).unwrap();
        assert!(!filtered.evaluate(&report)[0].passed);
    }

    #[test]
    fn inclusive_comparators_accept_the_boundary() {
        let report = report();
        let le = Threshold::new("http_req_duration", &["p(95)<=95"]).unwrap();
        assert!(le.evaluate(&report)[0].passed);

        let ge = Threshold::new("http_req_duration", &["count>=100"]).unwrap();
        assert!(ge.evaluate(&report)[0].passed);

        let lt = Threshold::new("http_req_duration", &["p(95)<95"]).unwrap();
        assert!(!lt.evaluate(&report)[0].passed);
    }

    #[test]
    fn every_duration_stat_resolves() {
        let report = report();
        for expr in ["avg<1000", "med<1000", "min<1000", "max<1000", "p(50)<1000"] {
            let threshold = Threshold::new("http_req_duration", &[expr]).unwrap();
            let outcome = &threshold.evaluate(&report)[0];
            assert!(outcome.actual.is_some(), "{expr} did not resolve");
            assert!(outcome.passed, "{expr} should pass");
        }
    }

    #[test]
    fn rate_on_a_duration_metric_never_resolves() {
        let report = report();
        let threshold = Threshold::new("http_req_duration", &["rate<0.5"]).unwrap();
        let outcome = &threshold.evaluate(&report)[0];
        assert_eq!(outcome.actual, None);
        assert!(!outcome.passed);
    }

    #[test]
    fn multiple_expressions_yield_multiple_outcomes() {
        let report = report();
        let threshold =
            Threshold::new("http_req_duration", &["p(95)<100", "p(99)<50"]).unwrap();
        let outcomes = threshold.evaluate(&report);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].passed);
        assert!(!outcomes[1].passed);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let cases: &[(&str, &[&str])] = &[
            ("http_req_sparkle", &["rate<0.1"]),
            ("http_req_duration{test_type}", &["p(95)<100"]),
            ("http_req_duration{test_type:smoke", &["p(95)<100"]),
            ("http_req_duration", &[]),
            ("http_req_duration", &["p(95)"]),
            ("http_req_duration", &["p(97)<100"]),
            ("http_req_duration", &["sparkle<100"]),
            ("http_req_duration", &["p(95)<fast"]),
        ];
        for (selector, exprs) in cases {
            assert!(
                Threshold::new(selector, exprs).is_err(),
                "{selector} {exprs:?} should fail to parse"
            );
        }
    }

    #[test]
    fn outcome_display_names_the_criterion() {
        let report = report();
        let threshold =
            Threshold::new("http_req_duration{test_type:smoke}", &["p(95)<10"]).unwrap();
        let rendered = threshold.evaluate(&report)[0].to_string();
        assert!(rendered.starts_with("FAIL http_req_duration{test_type:smoke} p(95)<10"));
        assert!(rendered.contains("actual 95.00"));
    }
}

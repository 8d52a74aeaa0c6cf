use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use forno_macros::metric;
use serde::{Serialize, de::DeserializeOwned};

/// Metrics that should be collected and processed by the harness.
/// Metrics can be composed of other metrics as well.
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// Key/value labels attached to a sample. Ordered so grouped output is stable.
pub type Tags = BTreeMap<String, String>;

/// One timed request observation.
///
/// `status` is `None` when the request never produced a response (connect
/// failure, timeout, broken body). Those samples still count towards request
/// totals and the error rate.
#[metric]
pub struct Sample {
    pub timestamp: SystemTime,
    pub duration: Duration,
    pub status: Option<u16>,
    pub tags: Tags,
}

impl Sample {
    /// A sample is an error when there was no response at all or the server
    /// answered with a 4xx/5xx status.
    pub fn is_error(&self) -> bool {
        match self.status {
            None => true,
            Some(code) => code >= 400,
        }
    }
}

/// Outcome of a single named check evaluated against one response.
#[derive(serde::Serialize, serde::Deserialize, PartialOrd, PartialEq, Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

/// Everything one iteration produces: the timed sample plus the outcome of
/// every check that ran against the response.
#[metric]
pub struct HttpMetric {
    pub sample: Sample,
    pub checks: Vec<CheckResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: Option<u16>) -> Sample {
        Sample {
            timestamp: SystemTime::UNIX_EPOCH,
            duration: Duration::from_millis(5),
            status,
            tags: Tags::new(),
        }
    }

    #[test]
    fn missing_response_is_an_error() {
        assert!(sample(None).is_error());
    }

    #[test]
    fn client_and_server_statuses_are_errors() {
        assert!(sample(Some(400)).is_error());
        assert!(sample(Some(404)).is_error());
        assert!(sample(Some(500)).is_error());
    }

    #[test]
    fn success_statuses_are_not_errors() {
        assert!(!sample(Some(200)).is_error());
        assert!(!sample(Some(201)).is_error());
        assert!(!sample(Some(399)).is_error());
    }
}

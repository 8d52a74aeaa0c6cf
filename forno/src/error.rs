//! Error and result types shared across the crate.

use thiserror::Error;

/// Convenience alias used by every fallible API in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A scenario or executor was configured in a way that cannot run,
    /// e.g. a ramping executor with no stages.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("invalid base url {url:?}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid threshold {expr:?}: {reason}")]
    Threshold { expr: String, reason: String },

    /// A pattern set was built with no patterns in it.
    #[error("pattern set has no patterns")]
    EmptyPatternSet,

    /// Pattern weights must be finite and positive.
    #[error("pattern {index} has invalid weight {weight}")]
    InvalidWeight { index: usize, weight: f64 },

    /// The executor's own machinery failed, as opposed to the traffic it
    /// was generating. Worker panics do not end up here; they are folded
    /// into the aggregate as faults.
    #[error("executor failure: {0}")]
    Executor(String),
}

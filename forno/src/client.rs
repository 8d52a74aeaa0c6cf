//! HTTP client for the ordering API.

use std::time::{Duration, Instant};

use reqwest::header::ACCEPT;
use url::Url;

use crate::check::ResponseView;
use crate::error::{Error, Result};
use crate::order::OrderRequest;

/// Where the service listens when run locally.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3333";

/// Cheap to clone; hand one to every scenario action instead of building
/// clients inside the action.
#[derive(Debug, Clone)]
pub struct PizzaClient {
    http: reqwest::Client,
    base: String,
}

impl PizzaClient {
    /// Validates the base URL up front so a typo fails at startup rather than
    /// on the first request of a long run.
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let base = base.into();
        Url::parse(&base).map_err(|source| Error::BaseUrl {
            url: base.clone(),
            source,
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Reads `BASE_URL` from the environment, falling back to the local
    /// default.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// POSTs the order and times the full exchange, body download included.
    pub async fn order(&self, order: &OrderRequest) -> Result<ResponseView> {
        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/order-pizza", self.base))
            .header(ACCEPT, "application/json")
            .json(order)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ResponseView::new(status, started.elapsed(), body))
    }

    /// GETs the health endpoint and returns the status code. Transport
    /// failures surface as errors.
    pub async fn health(&self) -> Result<u16> {
        let response = self.http.get(format!("{}/health", self.base)).send().await?;
        Ok(response.status().as_u16())
    }
}

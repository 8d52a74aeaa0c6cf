//! Runner — composition of whole load-test runs.
//!
//! A [`Runner`] owns everything around the scenarios themselves: an optional
//! health probe against the target, an optional async setup hook whose value
//! is shared with every scenario, concurrent scenario execution with start
//! offsets, threshold evaluation over the merged metrics, and a teardown
//! hook that sees the finished [`RunReport`].
//!
//! Scenarios are spawned together and each sleeps its own start offset
//! first, so non-overlapping offsets serialize execution while overlapping
//! ones genuinely run concurrently.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::aggregate::{Aggregate, HttpAggregate};
use crate::client::PizzaClient;
use crate::error::Result;
use crate::executor::{Executor, IterInfo};
use crate::metric::{HttpMetric, Tags};
use crate::report::{HttpReport, RunReport, ScenarioStatus};
use crate::scenario::Scenario;
use crate::threshold::{Threshold, ThresholdOutcome};

/// Values shared with every scenario for the duration of one run.
#[derive(Debug)]
pub struct RunContext {
    pub started_at: SystemTime,
    /// Whatever the setup hook returned; `Value::Null` without one.
    pub data: Value,
}

/// What to do when the pre-run health probe fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbePolicy {
    /// Log a warning and run anyway.
    #[default]
    Warn,
    /// Mark every scenario aborted and skip the run.
    Abort,
}

type ScenarioFuture = BoxFuture<'static, Result<HttpAggregate>>;
type ScenarioFactory = Box<dyn FnOnce(Arc<RunContext>) -> ScenarioFuture + Send>;
type SetupHook = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value>> + Send>;
type TeardownHook = Box<dyn FnOnce(Arc<RunContext>, RunReport) -> BoxFuture<'static, Result<()>> + Send>;

struct ScenarioEntry {
    name: String,
    offset: Duration,
    tags: Tags,
    factory: ScenarioFactory,
}

/// Composes a whole run out of scenarios, hooks, and thresholds.
pub struct Runner {
    entries: Vec<ScenarioEntry>,
    thresholds: Vec<Threshold>,
    setup: Option<SetupHook>,
    teardown: Option<TeardownHook>,
    probe: Option<(PizzaClient, ProbePolicy)>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            thresholds: Vec::new(),
            setup: None,
            teardown: None,
            probe: None,
        }
    }

    /// Health-check the target before any virtual user starts.
    pub fn probe(mut self, client: PizzaClient, policy: ProbePolicy) -> Self {
        self.probe = Some((client, policy));
        self
    }

    /// Pre-run hook. Its value lands in [`RunContext::data`]. A failing
    /// setup hook aborts the whole run before any scenario starts.
    pub fn setup<S, Fut>(mut self, hook: S) -> Self
    where
        S: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.setup = Some(Box::new(move || hook().boxed()));
        self
    }

    /// Post-run hook, called with the context and the finished report. A
    /// failing teardown is logged but does not change the verdict.
    pub fn teardown<T, Fut>(mut self, hook: T) -> Self
    where
        T: FnOnce(Arc<RunContext>, RunReport) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.teardown = Some(Box::new(move |ctx, report| hook(ctx, report).boxed()));
        self
    }

    pub fn threshold(mut self, threshold: Threshold) -> Self {
        self.thresholds.push(threshold);
        self
    }

    pub fn thresholds<I>(mut self, thresholds: I) -> Self
    where
        I: IntoIterator<Item = Threshold>,
    {
        self.thresholds.extend(thresholds);
        self
    }

    /// Register a fully built scenario. Its `tags` and `start_offset` are
    /// honored by the run.
    pub fn scenario<E, F, Fut>(mut self, scenario: Scenario<HttpAggregate, E, F, Fut>) -> Self
    where
        E: Executor<HttpAggregate, F, Fut> + Send + Sync + 'static,
        F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = HttpMetric> + Send + 'static,
    {
        let name = scenario.name.clone();
        let offset = scenario.start_offset;
        let tags = scenario.tags.clone();
        self.entries.push(ScenarioEntry {
            name,
            offset,
            tags,
            factory: Box::new(move |_ctx| {
                let mut scenario = scenario;
                async move { scenario.run().await }.boxed()
            }),
        });
        self
    }

    /// Register a scenario that needs the run context, e.g. to thread setup
    /// data into its action. The factory builds and runs the scenario.
    pub fn scenario_with<B, Fut>(
        mut self,
        name: impl Into<String>,
        offset: Duration,
        factory: B,
    ) -> Self
    where
        B: FnOnce(Arc<RunContext>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<HttpAggregate>> + Send + 'static,
    {
        self.entries.push(ScenarioEntry {
            name: name.into(),
            offset,
            tags: Tags::new(),
            factory: Box::new(move |ctx| factory(ctx).boxed()),
        });
        self
    }

    pub async fn run(self) -> Result<RunReport> {
        let started_at = SystemTime::now();
        let started = Instant::now();
        let mut scenarios: BTreeMap<String, ScenarioStatus> = BTreeMap::new();

        if let Some((client, policy)) = &self.probe {
            let failure = match client.health().await {
                Ok(status) if status < 400 => {
                    tracing::info!("Health probe ok: {status}");
                    None
                }
                Ok(status) => Some(format!("health probe returned {status}")),
                Err(e) => Some(format!("health probe failed: {e}")),
            };
            if let Some(reason) = failure {
                match policy {
                    ProbePolicy::Warn => tracing::warn!("{reason}, continuing anyway"),
                    ProbePolicy::Abort => {
                        tracing::error!("{reason}, aborting the run");
                        for entry in &self.entries {
                            scenarios.insert(
                                entry.name.clone(),
                                ScenarioStatus::Aborted {
                                    reason: reason.clone(),
                                },
                            );
                        }
                        let metrics = HttpReport::from(HttpAggregate::new());
                        let thresholds = evaluate_thresholds(&self.thresholds, &metrics);
                        return Ok(RunReport {
                            started_at,
                            duration: started.elapsed(),
                            metrics,
                            thresholds,
                            scenarios,
                            success: false,
                        });
                    }
                }
            }
        }

        let data = match self.setup {
            Some(hook) => hook().await?,
            None => Value::Null,
        };
        let ctx = Arc::new(RunContext { started_at, data });

        tracing::info!("Spawning scenarios...");
        let mut running = Vec::new();
        for entry in self.entries {
            let ScenarioEntry {
                name,
                offset,
                tags,
                factory,
            } = entry;
            let ctx = Arc::clone(&ctx);
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                if !offset.is_zero() {
                    tracing::info!("Scenario {task_name} waiting {offset:?} before starting");
                    tokio::time::sleep(offset).await;
                }
                factory(ctx).await
            });
            running.push((name, tags, handle));
        }

        let mut merged = HttpAggregate::new();
        for (name, tags, handle) in running {
            match handle.await {
                Ok(Ok(mut aggregate)) => {
                    stamp_scenario_tags(&mut aggregate, &name, &tags);
                    merged.merge(aggregate);
                    scenarios.insert(name, ScenarioStatus::Completed);
                }
                Ok(Err(e)) => {
                    tracing::error!("Scenario {name} aborted: {e}");
                    scenarios.insert(name, ScenarioStatus::Aborted { reason: e.to_string() });
                }
                Err(e) => {
                    tracing::error!("Scenario {name} panicked: {e}");
                    scenarios.insert(
                        name,
                        ScenarioStatus::Aborted {
                            reason: format!("scenario task panicked: {e}"),
                        },
                    );
                }
            }
        }

        let metrics = HttpReport::from(merged);
        let thresholds = evaluate_thresholds(&self.thresholds, &metrics);
        let aborted = scenarios
            .values()
            .any(|status| matches!(status, ScenarioStatus::Aborted { .. }));
        let success = !aborted && thresholds.iter().all(|outcome| outcome.passed);

        let report = RunReport {
            started_at,
            duration: started.elapsed(),
            metrics,
            thresholds,
            scenarios,
            success,
        };

        if let Some(teardown) = self.teardown {
            if let Err(e) = teardown(Arc::clone(&ctx), report.clone()).await {
                tracing::warn!("Teardown failed: {e}");
            }
        }

        Ok(report)
    }
}

fn evaluate_thresholds(thresholds: &[Threshold], metrics: &HttpReport) -> Vec<ThresholdOutcome> {
    thresholds
        .iter()
        .flat_map(|threshold| threshold.evaluate(metrics))
        .collect()
}

/// Scenario-level tags land on every sample the scenario produced, without
/// overriding anything the action already set. The scenario name itself goes
/// on as the `scenario` tag.
fn stamp_scenario_tags(aggregate: &mut HttpAggregate, scenario: &str, tags: &Tags) {
    for sample in &mut aggregate.samples {
        sample
            .tags
            .entry("scenario".to_string())
            .or_insert_with(|| scenario.to_string());
        for (key, value) in tags {
            sample
                .tags
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

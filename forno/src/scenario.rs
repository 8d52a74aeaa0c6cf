use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::aggregate::Aggregate;
use crate::error::Result;
use crate::executor::{Executor, IterInfo};
use crate::metric::Tags;

#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut> + Send + Sync,
    F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    #[builder(setter(into))]
    pub name: String,
    pub action: F,
    pub executor: E,
    /// Labels the runner stamps onto every sample this scenario produced,
    /// without overriding tags the action set itself. Running a scenario
    /// directly skips the stamping.
    #[builder(default)]
    pub tags: Tags,
    /// How long the runner waits before starting this scenario, so staggered
    /// profiles can share one run.
    #[builder(default)]
    pub start_offset: Duration,
    #[builder(default, setter(skip))]
    aggregator: PhantomData<A>,
}

impl<A, E, F, Fut> Scenario<A, E, F, Fut>
where
    A: Aggregate,
    E: Executor<A, F, Fut> + Send + Sync,
    F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    pub async fn run(&mut self) -> Result<A> {
        self.executor.exec(self).await
    }
}

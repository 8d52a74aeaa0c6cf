use tokio::task::JoinHandle;
use typed_builder::TypedBuilder;

use super::internals::*;
use super::{Executor, IterInfo, ThinkTime};
use crate::error::{Error, Result};
use crate::{aggregate::Aggregate, scenario::Scenario};

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;

/// Executor that holds a fixed population of virtual users.
///
/// Every user loops through the scenario's action until a stop condition is
/// hit. At least one of the two must be set:
///
/// - `duration`: wall-clock budget for the whole population. When it elapses
///   the users finish their current iteration and stop.
/// - `iterations`: per-user iteration cap. With `vus(3).iterations(10)` the
///   run produces exactly 30 iterations.
///
/// Use `ConstantVus::builder().vus(10).duration(Duration::from_secs(60))` for
/// a classic steady-load profile.
#[derive(TypedBuilder)]
pub struct ConstantVus {
    pub vus: u64,
    #[builder(default, setter(strip_option))]
    pub duration: Option<Duration>,
    #[builder(default, setter(strip_option))]
    pub iterations: Option<u64>,
    #[builder(default)]
    pub think: ThinkTime,
}

impl<A, F, Fut> Executor<A, F, Fut> for ConstantVus
where
    Self: Send + Sync + Sized,
    A: Aggregate + 'static,
    F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    async fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> Result<A> {
        if self.vus == 0 {
            return Err(Error::InvalidScenario(
                "constant executor needs at least one virtual user".into(),
            ));
        }
        if self.duration.is_none() && self.iterations.is_none() {
            return Err(Error::InvalidScenario(
                "constant executor needs a duration or an iteration cap".into(),
            ));
        }

        let (ctx, start_tx, shutdown_tx) = ExecutionContext::new();
        tracing::info!("Spawning workers...");
        let handles: Vec<JoinHandle<A>> = (1..=self.vus)
            .map(|vu| {
                let ctx = ctx.clone();
                let retire = ctx.shutdown.clone();
                let action = scenario.action.clone();
                tokio::spawn(vu_loop(ctx, retire, vu, action, self.think, self.iterations))
            })
            .collect();

        tracing::info!("Running now!");
        let _ = start_tx.send(true);

        let mut all_done = join_all(handles);
        let results = match self.duration {
            Some(limit) => {
                tokio::select! {
                    results = &mut all_done => results,
                    _ = tokio::time::sleep(limit) => {
                        // workers notice at their next iteration boundary,
                        // in-flight requests run to completion
                        let _ = shutdown_tx.send(true);
                        all_done.await
                    }
                }
            }
            None => all_done.await,
        };

        tracing::info!("Retrieving data from workers...");
        let final_agg = merge_results(results);
        tracing::info!("Done running scenario: {}!", scenario.name);
        Ok(final_agg)
    }
}

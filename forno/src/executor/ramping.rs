use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::internals::*;
use super::{Executor, IterInfo, ThinkTime};
use crate::error::{Error, Result};
use crate::{aggregate::Aggregate, scenario::Scenario};
use internals::*;

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;

/// A stage defines a target number of virtual users and how long to ramp to
/// that target.
///
/// Use `Stage::new(Duration::from_secs(20), 10)` to ramp to 10 users over 20s.
/// A zero-duration stage jumps straight to its target.
#[derive(Clone, Copy, Debug)]
pub struct Stage {
    pub duration: Duration,
    /// Virtual users active once the stage completes
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Executor that moves a population of virtual users through ramp stages.
///
/// - A governor task owns the pool and resizes it every `tick`, interpolating
///   linearly from the previous target to the current stage's target.
/// - Users added mid-run start a fresh loop with a fresh 1-based id; ids are
///   never reused.
/// - Users removed mid-run finish their current iteration before retiring,
///   newest first.
///
/// The classic ramp-up/hold/ramp-down profile is three stages:
/// `[Stage::new(up, n), Stage::new(hold, n), Stage::new(down, 0)]`.
#[derive(TypedBuilder)]
pub struct RampingVus {
    #[builder(default = 0)]
    pub start_vus: u64,
    pub stages: Vec<Stage>,
    #[builder(default = Duration::from_millis(100))]
    pub tick: Duration,
    #[builder(default)]
    pub think: ThinkTime,
}

impl<A, F, Fut> Executor<A, F, Fut> for RampingVus
where
    Self: Send + Sync + Sized,
    A: Aggregate + 'static,
    F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send + 'static,
{
    async fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> Result<A> {
        if self.stages.is_empty() {
            return Err(Error::InvalidScenario(
                "ramping executor needs at least one stage".into(),
            ));
        }

        let (ctx, start_tx, shutdown_tx) = ExecutionContext::new();
        tracing::info!("Spawning population governor task...");
        let governor = tokio::spawn(population_governor(
            ctx.clone(),
            self.stages.clone(),
            self.start_vus,
            self.tick,
            self.think,
            scenario.action.clone(),
        ));

        tracing::info!("Running now!");
        let _ = start_tx.send(true);

        // The governor returning means the profile has played out
        let handles = governor
            .await
            .map_err(|e| Error::Executor(format!("population governor panicked: {e}")))?;
        let _ = shutdown_tx.send(true);

        tracing::info!("Retrieving data from workers...");
        let final_agg = merge_results(join_all(handles).await);
        tracing::info!("Done running scenario: {}!", scenario.name);
        Ok(final_agg)
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

mod internals {
    use super::*;

    /// One live virtual user owned by the governor.
    pub struct VuHandle<A> {
        pub vu: u64,
        pub retire: watch::Sender<bool>,
        pub handle: JoinHandle<A>,
    }

    pub fn spawn_vu<A, F, Fut>(
        ctx: &ExecutionContext,
        vu: u64,
        action: F,
        think: ThinkTime,
    ) -> VuHandle<A>
    where
        A: Aggregate + 'static,
        F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = A::Metric> + Send + 'static,
    {
        let (retire_tx, retire_rx) = watch::channel(false);
        let handle = tokio::spawn(vu_loop(ctx.clone(), retire_rx, vu, action, think, None));
        VuHandle {
            vu,
            retire: retire_tx,
            handle,
        }
    }

    /// Grow or shrink the pool to `target`. Newest users retire first, and a
    /// retired user's handle is kept so its aggregate is not lost.
    pub fn adjust_population<A, F, Fut>(
        pool: &mut Vec<VuHandle<A>>,
        finished: &mut Vec<JoinHandle<A>>,
        next_vu: &mut u64,
        target: u64,
        ctx: &ExecutionContext,
        action: &F,
        think: ThinkTime,
    ) where
        A: Aggregate + 'static,
        F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = A::Metric> + Send + 'static,
    {
        while (pool.len() as u64) < target {
            pool.push(spawn_vu(ctx, *next_vu, action.clone(), think));
            *next_vu += 1;
        }
        while (pool.len() as u64) > target {
            if let Some(vu) = pool.pop() {
                tracing::debug!("Retiring virtual user {}", vu.vu);
                let _ = vu.retire.send(true);
                finished.push(vu.handle);
            }
        }
    }

    /// Governor task that owns the worker pool and resizes it according to
    /// the stages. Returns the join handles of every user ever spawned.
    pub async fn population_governor<A, F, Fut>(
        mut ctx: ExecutionContext,
        stages: Vec<Stage>,
        start_vus: u64,
        tick: Duration,
        think: ThinkTime,
        action: F,
    ) -> Vec<JoinHandle<A>>
    where
        A: Aggregate + 'static,
        F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = A::Metric> + Send + 'static,
    {
        let mut pool: Vec<VuHandle<A>> = Vec::new();
        let mut finished: Vec<JoinHandle<A>> = Vec::new();
        let mut next_vu: u64 = 1;

        // wait until the run has started
        if ctx.start.wait_for(|started| *started).await.is_err() {
            return finished;
        }

        adjust_population(
            &mut pool,
            &mut finished,
            &mut next_vu,
            start_vus,
            &ctx,
            &action,
            think,
        );
        let mut current = start_vus;

        'stages: for stage in stages.into_iter() {
            // instantly jump to the target population
            // This makes it possible to model spikes or start at a level
            // other than zero in the same api
            if stage.duration.is_zero() {
                tracing::info!("Jumping to {} users", stage.target);
                adjust_population(
                    &mut pool,
                    &mut finished,
                    &mut next_vu,
                    stage.target,
                    &ctx,
                    &action,
                    think,
                );
                current = stage.target;
                continue;
            }

            tracing::info!(
                "Ramping from {} to {} users over {:?}",
                current,
                stage.target,
                stage.duration
            );
            let stage_start = Instant::now();
            let mut next_tick = Instant::now();
            let from = current;

            loop {
                let elapsed = Instant::now().duration_since(stage_start);
                next_tick += tick;
                if elapsed >= stage.duration {
                    break;
                }

                let want = population_at(elapsed, stage.duration, from, stage.target);
                adjust_population(
                    &mut pool,
                    &mut finished,
                    &mut next_vu,
                    want,
                    &ctx,
                    &action,
                    think,
                );

                tokio::select! {
                    _ = tokio::time::sleep_until(next_tick) => {}
                    _ = ctx.shutdown.wait_for(|stop| *stop) => break 'stages,
                }
            }
            // Land exactly on the stage target so the next stage always
            // starts from the correct point instead of a rounded level
            adjust_population(
                &mut pool,
                &mut finished,
                &mut next_vu,
                stage.target,
                &ctx,
                &action,
                think,
            );
            current = stage.target;
        }

        // drain: everyone retires, every handle goes back to the executor
        adjust_population(&mut pool, &mut finished, &mut next_vu, 0, &ctx, &action, think);
        finished
    }

    /// Pure function responsible for calculating the population this tick
    pub fn population_at(elapsed: Duration, stage_duration: Duration, from: u64, to: u64) -> u64 {
        // interpolation factor [0..1]
        let t = (elapsed.as_secs_f64() / stage_duration.as_secs_f64()).min(1.0);
        // linear interpolation, rounded to whole users
        let level = from as f64 + (to as f64 - from as f64) * t;
        level.round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Metric, macros::*};
    use std::collections::BTreeSet;

    #[metric]
    struct GaugeMetric {
        vu: u64,
    }

    #[aggregate]
    #[derive(Default)]
    struct GaugeAggregate {
        count: u64,
        vus: BTreeSet<u64>,
    }

    impl Aggregate for GaugeAggregate {
        type Metric = GaugeMetric;

        fn new() -> Self {
            Self::default()
        }

        fn consume(&mut self, metric: &Self::Metric) {
            self.count += 1;
            self.vus.insert(metric.vu);
        }

        fn merge(&mut self, other: Self) {
            self.count += other.count;
            self.vus.extend(other.vus);
        }
    }

    fn observe(info: IterInfo) -> impl Future<Output = GaugeMetric> + Send {
        async move { GaugeMetric { vu: info.vu } }
    }

    #[test]
    fn population_tracks_the_ramp() {
        let ten = Duration::from_secs(10);
        assert_eq!(population_at(Duration::ZERO, ten, 4, 10), 4);
        assert_eq!(population_at(Duration::from_secs(5), ten, 0, 10), 5);
        assert_eq!(population_at(ten, ten, 0, 10), 10);
        // past the end of the stage the level clamps at the target
        assert_eq!(population_at(Duration::from_secs(15), ten, 0, 10), 10);
        // downramps shrink toward the target
        assert_eq!(population_at(Duration::from_secs(5), ten, 10, 0), 5);
        // halfway users round to the nearest whole one
        assert_eq!(population_at(Duration::from_secs(1), Duration::from_secs(4), 0, 10), 3);
    }

    #[tokio::test]
    async fn rejects_an_empty_stage_list() {
        let err = Scenario::<GaugeAggregate, _, _, _>::builder()
            .name("no stages")
            .action(observe)
            .executor(RampingVus::builder().stages(vec![]).build())
            .build()
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidScenario(_)));
    }

    #[tokio::test]
    async fn adjust_population_grows_and_shrinks_the_pool() {
        let (ctx, start_tx, _shutdown_tx) = ExecutionContext::new();
        let mut pool: Vec<VuHandle<GaugeAggregate>> = Vec::new();
        let mut finished = Vec::new();
        let mut next_vu = 1;
        let action = observe;

        adjust_population(
            &mut pool,
            &mut finished,
            &mut next_vu,
            3,
            &ctx,
            &action,
            ThinkTime::None,
        );
        assert_eq!(pool.len(), 3);
        assert_eq!(next_vu, 4);

        adjust_population(
            &mut pool,
            &mut finished,
            &mut next_vu,
            1,
            &ctx,
            &action,
            ThinkTime::None,
        );
        assert_eq!(pool.len(), 1);
        assert_eq!(finished.len(), 2);
        // newest retire first, the original user keeps running
        assert_eq!(pool[0].vu, 1);

        adjust_population(
            &mut pool,
            &mut finished,
            &mut next_vu,
            2,
            &ctx,
            &action,
            ThinkTime::None,
        );
        // retired ids are never reused
        assert_eq!(next_vu, 5);
        assert_eq!(pool[1].vu, 4);

        // unblock and drain everything so the test does not leak tasks
        let _ = start_tx.send(true);
        adjust_population(
            &mut pool,
            &mut finished,
            &mut next_vu,
            0,
            &ctx,
            &action,
            ThinkTime::None,
        );
        let results = join_all(finished).await;
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn a_jump_stage_brings_users_up_immediately() {
        let agg = Scenario::<GaugeAggregate, _, _, _>::builder()
            .name("spike")
            .action(observe)
            .executor(
                RampingVus::builder()
                    .stages(vec![
                        Stage::new(Duration::ZERO, 2),
                        Stage::new(Duration::from_millis(60), 2),
                    ])
                    .tick(Duration::from_millis(10))
                    .build(),
            )
            .build()
            .run()
            .await
            .unwrap();

        assert_eq!(agg.vus, BTreeSet::from([1, 2]));
        assert!(agg.count >= 2);
    }
}

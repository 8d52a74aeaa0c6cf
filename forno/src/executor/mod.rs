//! Executors — virtual-user scheduling for scenarios.
//!
//! The `Executor` trait is the runtime hook that executes a `Scenario`.
//! The two built-ins model load the way browser-facing services are usually
//! tested: a population of virtual users (VUs), each looping through the
//! scenario's action with optional think-time between iterations.
//!
//! - [`ConstantVus`] holds the population steady for a duration or an
//!   iteration budget.
//! - [`RampingVus`] moves the population through a list of [`Stage`]s,
//!   interpolating linearly inside each stage.
//!
//! # High-level flow
//! 1. Spawn the virtual users (for ramps, a governor task owns the pool and
//!    grows or shrinks it every tick).
//! 2. Flip the shared start flag so every user begins together.
//! 3. When the profile has played out, flip the shutdown flag and drain the
//!    worker-local aggregates, merging them into the final result.
//!
//! # Graceful stop
//! Stop signals are only honored **between** iterations. A user that is
//! mid-request when the clock runs out finishes that request and records its
//! metric; nothing is cancelled in flight. Think-time pauses, on the other
//! hand, end early on either signal. This means a run can overshoot its
//! nominal duration by at most one action's latency per user.
//!
//! # Panics in actions
//! An action that panics does not take its worker down. The panic is caught
//! at the iteration boundary, logged, and recorded through
//! [`Aggregate::fault`] so the lost iteration still shows up in totals.

pub mod constant;
pub mod ramping;

pub use constant::ConstantVus;
pub use ramping::{RampingVus, Stage};

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::aggregate::Aggregate;
use crate::error::Result;
use crate::scenario::Scenario;

/// Identity of one iteration, handed to the action so requests can be
/// labelled with who issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterInfo {
    /// 1-based virtual user id, unique within one scenario execution.
    pub vu: u64,
    /// 0-based iteration counter within that virtual user.
    pub iteration: u64,
}

/// Pause between two iterations of the same virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThinkTime {
    #[default]
    None,
    Fixed(Duration),
    /// Uniformly random pause, both ends inclusive.
    Uniform { min: Duration, max: Duration },
}

impl ThinkTime {
    /// Uniform pause between `min` and `max`; the bounds are swapped if they
    /// arrive reversed.
    pub fn uniform(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self::Uniform { min, max }
        } else {
            Self::Uniform { min: max, max: min }
        }
    }

    /// Draws the next pause. `None` means do not sleep at all. Reversed
    /// `Uniform` bounds draw as if they were swapped.
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed(pause) if pause.is_zero() => None,
            Self::Fixed(pause) => Some(*pause),
            Self::Uniform { min, max } => {
                // Struct literals can bypass `uniform()`, so normalize here
                // too; `gen_range` panics on an empty range.
                let (lo, hi) = if min <= max {
                    (*min, *max)
                } else {
                    (*max, *min)
                };
                if hi.is_zero() {
                    return None;
                }
                let mut rng = rand::thread_rng();
                Some(rng.gen_range(lo..=hi))
            }
        }
    }
}

pub trait Executor<A, F, Fut>
where
    Self: Send + Sync + Sized,
    A: Aggregate,
    F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = A::Metric> + Send,
{
    /// Execute the scenario and return the merged aggregate.
    fn exec(&self, scenario: &Scenario<A, Self, F, Fut>) -> impl Future<Output = Result<A>> + Send;
}

#[cfg(feature = "internals")]
pub use internals::*;

mod internals {
    use std::future::Future;

    use futures::FutureExt;
    use tokio::sync::watch::{self, Receiver, Sender};
    use tokio::task::JoinError;

    use super::{IterInfo, ThinkTime};
    use crate::aggregate::Aggregate;
    use crate::check::panic_label;

    /// Lifecycle signals shared by every task belonging to one execution.
    /// Watch channels instead of notify so a flag flipped before a late
    /// subscriber looks is still observed.
    #[derive(Clone)]
    pub struct ExecutionContext {
        pub start: Receiver<bool>,
        pub shutdown: Receiver<bool>,
    }

    impl ExecutionContext {
        pub fn new() -> (Self, Sender<bool>, Sender<bool>) {
            let (start_tx, start_rx) = watch::channel(false);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            (
                Self {
                    start: start_rx,
                    shutdown: shutdown_rx,
                },
                start_tx,
                shutdown_tx,
            )
        }
    }

    /// The loop one virtual user runs for its whole life.
    ///
    /// Stop conditions (shutdown, per-user retirement, the optional
    /// iteration cap) are checked between iterations only; an in-flight
    /// action always completes. Think-time sleeps end early on either
    /// signal.
    pub async fn vu_loop<A, F, Fut>(
        mut ctx: ExecutionContext,
        mut retire: Receiver<bool>,
        vu: u64,
        action: F,
        think: ThinkTime,
        iterations: Option<u64>,
    ) -> A
    where
        A: Aggregate,
        F: Fn(IterInfo) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = A::Metric> + Send,
    {
        let mut agg = A::new();
        // wait for the green flag; a dropped sender means the run was torn
        // down before it started
        if ctx.start.wait_for(|started| *started).await.is_err() {
            return agg;
        }

        let mut iteration: u64 = 0;
        loop {
            if *ctx.shutdown.borrow() || *retire.borrow() {
                break;
            }
            if iterations.is_some_and(|cap| iteration >= cap) {
                break;
            }

            let info = IterInfo { vu, iteration };
            match std::panic::AssertUnwindSafe(action(info)).catch_unwind().await {
                Ok(metric) => agg.consume(&metric),
                Err(payload) => {
                    tracing::error!(
                        vu,
                        iteration,
                        "iteration panicked: {}",
                        panic_label(payload.as_ref())
                    );
                    agg.fault("iteration panicked");
                }
            }
            iteration += 1;

            match think.delay() {
                Some(pause) => {
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = ctx.shutdown.wait_for(|stop| *stop) => break,
                        _ = retire.wait_for(|stop| *stop) => break,
                    }
                }
                // an action that never hits a leaf future would otherwise
                // hog the scheduler and starve the governor
                None => tokio::task::yield_now().await,
            }
        }
        agg
    }

    /// Merge drained worker results. A panicked worker loses its local data
    /// but must not lose everyone else's.
    pub fn merge_results<A: Aggregate>(results: Vec<Result<A, JoinError>>) -> A {
        let mut merged = A::new();
        for result in results {
            match result {
                Ok(agg) => merged.merge(agg),
                Err(e) => tracing::error!("Worker panicked with error: {e}"),
            }
        }
        merged
    }
}

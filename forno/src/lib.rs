//! Forno — a load-testing harness for the QuickPizza ordering API.
//!
//! Forno packages the usual smoke/load/stress/spike exercises against the
//! pizza ordering service as a library: you compose scenarios out of small
//! building blocks (actions, executors, aggregates, thresholds) and hand
//! them to a [`Runner`] that plays them concurrently and grades the result.
//!
//! The building blocks are deliberately generic. The HTTP layer and the
//! ready-made suites know about pizzas; the scenario and executor layers
//! only know about actions producing metrics, so the same machinery drives
//! any request/response workload.
//!
//! # Architecture
//!
//! - [`Scenario`]: glue that ties everything together — a named action plus
//!   the executor that schedules it.
//! - [`Executor`]: runs the scenario. [`ConstantVus`] holds a fixed pool of
//!   virtual users; [`RampingVus`] walks a list of stages, adjusting the
//!   pool as it goes.
//! - [`Metric`]: the smallest unit produced by an action. The HTTP flavor,
//!   [`HttpMetric`](metric::HttpMetric), is one timed sample plus its check
//!   outcomes.
//! - [`Aggregate`]: folds metrics into a compact intermediate form as they
//!   arrive, one instance per virtual user, merged at the end.
//! - [`Threshold`]: a pass/fail criterion over the aggregated numbers, in
//!   the familiar `p(95)<2000` notation.
//! - [`Runner`]: plays several scenarios as one run — health probe, setup
//!   hook, staggered starts, threshold grading, teardown hook.
//! - [`Report`]/[`Reporter`]: turn aggregates into summaries and deliver
//!   them somewhere.
//!
//! # Example
//!
//! A short offline-friendly run (nothing needs to listen on the target; the
//! connection failures just show up as failed samples):
//!
//! ```rust
//! use forno::{
//!     Reporter, Runner, Scenario,
//!     aggregate::HttpAggregate,
//!     client::PizzaClient,
//!     executor::ConstantVus,
//!     report::StdoutReporter,
//!     suite::{default_thresholds, order_action, order_mix},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     // Build the client once and clone it into actions; never construct
//!     // one inside the action itself.
//!     let client = PizzaClient::new("http://localhost:3333").unwrap();
//!
//!     let scenario = Scenario::<HttpAggregate, _, _, _>::builder()
//!         .name("quick_check")
//!         .action(order_action(
//!             client.clone(),
//!             order_mix(),
//!             "order-pizza",
//!             "smoke",
//!         ))
//!         .executor(ConstantVus::builder().vus(2).iterations(3).build())
//!         .build();
//!
//!     let report = Runner::new()
//!         .scenario(scenario)
//!         .thresholds(default_thresholds())
//!         .run()
//!         .await
//!         .unwrap();
//!
//!     StdoutReporter.report(&report).await.unwrap();
//! }
//! ```
//!
//! For the full preset suites see [`suite`]; `examples/order_pizza.rs` runs
//! them against a live service.
//!
//! # Feature flags
//!
//! - `macros`: small procedural macros that derive the trait plumbing for
//!   custom metrics and aggregates. (Enabled by default)
//! - `internals`: re-exports the executor plumbing (virtual-user loop,
//!   execution context, population governor) for writing custom executors.
//!
//! # Where to start
//!
//! - Read the docs for [`Scenario`], [`Runner`] and [`suite`].
//! - See `examples/` for a runnable session against a local QuickPizza
//!   instance.

/// Metric aggregators
pub mod aggregate;
/// Check sets evaluated against order responses
pub mod check;
/// HTTP client for the pizza ordering API
pub mod client;
/// Error and result types used across the crate
pub mod error;
/// Orchestrators that define how things will actually run
pub mod executor;
/// Weighted random generation of order payloads
pub mod generator;
/// Single metrics
pub mod metric;
/// Order request and response payloads plus fixtures
pub mod order;
/// Reports and Reporters
pub mod report;
/// Multi-scenario orchestration with hooks and grading
pub mod runner;
/// Main module of the framework that glues everything together
pub mod scenario;
/// Ready-made scenarios, mixes and threshold sets
pub mod suite;
/// Pass/fail criteria over aggregated metrics
pub mod threshold;

pub use aggregate::Aggregate;
pub use error::{Error, Result};
pub use executor::{ConstantVus, Executor, RampingVus, Stage, ThinkTime};
pub use metric::Metric;
pub use report::{Report, Reporter, RunReport};
pub use runner::{ProbePolicy, Runner};
pub use scenario::Scenario;
pub use threshold::Threshold;

#[cfg(feature = "macros")]
/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use forno_macros::*;
}

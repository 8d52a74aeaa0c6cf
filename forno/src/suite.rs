//! Ready-made scenarios, traffic mixes and threshold sets for the pizza
//! ordering service.
//!
//! Everything here is wiring over the lower layers: actions combine
//! [`PizzaClient`] calls with the check sets from [`crate::check`], mixes are
//! [`PatternSet`]s over the fixture orders, and the presets mirror the
//! profiles the service is usually exercised with. Hand the presets to a
//! [`Runner`](crate::runner::Runner) as they are, or use them as a starting
//! point for custom profiles.
//!
//! Four families ship out of the box:
//!
//! - the order suite ([`smoke_test`], [`load_test`], [`stress_test`],
//!   [`spike_test`]) driving the default 70/15/10/5 mix,
//! - the [`performance`] module, five staggered scenarios meant to run as one
//!   long session,
//! - [`functional_test`], one pass over every named request fixture,
//! - [`boundary_test`], one pass over the odd-shaped orders.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures::FutureExt;
use futures::future::BoxFuture;
use rand::{Rng, RngCore};

use crate::aggregate::HttpAggregate;
use crate::check::order_checks;
use crate::client::PizzaClient;
use crate::error::Error;
use crate::executor::{ConstantVus, IterInfo, RampingVus, Stage, ThinkTime};
use crate::generator::{OrderBounds, Pattern, PatternSet, random_order};
use crate::metric::{CheckResult, HttpMetric, Sample, Tags};
use crate::order::OrderRequest;
use crate::scenario::Scenario;
use crate::threshold::Threshold;

const MINUTE: Duration = Duration::from_secs(60);

/// Boxed future every suite action returns, so differently shaped closures
/// can share one scenario type.
pub type StepFuture = BoxFuture<'static, HttpMetric>;

/// Bound shorthand for the closures the suite hands to scenarios,
/// blanket-implemented for every closure with the matching signature.
pub trait StepAction: Fn(IterInfo) -> StepFuture + Clone + Send + Sync + 'static {}

impl<T> StepAction for T where T: Fn(IterInfo) -> StepFuture + Clone + Send + Sync + 'static {}

fn step_tags(name: &str, test_type: &str, info: IterInfo) -> Tags {
    Tags::from([
        ("name".to_string(), name.to_string()),
        ("test_type".to_string(), test_type.to_string()),
        ("vu".to_string(), info.vu.to_string()),
        ("iteration".to_string(), info.iteration.to_string()),
    ])
}

fn fault_class(error: &Error) -> &'static str {
    match error {
        Error::Http(source) if source.is_timeout() => "network timeout",
        Error::Http(source) if source.is_connect() => "connection failed",
        _ => "request failed",
    }
}

/// One request against the order endpoint: send, time, check.
///
/// A network fault becomes a status-less failed sample carrying a single
/// failed check named after the fault class, so connection trouble shows up
/// in the error rate and the check summary instead of vanishing.
async fn step(client: &PizzaClient, order: &OrderRequest, tags: Tags) -> HttpMetric {
    let timestamp = SystemTime::now();
    let started = Instant::now();
    match client.order(order).await {
        Ok(view) => HttpMetric {
            sample: Sample {
                timestamp,
                duration: view.duration,
                status: Some(view.status),
                tags,
            },
            checks: order_checks(order).evaluate(&view),
        },
        Err(error) => HttpMetric {
            sample: Sample {
                timestamp,
                duration: started.elapsed(),
                status: None,
                tags,
            },
            checks: vec![CheckResult {
                name: fault_class(&error).to_string(),
                passed: false,
            }],
        },
    }
}

/// Action driving the order endpoint with requests drawn from `mix`.
///
/// Every sample is tagged with the request `name`, the `test_type` and the
/// virtual user and iteration that produced it.
pub fn order_action(
    client: PizzaClient,
    mix: PatternSet<OrderRequest>,
    name: &str,
    test_type: &str,
) -> impl StepAction {
    let mix = Arc::new(mix);
    let name = name.to_string();
    let test_type = test_type.to_string();
    move |info| {
        let client = client.clone();
        let mix = Arc::clone(&mix);
        let name = name.clone();
        let test_type = test_type.clone();
        async move {
            let order = {
                let mut rng = rand::thread_rng();
                mix.select(&mut rng)
            };
            let tags = step_tags(&name, &test_type, info);
            step(&client, &order, tags).await
        }
        .boxed()
    }
}

/// Walks a fixed list of named cases, one case per iteration, wrapping
/// around if the scenario runs longer than the list.
fn case_action(
    client: PizzaClient,
    cases: Vec<(&'static str, OrderRequest)>,
    name: &'static str,
    test_type: &'static str,
) -> impl StepAction {
    let cases = Arc::new(cases);
    move |info| {
        let client = client.clone();
        let cases = Arc::clone(&cases);
        async move {
            let (case, order) = &cases[info.iteration as usize % cases.len()];
            let mut tags = step_tags(name, test_type, info);
            tags.insert("test_case".to_string(), (*case).to_string());
            step(&client, order, tags).await
        }
        .boxed()
    }
}

/// Action for the functional pass: every iteration exercises the next named
/// fixture, tagging samples with its `test_case` name.
pub fn functional_action(client: PizzaClient) -> impl StepAction {
    case_action(
        client,
        functional_cases(),
        "order-pizza-functional",
        "functional",
    )
}

/// Action for the boundary sweep over odd-shaped but well-formed orders.
pub fn boundary_action(client: PizzaClient) -> impl StepAction {
    case_action(client, boundary_cases(), "order-pizza-boundary", "boundary")
}

/// The default traffic mix: 70% randomized valid orders, 15% vegetarian,
/// 10% restricted, 5% deliberately invalid to exercise error handling.
pub fn order_mix() -> PatternSet<OrderRequest> {
    PatternSet::new(vec![
        Pattern::new(70.0, |rng: &mut dyn RngCore| {
            random_order(rng, &OrderBounds::default())
        }),
        Pattern::fixed(15.0, OrderRequest::vegetarian()),
        Pattern::fixed(10.0, OrderRequest::restricted()),
        Pattern::fixed(5.0, OrderRequest::invalid()),
    ])
    .expect("weights in the built-in mixes are valid")
}

/// The heavier performance mix: 60% quick orders, 25% fully randomized,
/// 10% complex exclusion-heavy orders, 5% tight edge-case orders.
pub fn performance_mix() -> PatternSet<OrderRequest> {
    PatternSet::new(vec![
        Pattern::new(60.0, |rng: &mut dyn RngCore| OrderRequest {
            custom_name: format!("Quick Pizza {}", rng.gen_range(1..=1000)),
            excluded_ingredients: vec![],
            excluded_tools: vec![],
            max_calories_per_slice: 300,
            max_number_of_toppings: 3,
            min_number_of_toppings: 1,
            must_be_vegetarian: false,
        }),
        Pattern::new(25.0, |rng: &mut dyn RngCore| {
            random_order(rng, &OrderBounds::default())
        }),
        Pattern::new(10.0, |rng: &mut dyn RngCore| OrderRequest {
            custom_name: format!("Complex Pizza {}", rng.gen_range(1..=1000)),
            excluded_ingredients: vec![
                "Pepperoni".to_string(),
                "Sausage".to_string(),
                "Mushrooms".to_string(),
            ],
            excluded_tools: vec!["Scissors".to_string()],
            max_calories_per_slice: 200,
            max_number_of_toppings: 8,
            min_number_of_toppings: 4,
            must_be_vegetarian: true,
        }),
        Pattern::new(5.0, |rng: &mut dyn RngCore| OrderRequest {
            custom_name: format!("Edge Case Pizza {}", rng.gen_range(1..=1000)),
            excluded_ingredients: vec![
                "Cheese".to_string(),
                "Tomato Sauce".to_string(),
                "Pepperoni".to_string(),
                "Mushrooms".to_string(),
                "Onions".to_string(),
            ],
            excluded_tools: vec!["Knife".to_string(), "Scissors".to_string()],
            max_calories_per_slice: 150,
            max_number_of_toppings: 10,
            min_number_of_toppings: 6,
            must_be_vegetarian: true,
        }),
    ])
    .expect("weights in the built-in mixes are valid")
}

/// Named request fixtures for the functional pass, valid cases first.
pub fn functional_cases() -> Vec<(&'static str, OrderRequest)> {
    vec![
        ("minimum_valid_order", OrderRequest::simple()),
        ("maximum_valid_order", OrderRequest::loaded()),
        ("strict_vegetarian_order", OrderRequest::strict_vegetarian()),
        ("low_calorie_order", OrderRequest::low_calorie()),
        ("multiple_exclusions_order", OrderRequest::allergy_safe()),
        ("empty_name", OrderRequest::empty_name()),
        ("negative_calories", OrderRequest::negative_calories()),
        ("invalid_topping_range", OrderRequest::invalid_topping_range()),
        ("zero_toppings", OrderRequest::zero_toppings()),
    ]
}

/// Odd-shaped orders for the boundary sweep. Every case still has a definite
/// expected outcome, so the usual check sets apply.
pub fn boundary_cases() -> Vec<(&'static str, OrderRequest)> {
    let base = OrderRequest::simple();
    let named = |name: &str| OrderRequest {
        custom_name: name.to_string(),
        ..base.clone()
    };
    vec![
        (
            "zero_calories",
            OrderRequest {
                max_calories_per_slice: 0,
                ..base.clone()
            },
        ),
        (
            "one_calorie",
            OrderRequest {
                max_calories_per_slice: 1,
                ..base.clone()
            },
        ),
        (
            "maximum_calories",
            OrderRequest {
                max_calories_per_slice: i64::from(i32::MAX),
                ..base.clone()
            },
        ),
        (
            "equal_min_max_toppings",
            OrderRequest {
                min_number_of_toppings: 3,
                max_number_of_toppings: 3,
                ..base.clone()
            },
        ),
        (
            "min_above_max_toppings",
            OrderRequest {
                min_number_of_toppings: 5,
                max_number_of_toppings: 2,
                ..base.clone()
            },
        ),
        (
            "negative_min_toppings",
            OrderRequest {
                min_number_of_toppings: -1,
                max_number_of_toppings: 3,
                ..base.clone()
            },
        ),
        ("single_character_name", named("A")),
        ("very_long_name", named(&"A".repeat(300))),
        ("unicode_name", named("Pïzzä wïth üñïcödé")),
        ("emoji_name", named("🍕🧀🍄🥓")),
    ]
}

/// Pacing between orders, one to three seconds like a person clicking
/// through a menu.
pub fn default_think() -> ThinkTime {
    ThinkTime::uniform(Duration::from_secs(1), Duration::from_secs(3))
}

/// Pacing for the performance profiles: users click faster as the traffic
/// profile gets more aggressive. Unknown profiles get [`default_think`].
pub fn think_for(test_type: &str) -> ThinkTime {
    let (min, max) = match test_type {
        "baseline" => (1000, 3000),
        "ramp_up" => (500, 2000),
        "peak" => (500, 1500),
        "stress" => (200, 700),
        "spike" => (100, 400),
        _ => return default_think(),
    };
    ThinkTime::uniform(Duration::from_millis(min), Duration::from_millis(max))
}

fn test_type_tags(test_type: &str) -> Tags {
    Tags::from([("test_type".to_string(), test_type.to_string())])
}

fn threshold(selector: &str, exprs: &[&str]) -> Threshold {
    Threshold::new(selector, exprs).expect("built-in threshold expressions are well formed")
}

/// The default gate: p95 under two seconds, under 10% failed requests, over
/// 95% of checks passing, plus a per-profile p95 ladder.
pub fn default_thresholds() -> Vec<Threshold> {
    vec![
        threshold("http_req_duration", &["p(95)<2000"]),
        threshold("http_req_failed", &["rate<0.1"]),
        threshold("checks", &["rate>0.95"]),
        threshold("http_req_duration{test_type:smoke}", &["p(95)<1000"]),
        threshold("http_req_duration{test_type:load}", &["p(95)<2000"]),
        threshold("http_req_duration{test_type:stress}", &["p(95)<3000"]),
        threshold("http_req_duration{test_type:spike}", &["p(95)<5000"]),
    ]
}

/// Gate for the staged performance session, with per-profile latency and
/// failure-rate ladders that loosen as the load gets heavier.
pub fn performance_thresholds() -> Vec<Threshold> {
    vec![
        threshold("http_req_duration", &["p(95)<3000", "p(99)<5000"]),
        threshold("http_req_failed", &["rate<0.05"]),
        threshold("checks", &["rate>0.95"]),
        threshold("http_req_duration{test_type:baseline}", &["p(95)<1500"]),
        threshold("http_req_duration{test_type:ramp_up}", &["p(95)<2000"]),
        threshold("http_req_duration{test_type:peak}", &["p(95)<2500"]),
        threshold("http_req_duration{test_type:stress}", &["p(95)<4000"]),
        threshold("http_req_duration{test_type:spike}", &["p(95)<6000"]),
        threshold("http_req_failed{test_type:baseline}", &["rate<0.01"]),
        threshold("http_req_failed{test_type:ramp_up}", &["rate<0.02"]),
        threshold("http_req_failed{test_type:peak}", &["rate<0.03"]),
        threshold("http_req_failed{test_type:stress}", &["rate<0.10"]),
        threshold("http_req_failed{test_type:spike}", &["rate<0.15"]),
    ]
}

/// Gate for the functional pass. The 5% failure allowance covers the odd
/// network hiccup; failed checks on the invalid cases would already show up
/// in the check rate.
pub fn functional_thresholds() -> Vec<Threshold> {
    vec![
        threshold("http_req_duration", &["p(95)<3000"]),
        threshold("http_req_failed", &["rate<0.05"]),
        threshold("checks", &["rate>0.95"]),
    ]
}

/// Gate for the boundary sweep, deliberately loose since rejections are the
/// point of half the cases.
pub fn boundary_thresholds() -> Vec<Threshold> {
    vec![
        threshold("http_req_duration", &["p(95)<5000"]),
        threshold("http_req_failed", &["rate<0.20"]),
        threshold("checks", &["rate>0.80"]),
    ]
}

/// One user ordering for a minute. The quick signal that the service is up
/// and sane before anything heavier runs.
pub fn smoke_test(
    client: &PizzaClient,
) -> Scenario<HttpAggregate, ConstantVus, impl StepAction, StepFuture> {
    Scenario::builder()
        .name("smoke_test")
        .action(order_action(
            client.clone(),
            order_mix(),
            "order-pizza",
            "smoke",
        ))
        .executor(
            ConstantVus::builder()
                .vus(1)
                .duration(MINUTE)
                .think(default_think())
                .build(),
        )
        .tags(test_type_tags("smoke"))
        .build()
}

/// Ramp to ten users, hold for five minutes, ramp back down.
pub fn load_test(
    client: &PizzaClient,
) -> Scenario<HttpAggregate, RampingVus, impl StepAction, StepFuture> {
    Scenario::builder()
        .name("load_test")
        .action(order_action(
            client.clone(),
            order_mix(),
            "order-pizza",
            "load",
        ))
        .executor(
            RampingVus::builder()
                .stages(vec![
                    Stage::new(2 * MINUTE, 10),
                    Stage::new(5 * MINUTE, 10),
                    Stage::new(2 * MINUTE, 0),
                ])
                .think(default_think())
                .build(),
        )
        .tags(test_type_tags("load"))
        .build()
}

/// Step up through ten, twenty and thirty users to find where the service
/// starts to strain.
pub fn stress_test(
    client: &PizzaClient,
) -> Scenario<HttpAggregate, RampingVus, impl StepAction, StepFuture> {
    Scenario::builder()
        .name("stress_test")
        .action(order_action(
            client.clone(),
            order_mix(),
            "order-pizza",
            "stress",
        ))
        .executor(
            RampingVus::builder()
                .stages(vec![
                    Stage::new(2 * MINUTE, 10),
                    Stage::new(5 * MINUTE, 20),
                    Stage::new(2 * MINUTE, 30),
                    Stage::new(5 * MINUTE, 30),
                    Stage::new(2 * MINUTE, 0),
                ])
                .think(default_think())
                .build(),
        )
        .tags(test_type_tags("stress"))
        .build()
}

/// Jump from five users to fifty and back, watching how the service absorbs
/// the surge.
pub fn spike_test(
    client: &PizzaClient,
) -> Scenario<HttpAggregate, RampingVus, impl StepAction, StepFuture> {
    Scenario::builder()
        .name("spike_test")
        .action(order_action(
            client.clone(),
            order_mix(),
            "order-pizza",
            "spike",
        ))
        .executor(
            RampingVus::builder()
                .stages(vec![
                    Stage::new(MINUTE, 5),
                    Stage::new(MINUTE, 50),
                    Stage::new(3 * MINUTE, 50),
                    Stage::new(MINUTE, 5),
                    Stage::new(MINUTE, 0),
                ])
                .think(default_think())
                .build(),
        )
        .tags(test_type_tags("spike"))
        .build()
}

/// One pass over every functional case: a single user, one request per case,
/// a second of pacing in between.
pub fn functional_test(
    client: &PizzaClient,
) -> Scenario<HttpAggregate, ConstantVus, impl StepAction, StepFuture> {
    let cases = functional_cases().len() as u64;
    Scenario::builder()
        .name("functional_test")
        .action(functional_action(client.clone()))
        .executor(
            ConstantVus::builder()
                .vus(1)
                .iterations(cases)
                .think(ThinkTime::Fixed(Duration::from_secs(1)))
                .build(),
        )
        .tags(test_type_tags("functional"))
        .build()
}

/// One pass over the boundary cases, same shape as [`functional_test`].
pub fn boundary_test(
    client: &PizzaClient,
) -> Scenario<HttpAggregate, ConstantVus, impl StepAction, StepFuture> {
    let cases = boundary_cases().len() as u64;
    Scenario::builder()
        .name("boundary_test")
        .action(boundary_action(client.clone()))
        .executor(
            ConstantVus::builder()
                .vus(1)
                .iterations(cases)
                .think(ThinkTime::Fixed(Duration::from_secs(1)))
                .build(),
        )
        .tags(test_type_tags("boundary"))
        .build()
}

/// The staged performance session: a long baseline, a ramp, sustained peak
/// load, a stress ramp and a spike, offset so one run plays them in
/// sequence. Pair with [`performance_thresholds`].
pub mod performance {
    use super::*;

    /// Request-name tag shared by every performance scenario.
    pub const REQUEST_NAME: &str = "order-pizza-performance";

    fn action(client: &PizzaClient, test_type: &str) -> impl StepAction {
        order_action(
            client.clone(),
            performance_mix(),
            REQUEST_NAME,
            test_type,
        )
    }

    /// Five users for five minutes, the reference point for everything else.
    pub fn baseline(
        client: &PizzaClient,
    ) -> Scenario<HttpAggregate, ConstantVus, impl StepAction, StepFuture> {
        Scenario::builder()
            .name("baseline")
            .action(action(client, "baseline"))
            .executor(
                ConstantVus::builder()
                    .vus(5)
                    .duration(5 * MINUTE)
                    .think(think_for("baseline"))
                    .build(),
            )
            .tags(test_type_tags("baseline"))
            .build()
    }

    /// Gradual climb from five to twenty-five users and back down.
    pub fn ramp_up(
        client: &PizzaClient,
    ) -> Scenario<HttpAggregate, RampingVus, impl StepAction, StepFuture> {
        Scenario::builder()
            .name("ramp_up")
            .action(action(client, "ramp_up"))
            .executor(
                RampingVus::builder()
                    .stages(vec![
                        Stage::new(2 * MINUTE, 5),
                        Stage::new(5 * MINUTE, 15),
                        Stage::new(5 * MINUTE, 25),
                        Stage::new(5 * MINUTE, 15),
                        Stage::new(2 * MINUTE, 0),
                    ])
                    .think(think_for("ramp_up"))
                    .build(),
            )
            .tags(test_type_tags("ramp_up"))
            .start_offset(5 * MINUTE)
            .build()
    }

    /// Thirty users held for ten minutes.
    pub fn peak(
        client: &PizzaClient,
    ) -> Scenario<HttpAggregate, ConstantVus, impl StepAction, StepFuture> {
        Scenario::builder()
            .name("peak_load")
            .action(action(client, "peak"))
            .executor(
                ConstantVus::builder()
                    .vus(30)
                    .duration(10 * MINUTE)
                    .think(think_for("peak"))
                    .build(),
            )
            .tags(test_type_tags("peak"))
            .start_offset(24 * MINUTE)
            .build()
    }

    /// Push through fifty, a hundred and one hundred fifty users.
    pub fn stress(
        client: &PizzaClient,
    ) -> Scenario<HttpAggregate, RampingVus, impl StepAction, StepFuture> {
        Scenario::builder()
            .name("stress")
            .action(action(client, "stress"))
            .executor(
                RampingVus::builder()
                    .stages(vec![
                        Stage::new(2 * MINUTE, 50),
                        Stage::new(5 * MINUTE, 100),
                        Stage::new(2 * MINUTE, 150),
                        Stage::new(5 * MINUTE, 150),
                        Stage::new(5 * MINUTE, 100),
                        Stage::new(2 * MINUTE, 0),
                    ])
                    .think(think_for("stress"))
                    .build(),
            )
            .tags(test_type_tags("stress"))
            .start_offset(34 * MINUTE)
            .build()
    }

    /// Snap from five to a hundred users in thirty seconds, hold, snap back.
    pub fn spike(
        client: &PizzaClient,
    ) -> Scenario<HttpAggregate, RampingVus, impl StepAction, StepFuture> {
        Scenario::builder()
            .name("spike")
            .action(action(client, "spike"))
            .executor(
                RampingVus::builder()
                    .stages(vec![
                        Stage::new(Duration::from_secs(30), 5),
                        Stage::new(Duration::from_secs(30), 100),
                        Stage::new(2 * MINUTE, 100),
                        Stage::new(Duration::from_secs(30), 5),
                        Stage::new(Duration::from_secs(30), 0),
                    ])
                    .think(think_for("spike"))
                    .build(),
            )
            .tags(test_type_tags("spike"))
            .start_offset(55 * MINUTE)
            .build()
    }
}

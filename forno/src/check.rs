//! Named boolean checks evaluated against a single response.
//!
//! Checks never fail the run on their own. Each one becomes a
//! [`CheckResult`] inside the iteration's metric, and thresholds decide
//! later whether the overall pass rate is acceptable.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use serde_json::Value;

use crate::metric::CheckResult;
use crate::order::{OrderRequest, SLICES_PER_PIZZA};

/// A response in the shape checks want to see it: status, elapsed time, the
/// raw body, and the body parsed as JSON exactly once. `json` is `None` when
/// the body is not valid JSON; predicates treat that as a failed lookup, not
/// an error.
#[derive(Debug, Clone)]
pub struct ResponseView {
    pub status: u16,
    pub duration: Duration,
    pub body: String,
    pub json: Option<Value>,
}

impl ResponseView {
    pub fn new(status: u16, duration: Duration, body: String) -> Self {
        let json = serde_json::from_str(&body).ok();
        Self {
            status,
            duration,
            body,
            json,
        }
    }
}

type Predicate = Box<dyn Fn(&ResponseView) -> bool + Send + Sync>;

struct Check {
    name: String,
    predicate: Predicate,
}

/// An ordered list of named predicates.
///
/// `evaluate` returns one [`CheckResult`] per predicate, in the order they
/// were added. A predicate that panics counts as failed and does not stop
/// the predicates after it from running.
#[derive(Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        mut self,
        name: impl Into<String>,
        predicate: impl Fn(&ResponseView) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.checks.push(Check {
            name: name.into(),
            predicate: Box::new(predicate),
        });
        self
    }

    /// Adds the check only when `condition` holds. Used for checks that only
    /// make sense for certain orders, like vegetarian guarantees.
    pub fn add_if(
        self,
        condition: bool,
        name: impl Into<String>,
        predicate: impl Fn(&ResponseView) -> bool + Send + Sync + 'static,
    ) -> Self {
        if condition { self.add(name, predicate) } else { self }
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn evaluate(&self, view: &ResponseView) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|check| {
                let outcome = catch_unwind(AssertUnwindSafe(|| (check.predicate)(view)));
                let passed = outcome.unwrap_or_else(|payload| {
                    tracing::warn!(
                        check = %check.name,
                        "check panicked: {}",
                        panic_label(payload.as_ref())
                    );
                    false
                });
                CheckResult {
                    name: check.name.clone(),
                    passed,
                }
            })
            .collect()
    }
}

/// Best-effort text from a panic payload.
pub(crate) fn panic_label(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "opaque panic payload"
    }
}

/// The checks for one order, split the way the scripts exercise them: the
/// `response` set always runs, the `body` set only runs when the order was
/// valid and the service answered 200. That keeps structural body checks
/// from flooding the failure table when the server itself errored.
pub struct OrderChecks {
    pub response: CheckSet,
    pub body: Option<CheckSet>,
}

impl OrderChecks {
    pub fn evaluate(&self, view: &ResponseView) -> Vec<CheckResult> {
        let mut results = self.response.evaluate(view);
        if let Some(body) = &self.body {
            if view.status == 200 {
                results.extend(body.evaluate(view));
            }
        }
        results
    }
}

/// Builds the check set matching an order: success checks for valid orders,
/// rejection checks for deliberately broken ones.
pub fn order_checks(order: &OrderRequest) -> OrderChecks {
    if order.is_valid() {
        valid_order_checks(order)
    } else {
        invalid_order_checks()
    }
}

fn valid_order_checks(order: &OrderRequest) -> OrderChecks {
    let response = CheckSet::new()
        .add("status is 200", |r| r.status == 200)
        .add("response time < 2000ms", |r| {
            r.duration < Duration::from_millis(2000)
        })
        .add("response has body", |r| !r.body.is_empty());

    let max_calories = order.max_calories_per_slice as f64;
    let min_toppings = order.min_number_of_toppings;
    let max_toppings = order.max_number_of_toppings;
    let excluded = order.excluded_ingredients.clone();
    let has_exclusions = !excluded.is_empty();

    let body = CheckSet::new()
        .add("response has pizza", |r| pizza(r).is_some())
        .add("response has calories", |r| {
            calories(r).is_some_and(|c| c > 0.0)
        })
        .add("response has vegetarian flag", |r| {
            field(r, "vegetarian").is_some_and(Value::is_boolean)
        })
        .add("pizza has valid ID", |r| {
            pizza(r)
                .and_then(|p| p.get("id"))
                .and_then(Value::as_i64)
                .is_some_and(|id| id > 0)
        })
        .add("pizza has name", |r| {
            pizza(r)
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .is_some_and(|name| !name.is_empty())
        })
        .add("pizza has dough", |r| {
            pizza(r).and_then(|p| p.get("dough")).is_some_and(Value::is_object)
        })
        .add("pizza has ingredients", |r| ingredients(r).is_some())
        .add_if(
            order.must_be_vegetarian,
            "vegetarian order returns vegetarian pizza",
            |r| field(r, "vegetarian").and_then(Value::as_bool) == Some(true),
        )
        .add("calories per slice within limit", move |r| {
            calories(r).is_some_and(|c| c / SLICES_PER_PIZZA <= max_calories)
        })
        .add_if(
            has_exclusions,
            "excluded ingredients not present",
            move |r| {
                ingredients(r).is_some_and(|list| {
                    list.iter()
                        .filter_map(|i| i.get("name").and_then(Value::as_str))
                        .all(|name| !excluded.iter().any(|e| e == name))
                })
            },
        )
        .add("topping count within range", move |r| {
            ingredients(r).is_some_and(|list| {
                let count = list.len() as i64;
                count >= min_toppings && count <= max_toppings
            })
        });

    OrderChecks {
        response,
        body: Some(body),
    }
}

fn invalid_order_checks() -> OrderChecks {
    let response = CheckSet::new()
        .add("returns error status", |r| (400..500).contains(&r.status))
        .add("fast error response", |r| {
            r.duration < Duration::from_millis(1000)
        })
        .add("has error message", |r| !r.body.is_empty());

    OrderChecks {
        response,
        body: None,
    }
}

fn field<'a>(view: &'a ResponseView, key: &str) -> Option<&'a Value> {
    view.json.as_ref()?.get(key)
}

fn pizza(view: &ResponseView) -> Option<&Value> {
    field(view, "pizza").filter(|p| p.is_object())
}

fn calories(view: &ResponseView) -> Option<f64> {
    field(view, "calories")?.as_f64()
}

fn ingredients(view: &ResponseView) -> Option<&Vec<Value>> {
    pizza(view)?.get("ingredients")?.as_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view(status: u16, millis: u64, body: Value) -> ResponseView {
        ResponseView::new(status, Duration::from_millis(millis), body.to_string())
    }

    fn good_order_body() -> Value {
        json!({
            "calories": 1600,
            "vegetarian": true,
            "pizza": {
                "id": 7,
                "name": "Veggie Supreme",
                "dough": {"ID": 1, "name": "Thin", "caloriesPerSlice": 80},
                "tool": "Pizza cutter",
                "ingredients": [
                    {"ID": 4, "name": "Spinach", "caloriesPerSlice": 10, "vegetarian": true},
                    {"ID": 9, "name": "Onions", "caloriesPerSlice": 15, "vegetarian": true},
                    {"ID": 11, "name": "Feta Cheese", "caloriesPerSlice": 60, "vegetarian": true}
                ]
            }
        })
    }

    #[test]
    fn json_is_parsed_once_and_memoized() {
        let parsed = ResponseView::new(200, Duration::ZERO, r#"{"a":1}"#.to_string());
        assert!(parsed.json.is_some());

        let garbage = ResponseView::new(200, Duration::ZERO, "not json".to_string());
        assert!(garbage.json.is_none());
        assert_eq!(garbage.body, "not json");
    }

    #[test]
    fn evaluate_preserves_declaration_order() {
        let set = CheckSet::new()
            .add("first", |_| true)
            .add("second", |_| false)
            .add("third", |_| true);
        let results = set.evaluate(&view(200, 1, json!({})));
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(
            results.iter().map(|r| r.passed).collect::<Vec<_>>(),
            vec![true, false, true]
        );
    }

    #[test]
    fn panicking_check_fails_without_stopping_the_rest() {
        let set = CheckSet::new()
            .add("before", |_| true)
            .add("boom", |_| panic!("predicate exploded"))
            .add("after", |_| true);
        let results = set.evaluate(&view(200, 1, json!({})));
        assert_eq!(results.len(), 3);
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert!(results[2].passed);
    }

    #[test]
    fn valid_order_on_good_response_passes_everything() {
        let order = OrderRequest::vegetarian();
        let checks = order_checks(&order);
        let results = checks.evaluate(&view(200, 120, good_order_body()));

        // 3 response checks + 7 structural + vegetarian + calorie limit
        // + exclusions + topping range.
        assert_eq!(results.len(), 14);
        for result in &results {
            assert!(result.passed, "check {:?} failed", result.name);
        }
    }

    #[test]
    fn plain_valid_order_skips_conditional_checks() {
        let order = OrderRequest::valid();
        let checks = order_checks(&order);
        let results = checks.evaluate(&view(200, 120, good_order_body()));

        assert_eq!(results.len(), 12);
        assert!(!results.iter().any(|r| r.name.contains("vegetarian order")));
        assert!(!results.iter().any(|r| r.name.contains("excluded")));
    }

    #[test]
    fn server_error_on_valid_order_skips_body_checks() {
        let order = OrderRequest::valid();
        let checks = order_checks(&order);
        let results = checks.evaluate(&view(500, 80, json!({"error": "oven on fire"})));

        assert_eq!(results.len(), 3);
        assert!(!results[0].passed); // status is 200
        assert!(results[2].passed); // response has body
    }

    #[test]
    fn invalid_order_gets_the_rejection_checks() {
        let order = OrderRequest::invalid();
        let checks = order_checks(&order);
        let results = checks.evaluate(&view(400, 30, json!({"error": "name required"})));

        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["returns error status", "fast error response", "has error message"]
        );
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn rejection_checks_fail_when_the_server_accepts_garbage() {
        let order = OrderRequest::invalid();
        let checks = order_checks(&order);
        let results = checks.evaluate(&view(200, 30, good_order_body()));
        assert!(!results[0].passed);
    }

    #[test]
    fn calorie_limit_uses_per_slice_math() {
        let mut order = OrderRequest::valid();
        order.max_calories_per_slice = 200;
        let body = good_order_body(); // 1600 total, 200 per slice

        let results = order_checks(&order).evaluate(&view(200, 10, body.clone()));
        let limit = results
            .iter()
            .find(|r| r.name == "calories per slice within limit")
            .unwrap();
        assert!(limit.passed);

        order.max_calories_per_slice = 199;
        let results = order_checks(&order).evaluate(&view(200, 10, body));
        let limit = results
            .iter()
            .find(|r| r.name == "calories per slice within limit")
            .unwrap();
        assert!(!limit.passed);
    }

    #[test]
    fn excluded_ingredient_in_the_pizza_fails_the_check() {
        let mut order = OrderRequest::restricted();
        order.excluded_ingredients = vec!["Feta Cheese".to_string()];
        let results = order_checks(&order).evaluate(&view(200, 10, good_order_body()));
        let excluded = results
            .iter()
            .find(|r| r.name == "excluded ingredients not present")
            .unwrap();
        assert!(!excluded.passed);
    }

    #[test]
    fn topping_count_outside_the_range_fails() {
        let mut order = OrderRequest::valid();
        order.min_number_of_toppings = 4; // body has 3 ingredients
        order.max_number_of_toppings = 6;
        let results = order_checks(&order).evaluate(&view(200, 10, good_order_body()));
        let toppings = results
            .iter()
            .find(|r| r.name == "topping count within range")
            .unwrap();
        assert!(!toppings.passed);
    }

    #[test]
    fn missing_json_body_fails_structural_checks_gracefully() {
        let order = OrderRequest::valid();
        let results = order_checks(&order).evaluate(&ResponseView::new(
            200,
            Duration::from_millis(10),
            "plain text".to_string(),
        ));
        let pizza_check = results.iter().find(|r| r.name == "response has pizza").unwrap();
        assert!(!pizza_check.passed);
        let body_check = results.iter().find(|r| r.name == "response has body").unwrap();
        assert!(body_check.passed);
    }
}

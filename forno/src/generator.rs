//! Weighted traffic generation.
//!
//! A [`PatternSet`] holds producers with relative weights. Each iteration
//! draws one producer, so a mix like 70/15/10/5 shapes traffic without any
//! coordination between virtual users.

use std::ops::RangeInclusive;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::error::{Error, Result};
use crate::order::{INGREDIENTS, OrderRequest, TOOLS};

type Producer<T> = Box<dyn Fn(&mut dyn RngCore) -> T + Send + Sync>;

/// One weighted way of producing a request payload.
pub struct Pattern<T> {
    weight: f64,
    produce: Producer<T>,
}

impl<T> Pattern<T> {
    pub fn new(
        weight: f64,
        produce: impl Fn(&mut dyn RngCore) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            weight,
            produce: Box::new(produce),
        }
    }

    /// Pattern that always yields a clone of the given value.
    pub fn fixed(weight: f64, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::new(weight, move |_| value.clone())
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// A validated set of weighted patterns.
///
/// Selection walks the cumulative weight table: the first bound at or above
/// the draw wins, so a draw landing exactly on a boundary belongs to the
/// pattern ending there. If float accumulation ever leaves the draw past the
/// final bound, selection falls back to the first pattern instead of failing
/// mid-run.
pub struct PatternSet<T> {
    patterns: Vec<Pattern<T>>,
    cumulative: Vec<f64>,
    total: f64,
}

impl<T> PatternSet<T> {
    /// Weights do not need to sum to anything in particular, but every weight
    /// must be finite and positive, and the set must not be empty.
    pub fn new(patterns: Vec<Pattern<T>>) -> Result<Self> {
        if patterns.is_empty() {
            return Err(Error::EmptyPatternSet);
        }
        for (index, pattern) in patterns.iter().enumerate() {
            if !pattern.weight.is_finite() || pattern.weight <= 0.0 {
                return Err(Error::InvalidWeight {
                    index,
                    weight: pattern.weight,
                });
            }
        }

        let mut cumulative = Vec::with_capacity(patterns.len());
        let mut total = 0.0;
        for pattern in &patterns {
            total += pattern.weight;
            cumulative.push(total);
        }

        Ok(Self {
            patterns,
            cumulative,
            total,
        })
    }

    pub fn select(&self, rng: &mut dyn RngCore) -> T {
        let draw = rng.gen_range(0.0..self.total);
        let index = pick_index(&self.cumulative, draw).unwrap_or(0);
        (self.patterns[index].produce)(rng)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn pick_index(cumulative: &[f64], draw: f64) -> Option<usize> {
    cumulative.iter().position(|&bound| draw <= bound)
}

/// Limits for randomly generated orders.
#[derive(Debug, Clone)]
pub struct OrderBounds {
    pub calories: RangeInclusive<i64>,
    pub max_toppings: RangeInclusive<i64>,
    pub max_exclusions: usize,
}

impl Default for OrderBounds {
    fn default() -> Self {
        Self {
            calories: 200..=500,
            max_toppings: 1..=5,
            max_exclusions: 3,
        }
    }
}

/// Builds a valid order with randomized fields: a numbered custom name, up to
/// `max_exclusions` distinct excluded ingredients, one excluded tool, and
/// topping bounds drawn so the minimum never exceeds the maximum.
pub fn random_order(rng: &mut dyn RngCore, bounds: &OrderBounds) -> OrderRequest {
    let excluded_count = rng.gen_range(0..=bounds.max_exclusions);
    let excluded_ingredients = INGREDIENTS
        .choose_multiple(rng, excluded_count)
        .map(|name| (*name).to_string())
        .collect();
    let excluded_tools = vec![TOOLS[rng.gen_range(0..TOOLS.len())].to_string()];
    let max_number_of_toppings = rng.gen_range(bounds.max_toppings.clone());
    let min_number_of_toppings = rng.gen_range(0..=max_number_of_toppings);

    OrderRequest {
        custom_name: format!("Custom Pizza {}", rng.gen_range(1..=1000)),
        excluded_ingredients,
        excluded_tools,
        max_calories_per_slice: rng.gen_range(bounds.calories.clone()),
        max_number_of_toppings,
        min_number_of_toppings,
        must_be_vegetarian: rng.gen_bool(0.5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn pick_index_walks_the_cumulative_table() {
        let bounds = [60.0, 85.0, 95.0, 100.0];
        assert_eq!(pick_index(&bounds, 0.0), Some(0));
        assert_eq!(pick_index(&bounds, 59.9), Some(0));
        assert_eq!(pick_index(&bounds, 60.0), Some(0));
        assert_eq!(pick_index(&bounds, 60.1), Some(1));
        assert_eq!(pick_index(&bounds, 94.9), Some(2));
        assert_eq!(pick_index(&bounds, 100.0), Some(3));
        assert_eq!(pick_index(&bounds, 100.1), None);
    }

    #[test]
    fn empty_set_is_rejected() {
        let result = PatternSet::<u32>::new(vec![]);
        assert!(matches!(result, Err(Error::EmptyPatternSet)));
    }

    #[test]
    fn non_positive_and_non_finite_weights_are_rejected() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = PatternSet::new(vec![
                Pattern::fixed(1.0, 1u32),
                Pattern::fixed(bad, 2u32),
            ]);
            match result {
                Err(Error::InvalidWeight { index, .. }) => assert_eq!(index, 1),
                Err(other) => panic!("unexpected error {other:?}"),
                Ok(_) => panic!("weight {bad} should have been rejected"),
            }
        }
    }

    #[test]
    fn selection_follows_the_weights() {
        let set = PatternSet::new(vec![
            Pattern::fixed(70.0, 0usize),
            Pattern::fixed(15.0, 1usize),
            Pattern::fixed(10.0, 2usize),
            Pattern::fixed(5.0, 3usize),
        ])
        .unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0u32; 4];
        let draws = 20_000;
        for _ in 0..draws {
            counts[set.select(&mut rng)] += 1;
        }

        let share = |n: u32| f64::from(n) / f64::from(draws);
        assert!((share(counts[0]) - 0.70).abs() < 0.02, "{counts:?}");
        assert!((share(counts[1]) - 0.15).abs() < 0.02, "{counts:?}");
        assert!((share(counts[2]) - 0.10).abs() < 0.02, "{counts:?}");
        assert!((share(counts[3]) - 0.05).abs() < 0.02, "{counts:?}");
    }

    #[test]
    fn selection_is_deterministic_for_a_seed() {
        let set = PatternSet::new(vec![
            Pattern::fixed(1.0, 'a'),
            Pattern::fixed(1.0, 'b'),
            Pattern::fixed(1.0, 'c'),
        ])
        .unwrap();

        let mut one = StdRng::seed_from_u64(7);
        let mut two = StdRng::seed_from_u64(7);
        let first: Vec<char> = (0..100).map(|_| set.select(&mut one)).collect();
        let second: Vec<char> = (0..100).map(|_| set.select(&mut two)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn producers_can_use_the_rng() {
        let set = PatternSet::new(vec![Pattern::new(1.0, |rng| rng.gen_range(10..20))]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let value: i32 = set.select(&mut rng);
            assert!((10..20).contains(&value));
        }
    }

    #[test]
    fn random_orders_always_satisfy_the_bounds() {
        let bounds = OrderBounds::default();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let order = random_order(&mut rng, &bounds);

            assert!(order.is_valid(), "order from seed {seed} should be valid");
            assert!(order.custom_name.starts_with("Custom Pizza "));
            assert!(bounds.calories.contains(&order.max_calories_per_slice));
            assert!(bounds.max_toppings.contains(&order.max_number_of_toppings));
            assert!(order.min_number_of_toppings >= 0);
            assert!(order.min_number_of_toppings <= order.max_number_of_toppings);
            assert!(order.excluded_ingredients.len() <= bounds.max_exclusions);
            for name in &order.excluded_ingredients {
                assert!(INGREDIENTS.contains(&name.as_str()));
            }
            assert_eq!(order.excluded_tools.len(), 1);
            assert!(TOOLS.contains(&order.excluded_tools[0].as_str()));
        }
    }

    #[test]
    fn random_orders_exclude_distinct_ingredients() {
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let order = random_order(&mut rng, &OrderBounds::default());
            let mut names = order.excluded_ingredients.clone();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), order.excluded_ingredients.len());
        }
    }

    #[test]
    fn random_orders_cover_both_vegetarian_flags() {
        let mut saw_vegetarian = false;
        let mut saw_meat = false;
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            if random_order(&mut rng, &OrderBounds::default()).must_be_vegetarian {
                saw_vegetarian = true;
            } else {
                saw_meat = true;
            }
        }
        assert!(saw_vegetarian && saw_meat);
    }
}

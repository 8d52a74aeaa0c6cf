//! Wire types for the QuickPizza ordering API, plus the fixture orders the
//! preset suites send.
//!
//! Field names follow the service's JSON contract: camelCase everywhere,
//! except `Ingredient`/`Dough` which use an uppercase `ID`.

use serde::{Deserialize, Serialize};

/// Ingredients the service knows about. Exclusion lists are drawn from here.
pub const INGREDIENTS: [&str; 16] = [
    "Tomato Sauce",
    "Cheese",
    "Pepperoni",
    "Mushrooms",
    "Onions",
    "Sausage",
    "Bacon",
    "Black Olives",
    "Green Peppers",
    "Pineapple",
    "Spinach",
    "Feta Cheese",
    "Anchovies",
    "Italian Sausage",
    "Ham",
    "Bell Peppers",
];

/// Cutting tools the kitchen can be told to avoid.
pub const TOOLS: [&str; 3] = ["Knife", "Pizza cutter", "Scissors"];

/// Reported calories are for the whole pizza; per-slice limits divide by this.
pub const SLICES_PER_PIZZA: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub custom_name: String,
    pub excluded_ingredients: Vec<String>,
    pub excluded_tools: Vec<String>,
    pub max_calories_per_slice: i64,
    pub max_number_of_toppings: i64,
    pub min_number_of_toppings: i64,
    pub must_be_vegetarian: bool,
}

impl OrderRequest {
    /// Client-side mirror of the API's validation rules. Orders failing this
    /// are expected to come back 4xx, and get the error check set instead of
    /// the success one.
    pub fn is_valid(&self) -> bool {
        !self.custom_name.is_empty()
            && self.max_calories_per_slice > 0
            && self.max_number_of_toppings >= 1
            && self.min_number_of_toppings >= 0
            && self.min_number_of_toppings <= self.max_number_of_toppings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    pub calories_per_slice: f64,
    pub vegetarian: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dough {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    pub calories_per_slice: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pizza {
    pub id: i64,
    pub name: String,
    pub dough: Dough,
    pub tool: String,
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub calories: f64,
    pub pizza: Pizza,
    pub vegetarian: bool,
}

/// Fixture orders. The first four drive the default traffic mix; the rest
/// back the one-shot functional pass and the heavier performance mixes.
impl OrderRequest {
    /// Plain valid order with roomy limits.
    pub fn valid() -> Self {
        Self {
            custom_name: "Delicious Margherita".to_string(),
            excluded_ingredients: vec![],
            excluded_tools: vec![],
            max_calories_per_slice: 1000,
            max_number_of_toppings: 5,
            min_number_of_toppings: 2,
            must_be_vegetarian: false,
        }
    }

    /// Vegetarian order that also excludes the meats outright.
    pub fn vegetarian() -> Self {
        Self {
            custom_name: "Veggie Supreme".to_string(),
            excluded_ingredients: vec![
                "Pepperoni".to_string(),
                "Sausage".to_string(),
                "Bacon".to_string(),
                "Ham".to_string(),
            ],
            excluded_tools: vec![],
            max_calories_per_slice: 800,
            max_number_of_toppings: 6,
            min_number_of_toppings: 3,
            must_be_vegetarian: true,
        }
    }

    /// Order with ingredient and tool exclusions, as an allergy case would send.
    pub fn restricted() -> Self {
        Self {
            custom_name: "Allergy-Friendly Pizza".to_string(),
            excluded_ingredients: vec![
                "Cheese".to_string(),
                "Feta Cheese".to_string(),
                "Mushrooms".to_string(),
            ],
            excluded_tools: vec!["Knife".to_string()],
            max_calories_per_slice: 600,
            max_number_of_toppings: 3,
            min_number_of_toppings: 1,
            must_be_vegetarian: false,
        }
    }

    /// Breaks every rule at once: empty name, negative calories, min above max.
    pub fn invalid() -> Self {
        Self {
            custom_name: String::new(),
            excluded_ingredients: vec![],
            excluded_tools: vec![],
            max_calories_per_slice: -1,
            max_number_of_toppings: 0,
            min_number_of_toppings: 5,
            must_be_vegetarian: false,
        }
    }

    /// Smallest order that still passes validation.
    pub fn simple() -> Self {
        Self {
            custom_name: "Simple Pizza".to_string(),
            excluded_ingredients: vec![],
            excluded_tools: vec![],
            max_calories_per_slice: 300,
            max_number_of_toppings: 1,
            min_number_of_toppings: 1,
            must_be_vegetarian: false,
        }
    }

    /// Every limit pushed high while staying valid.
    pub fn loaded() -> Self {
        Self {
            custom_name: "Supreme Loaded Pizza".to_string(),
            excluded_ingredients: vec!["Anchovies".to_string()],
            excluded_tools: vec![],
            max_calories_per_slice: 2000,
            max_number_of_toppings: 10,
            min_number_of_toppings: 8,
            must_be_vegetarian: false,
        }
    }

    /// Vegetarian with a belt-and-braces meat exclusion list.
    pub fn strict_vegetarian() -> Self {
        Self {
            custom_name: "Garden Harvest".to_string(),
            excluded_ingredients: vec![
                "Pepperoni".to_string(),
                "Sausage".to_string(),
                "Italian Sausage".to_string(),
                "Bacon".to_string(),
                "Ham".to_string(),
                "Anchovies".to_string(),
            ],
            excluded_tools: vec![],
            max_calories_per_slice: 500,
            max_number_of_toppings: 5,
            min_number_of_toppings: 2,
            must_be_vegetarian: true,
        }
    }

    /// Tight calorie budget, few toppings.
    pub fn low_calorie() -> Self {
        Self {
            custom_name: "Light Bite".to_string(),
            excluded_ingredients: vec!["Cheese".to_string()],
            excluded_tools: vec![],
            max_calories_per_slice: 150,
            max_number_of_toppings: 2,
            min_number_of_toppings: 1,
            must_be_vegetarian: false,
        }
    }

    /// Long exclusion list across both ingredients and tools.
    pub fn allergy_safe() -> Self {
        Self {
            custom_name: "Allergy-Safe Pizza".to_string(),
            excluded_ingredients: vec![
                "Cheese".to_string(),
                "Feta Cheese".to_string(),
                "Mushrooms".to_string(),
                "Pineapple".to_string(),
                "Anchovies".to_string(),
            ],
            excluded_tools: vec!["Knife".to_string(), "Scissors".to_string()],
            max_calories_per_slice: 600,
            max_number_of_toppings: 4,
            min_number_of_toppings: 1,
            must_be_vegetarian: false,
        }
    }

    /// Valid except for the missing name.
    pub fn empty_name() -> Self {
        Self {
            custom_name: String::new(),
            ..Self::valid()
        }
    }

    /// Valid except for a negative calorie ceiling.
    pub fn negative_calories() -> Self {
        Self {
            custom_name: "Invalid Pizza".to_string(),
            max_calories_per_slice: -100,
            ..Self::valid()
        }
    }

    /// Valid except the topping bounds are inverted.
    pub fn invalid_topping_range() -> Self {
        Self {
            custom_name: "Backwards Pizza".to_string(),
            max_number_of_toppings: 2,
            min_number_of_toppings: 10,
            ..Self::valid()
        }
    }

    /// Valid except it asks for a pizza with no toppings at all.
    pub fn zero_toppings() -> Self {
        Self {
            custom_name: "Empty Pizza".to_string(),
            max_number_of_toppings: 0,
            min_number_of_toppings: 0,
            ..Self::valid()
        }
    }
}

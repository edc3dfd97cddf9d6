//! Static per-model price table and cost estimation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Decimal places kept in cost figures.
const COST_SCALE: f64 = 1_000_000.0;

/// Price of one model, in USD per 1000 tokens.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPrice {
    /// Price per 1000 prompt tokens.
    pub input_per_1k: f64,
    /// Price per 1000 completion tokens.
    pub output_per_1k: f64,
}

impl ModelPrice {
    /// Creates a price pair.
    #[must_use]
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Cost of a call with the given token counts, rounded to six decimals.
    #[must_use]
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let input = f64::from(prompt_tokens) / 1000.0 * self.input_per_1k;
        let output = f64::from(completion_tokens) / 1000.0 * self.output_per_1k;
        round_usd(input + output)
    }
}

/// Model id to price lookup. Loaded once at startup and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
}

impl PriceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the price for `model_id`.
    #[must_use]
    pub fn with_price(mut self, model_id: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(model_id.into(), price);
        self
    }

    /// Returns the price registered for `model_id`.
    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<&ModelPrice> {
        self.prices.get(model_id)
    }

    /// Number of priced models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Returns `true` when no model is priced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Estimated cost in USD, or `None` for a model without a price.
    #[must_use]
    pub fn estimate_cost(
        &self,
        model_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Option<f64> {
        self.get(model_id)
            .map(|price| price.cost(prompt_tokens, completion_tokens))
    }
}

impl<K: Into<String>> FromIterator<(K, ModelPrice)> for PriceTable {
    fn from_iter<T: IntoIterator<Item = (K, ModelPrice)>>(iter: T) -> Self {
        Self {
            prices: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Rounds a USD amount to six decimal places.
#[must_use]
pub fn round_usd(amount: f64) -> f64 {
    (amount * COST_SCALE).round() / COST_SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PriceTable {
        PriceTable::new().with_price("model-x", ModelPrice::new(0.005, 0.015))
    }

    #[test]
    fn known_model_is_priced_exactly() {
        assert_eq!(table().estimate_cost("model-x", 1000, 1000), Some(0.02));
        assert_eq!(table().estimate_cost("model-x", 0, 0), Some(0.0));
    }

    #[test]
    fn unknown_model_has_no_cost() {
        assert_eq!(table().estimate_cost("unknown-model", 100, 50), None);
    }

    #[test]
    fn cost_is_rounded_to_six_decimals() {
        let table = PriceTable::new().with_price("tiny", ModelPrice::new(0.000_15, 0.000_6));
        // 7 * 0.00015 / 1000 + 3 * 0.0006 / 1000 = 0.00000285
        assert_eq!(table.estimate_cost("tiny", 7, 3), Some(0.000_003));
    }

    #[test]
    fn deserializes_camel_case_map() {
        let json = r#"{ "gpt-4o-mini": { "inputPer1k": 0.00015, "outputPer1k": 0.0006 } }"#;
        let table: PriceTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("gpt-4o-mini"),
            Some(&ModelPrice::new(0.000_15, 0.000_6))
        );
    }
}

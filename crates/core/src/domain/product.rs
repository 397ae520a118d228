use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    /// Unit price in the catalog currency (COP).
    pub price: Decimal,
    pub brand: String,
    /// Canonical category as resolved by the catalog synonym table.
    pub category: String,
    pub features: String,
}

impl Product {
    pub fn matches_brand(&self, brand: &str) -> bool {
        let needle = brand.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.brand.to_lowercase().contains(&needle) || self.title.to_lowercase().contains(&needle)
    }
}

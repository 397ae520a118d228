//! Product catalog: loading, category resolution, and the filter-and-sort search.

pub mod loader;
pub mod synonyms;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::product::Product;

pub use loader::{CacheInfo, CsvCatalog};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file `{0}` does not exist")]
    MissingFile(PathBuf),
    #[error("could not read catalog `{path}`: {source}")]
    Read { path: PathBuf, source: csv::Error },
    #[error("catalog cache lock is poisoned")]
    CachePoisoned,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub category: String,
    /// Inclusive price ceiling.
    pub price_max: Option<Decimal>,
    /// Case-insensitive substring matched against brand and title.
    pub brand: Option<String>,
}

impl CatalogQuery {
    pub fn new(category: impl Into<String>) -> Self {
        Self { category: category.into(), price_max: None, brand: None }
    }

    pub fn with_price_max(mut self, price_max: Option<Decimal>) -> Self {
        self.price_max = price_max;
        self
    }

    pub fn with_brand(mut self, brand: Option<String>) -> Self {
        self.brand = brand.filter(|value| !value.trim().is_empty());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub query: CatalogQuery,
    /// Ascending by price; ties keep catalog order.
    pub products: Vec<Product>,
    /// True when the brand filter matched nothing and was dropped.
    pub brand_widened: bool,
    /// Brands present in a widened result, for suggesting alternatives.
    pub available_brands: Vec<String>,
}

impl SearchResult {
    pub fn empty(query: CatalogQuery) -> Self {
        Self { query, products: Vec::new(), brand_widened: false, available_brands: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Source of products for the sales agent.
///
/// `search` and `resolve_category` have default implementations on top of
/// `load_products`; a failed load is reported as an empty result so callers
/// only ever see "no matches".
pub trait CatalogProvider: Send + Sync {
    fn load_products(&self) -> Result<Arc<[Product]>, CatalogError>;

    fn search(&self, query: &CatalogQuery) -> SearchResult {
        match self.load_products() {
            Ok(products) => search_products(&products, query),
            Err(error) => {
                warn!(
                    event_name = "catalog.search.unavailable",
                    category = %query.category,
                    error = %error,
                    "catalog unavailable; returning empty result"
                );
                SearchResult::empty(query.clone())
            }
        }
    }

    /// Resolves a category mention through the synonym table, then against
    /// the categories actually present in the catalog.
    fn resolve_category(&self, term: &str) -> Option<String> {
        if let Some(canonical) = synonyms::resolve_category(term) {
            return Some(canonical.to_string());
        }

        let normalized = synonyms::normalize_term(term);
        if normalized.is_empty() || normalized == synonyms::UNCATEGORIZED {
            return None;
        }
        let products = self.load_products().ok()?;
        products
            .iter()
            .find(|product| synonyms::normalize_term(&product.category) == normalized)
            .map(|product| product.category.clone())
    }
}

/// In-memory catalog over a fixed product list.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    products: Arc<[Product]>,
}

impl StaticCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products: products.into() }
    }
}

impl CatalogProvider for StaticCatalog {
    fn load_products(&self) -> Result<Arc<[Product]>, CatalogError> {
        Ok(Arc::clone(&self.products))
    }
}

pub fn search_products(products: &[Product], query: &CatalogQuery) -> SearchResult {
    let canonical = synonyms::resolve_category(&query.category)
        .map(str::to_string)
        .unwrap_or_else(|| synonyms::normalize_term(&query.category));
    if canonical.is_empty() {
        return SearchResult::empty(query.clone());
    }
    let title_synonyms = synonyms::synonyms_for(&canonical);
    let canonical = synonyms::normalize_term(&canonical);

    let mut in_budget = products
        .iter()
        .filter(|product| {
            synonyms::normalize_term(&product.category) == canonical || {
                let title = synonyms::normalize_term(&product.title);
                title_synonyms.iter().any(|synonym| synonyms::contains_phrase(&title, synonym))
            }
        })
        .filter(|product| query.price_max.map_or(true, |ceiling| product.price <= ceiling))
        .cloned()
        .collect::<Vec<_>>();
    in_budget.sort_by(|left, right| left.price.cmp(&right.price));

    let Some(brand) = query.brand.as_deref().filter(|brand| !brand.trim().is_empty()) else {
        return SearchResult {
            query: query.clone(),
            products: in_budget,
            brand_widened: false,
            available_brands: Vec::new(),
        };
    };

    let branded =
        in_budget.iter().filter(|product| product.matches_brand(brand)).cloned().collect::<Vec<_>>();
    if !branded.is_empty() {
        return SearchResult {
            query: query.clone(),
            products: branded,
            brand_widened: false,
            available_brands: Vec::new(),
        };
    }

    let available_brands = in_budget
        .iter()
        .map(|product| product.brand.trim().to_string())
        .filter(|brand| !brand.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    SearchResult {
        query: query.clone(),
        brand_widened: !in_budget.is_empty(),
        products: in_budget,
        available_brands,
    }
}

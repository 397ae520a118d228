use rust_decimal::Decimal;
use serde::Serialize;
use vendedor_agent::guardrails::parse_money_phrase;
use vendedor_core::catalog::{search_products, CatalogProvider, CatalogQuery, CsvCatalog};
use vendedor_core::config::LoadOptions;
use vendedor_core::domain::money::format_cop;

use crate::commands::{load_config, CommandResult, EXIT_CATALOG, EXIT_INPUT};

#[derive(Debug, Serialize)]
struct SearchReport {
    command: &'static str,
    status: &'static str,
    query: CatalogQuery,
    budget_assumed: bool,
    brand_widened: bool,
    available_brands: Vec<String>,
    count: usize,
    products: Vec<ProductRow>,
}

#[derive(Debug, Serialize)]
struct ProductRow {
    id: String,
    title: String,
    brand: String,
    category: String,
    price: Decimal,
    price_display: String,
}

/// Runs the same filter-and-sort search the assistant uses, without the model.
///
/// Without `--max-price` the configured default budget for the category applies.
pub fn run(
    options: LoadOptions,
    category: &str,
    max_price: Option<&str>,
    brand: Option<String>,
) -> CommandResult {
    let config = match load_config("search", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let price_max = match max_price.map(parse_money_phrase) {
        None => None,
        Some(Some(amount)) => Some(amount),
        Some(None) => {
            return CommandResult::failure(
                "search",
                "invalid_price",
                format!("could not read `{}` as a price", max_price.unwrap_or_default()),
                EXIT_INPUT,
            );
        }
    };

    let catalog = CsvCatalog::new(&config.catalog.path, config.catalog.cache_ttl());
    let products = match catalog.load_products() {
        Ok(products) => products,
        Err(error) => {
            return CommandResult::failure(
                "search",
                "catalog_unavailable",
                error.to_string(),
                EXIT_CATALOG,
            );
        }
    };

    let Some(canonical) = catalog.resolve_category(category) else {
        return CommandResult::failure(
            "search",
            "unknown_category",
            format!("`{category}` does not match any catalog category"),
            EXIT_INPUT,
        );
    };

    let budget_assumed = price_max.is_none();
    let ceiling = price_max.unwrap_or_else(|| config.catalog.default_budget_for(&canonical));
    let query = CatalogQuery::new(canonical).with_price_max(Some(ceiling)).with_brand(brand);
    let result = search_products(&products, &query);

    let rows = result
        .products
        .iter()
        .map(|product| ProductRow {
            id: product.id.0.clone(),
            title: product.title.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            price: product.price,
            price_display: format_cop(product.price),
        })
        .collect::<Vec<_>>();

    let report = SearchReport {
        command: "search",
        status: "ok",
        query: result.query,
        budget_assumed,
        brand_widened: result.brand_widened,
        available_brands: result.available_brands,
        count: rows.len(),
        products: rows,
    };

    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("search", "serialization", error.to_string(), 1),
    }
}

pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;

pub use catalog::{
    search_products, CacheInfo, CatalogError, CatalogProvider, CatalogQuery, CsvCatalog,
    SearchResult, StaticCatalog,
};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::money::{format_cop, parse_amount};
pub use domain::product::{Product, ProductId};
pub use domain::slots::{SlotKey, SlotValue};
pub use errors::{ApplicationError, DomainError};

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{synonyms, CatalogError, CatalogProvider};
use crate::domain::money::parse_amount;
use crate::domain::product::{Product, ProductId};

#[derive(Debug, Deserialize)]
struct RawProductRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "Title", alias = "nombre")]
    title: Option<String>,
    #[serde(default, alias = "price", alias = "precio")]
    sale_price: Option<String>,
    #[serde(default, alias = "Brand", alias = "marca")]
    brand: Option<String>,
    #[serde(default, alias = "categoria", alias = "category")]
    product_type: Option<String>,
    #[serde(default, rename = "Key_features", alias = "key_features", alias = "features")]
    key_features: Option<String>,
}

impl RawProductRow {
    fn into_product(self, row_number: usize) -> Option<Product> {
        let title = non_empty(self.title)?;
        let product_type = non_empty(self.product_type)?;
        let price = self.sale_price.as_deref().and_then(parse_amount)?;
        if price <= rust_decimal::Decimal::ZERO {
            return None;
        }

        let category = synonyms::categorize(&product_type, &title).to_string();
        let id = non_empty(self.id).unwrap_or_else(|| format!("row-{row_number}"));

        Some(Product {
            id: ProductId(id),
            title,
            price,
            brand: non_empty(self.brand).unwrap_or_default(),
            category,
            features: non_empty(self.key_features).unwrap_or_default(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Reads every valid product from a header-row CSV file.
///
/// Rows that fail to deserialize, lack a title or product type, or carry a
/// non-positive price are skipped and counted.
pub fn load_products_from_csv(path: &Path) -> Result<Vec<Product>, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::MissingFile(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;

    let mut products = Vec::new();
    let mut skipped = 0usize;
    for (index, row) in reader.deserialize::<RawProductRow>().enumerate() {
        let row_number = index + 1;
        match row {
            Ok(raw) => match raw.into_product(row_number) {
                Some(product) => products.push(product),
                None => skipped += 1,
            },
            Err(error) => {
                debug!(
                    event_name = "catalog.load.row_rejected",
                    row = row_number,
                    error = %error,
                    "skipping unreadable catalog row"
                );
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(
            event_name = "catalog.load.rows_skipped",
            path = %path.display(),
            skipped,
            "catalog rows skipped during load"
        );
    }
    info!(
        event_name = "catalog.load.completed",
        path = %path.display(),
        products = products.len(),
        "catalog loaded"
    );

    Ok(products)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub cached: bool,
    pub product_count: usize,
    pub age_secs: Option<u64>,
    pub ttl_secs: u64,
}

#[derive(Debug)]
struct CachedProducts {
    loaded_at: Instant,
    products: Arc<[Product]>,
}

/// CSV-backed catalog that keeps the parsed product list for `ttl`.
#[derive(Debug)]
pub struct CsvCatalog {
    path: PathBuf,
    ttl: Duration,
    cache: RwLock<Option<CachedProducts>>,
}

impl CsvCatalog {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { path: path.into(), ttl, cache: RwLock::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn clear_cache(&self) -> Result<(), CatalogError> {
        let mut cache = self.cache.write().map_err(|_| CatalogError::CachePoisoned)?;
        *cache = None;
        Ok(())
    }

    pub fn cache_info(&self) -> Result<CacheInfo, CatalogError> {
        let cache = self.cache.read().map_err(|_| CatalogError::CachePoisoned)?;
        let info = match cache.as_ref() {
            Some(entry) => CacheInfo {
                cached: true,
                product_count: entry.products.len(),
                age_secs: Some(entry.loaded_at.elapsed().as_secs()),
                ttl_secs: self.ttl.as_secs(),
            },
            None => CacheInfo {
                cached: false,
                product_count: 0,
                age_secs: None,
                ttl_secs: self.ttl.as_secs(),
            },
        };
        Ok(info)
    }

    fn fresh_products(&self) -> Result<Option<Arc<[Product]>>, CatalogError> {
        let cache = self.cache.read().map_err(|_| CatalogError::CachePoisoned)?;
        Ok(cache
            .as_ref()
            .filter(|entry| entry.loaded_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.products)))
    }
}

impl CatalogProvider for CsvCatalog {
    fn load_products(&self) -> Result<Arc<[Product]>, CatalogError> {
        if let Some(products) = self.fresh_products()? {
            return Ok(products);
        }

        let products: Arc<[Product]> = load_products_from_csv(&self.path)?.into();
        let mut cache = self.cache.write().map_err(|_| CatalogError::CachePoisoned)?;
        *cache = Some(CachedProducts { loaded_at: Instant::now(), products: Arc::clone(&products) });
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{load_products_from_csv, CsvCatalog};
    use crate::catalog::{CatalogError, CatalogProvider, CatalogQuery};

    const CATALOG: &str = "\
title,sale_price,brand,product_type,Key_features,url
Televisor LG 50 UHD,\"$1.799.900\",LG,Televisores,4K; webOS,https://example.test/1
Televisor KALLEY 32 HD,749900,KALLEY,Televisores,HD,https://example.test/2
Nevecón SAMSUNG 600L,\"3.899.900\",SAMSUNG,Neveras,No frost,https://example.test/3
,499900,SIN NOMBRE,Televisores,,https://example.test/4
Televisor sin precio,0,ACME,Televisores,,https://example.test/5
Sofá cama,899900,HOGAR,,,https://example.test/6
Silla gamer,599900,XYZ,Muebles,Ergonómica,https://example.test/7
";

    fn write_catalog(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("catalog.csv");
        fs::write(&path, contents).expect("write catalog fixture");
        path
    }

    #[test]
    fn loads_valid_rows_and_skips_invalid_ones() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_catalog(&dir, CATALOG);

        let products = load_products_from_csv(&path).expect("catalog loads");
        let titles = products.iter().map(|p| p.title.as_str()).collect::<Vec<_>>();

        assert_eq!(
            titles,
            vec!["Televisor LG 50 UHD", "Televisor KALLEY 32 HD", "Nevecón SAMSUNG 600L", "Silla gamer"]
        );
        assert_eq!(products[0].price, Decimal::new(1_799_900, 0));
        assert_eq!(products[0].category, "televisor");
        assert_eq!(products[0].features, "4K; webOS");
        assert_eq!(products[0].id.0, "row-1");
        assert_eq!(products[2].category, "nevera");
        assert_eq!(products[3].category, "otros");
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let error = load_products_from_csv(&dir.path().join("nope.csv")).expect_err("missing");
        assert!(matches!(error, CatalogError::MissingFile(_)));
    }

    #[test]
    fn catalog_serves_cached_products_until_cleared() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_catalog(&dir, CATALOG);
        let catalog = CsvCatalog::new(&path, Duration::from_secs(300));

        assert!(!catalog.cache_info().expect("info").cached);
        assert_eq!(catalog.load_products().expect("first load").len(), 4);

        fs::write(&path, "title,sale_price,brand,product_type,Key_features\n")
            .expect("truncate catalog");
        assert_eq!(catalog.load_products().expect("cached load").len(), 4);

        let info = catalog.cache_info().expect("info");
        assert!(info.cached);
        assert_eq!(info.product_count, 4);
        assert_eq!(info.ttl_secs, 300);

        catalog.clear_cache().expect("clear");
        assert!(catalog.load_products().expect("reload").is_empty());
    }

    #[test]
    fn expired_cache_reloads_from_disk() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_catalog(&dir, CATALOG);
        let catalog = CsvCatalog::new(&path, Duration::ZERO);

        assert_eq!(catalog.load_products().expect("first load").len(), 4);
        fs::write(&path, "title,sale_price,brand,product_type,Key_features\n")
            .expect("truncate catalog");
        assert!(catalog.load_products().expect("reload").is_empty());
    }

    #[test]
    fn unavailable_catalog_searches_as_empty() {
        let dir = TempDir::new().expect("tempdir");
        let catalog = CsvCatalog::new(dir.path().join("missing.csv"), Duration::from_secs(60));

        let result = catalog.search(&CatalogQuery::new("televisor"));
        assert!(result.is_empty());
    }
}

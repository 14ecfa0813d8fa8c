//! 商品目录 - 只读商品查询端口
//!
//! 目录数据由外部系统维护（目录 CRUD 不在本服务范围内）；秒杀
//! 流程只在下单时读取价格与折扣。`CachedCatalog` 在端口前面加
//! 一层旁路缓存，补货时使对应条目失效。

use crate::cache::Cache;
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use shared::models::Product;
use std::sync::Arc;

/// Read-only product lookup.
#[async_trait]
pub trait ProductDirectory: Send + Sync {
    async fn find(&self, product_id: &str) -> Option<Product>;
    async fn all(&self) -> Vec<Product>;
}

/// In-process catalog seeded at startup.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: DashMap<String, Product>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let catalog = Self::new();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    /// The demo sale catalog: three flash-sale items with discounts and
    /// three regular items.
    pub fn seed_demo() -> Self {
        Self::with_products(demo_products())
    }

    pub fn insert(&self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[async_trait]
impl ProductDirectory for InMemoryCatalog {
    async fn find(&self, product_id: &str) -> Option<Product> {
        self.products.get(product_id).map(|p| p.clone())
    }

    async fn all(&self) -> Vec<Product> {
        let mut products: Vec<_> = self.products.iter().map(|p| p.clone()).collect();
        products.sort_by(|a, b| a.id.cmp(&b.id));
        products
    }
}

/// Read-through caching wrapper around a [`ProductDirectory`].
pub struct CachedCatalog {
    inner: Arc<dyn ProductDirectory>,
    cache: Arc<dyn Cache>,
    ttl_secs: u64,
}

impl CachedCatalog {
    pub fn new(inner: Arc<dyn ProductDirectory>, cache: Arc<dyn Cache>, ttl_secs: u64) -> Self {
        Self {
            inner,
            cache,
            ttl_secs,
        }
    }

    fn cache_key(product_id: &str) -> String {
        format!("product:{product_id}")
    }

    /// Drop the cached entry for `product_id` (e.g. after a restock).
    pub async fn invalidate(&self, product_id: &str) {
        self.cache.invalidate(&Self::cache_key(product_id)).await;
    }
}

#[async_trait]
impl ProductDirectory for CachedCatalog {
    async fn find(&self, product_id: &str) -> Option<Product> {
        let key = Self::cache_key(product_id);

        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_str::<Product>(&raw) {
                Ok(product) => return Some(product),
                Err(e) => {
                    // Unreadable entries fall through to the source
                    tracing::warn!(product_id, error = %e, "Dropping corrupt cache entry");
                    self.cache.invalidate(&key).await;
                }
            }
        }

        let product = self.inner.find(product_id).await?;
        match serde_json::to_string(&product) {
            Ok(raw) => self.cache.set(&key, raw, self.ttl_secs).await,
            Err(e) => tracing::warn!(product_id, error = %e, "Failed to serialize product for cache"),
        }
        Some(product)
    }

    async fn all(&self) -> Vec<Product> {
        self.inner.all().await
    }
}

/// Demo seed data (ids `prod_1` .. `prod_6`).
pub fn demo_products() -> Vec<Product> {
    vec![
        Product {
            id: "prod_1".into(),
            name: "Premium Wireless Headphones".into(),
            category: "audio".into(),
            price: Decimal::new(29999, 2),
            discount: Some(40),
            flash_sale: true,
            initial_stock: 50,
        },
        Product {
            id: "prod_2".into(),
            name: "Smart Fitness Watch".into(),
            category: "wearables".into(),
            price: Decimal::new(19999, 2),
            discount: Some(50),
            flash_sale: true,
            initial_stock: 30,
        },
        Product {
            id: "prod_3".into(),
            name: "4K Action Camera".into(),
            category: "cameras".into(),
            price: Decimal::new(39999, 2),
            discount: Some(35),
            flash_sale: true,
            initial_stock: 20,
        },
        Product {
            id: "prod_4".into(),
            name: "Mechanical Gaming Keyboard".into(),
            category: "accessories".into(),
            price: Decimal::new(14999, 2),
            discount: None,
            flash_sale: false,
            initial_stock: 100,
        },
        Product {
            id: "prod_5".into(),
            name: "Portable Bluetooth Speaker".into(),
            category: "audio".into(),
            price: Decimal::new(7999, 2),
            discount: None,
            flash_sale: false,
            initial_stock: 75,
        },
        Product {
            id: "prod_6".into(),
            name: "USB-C Charging Hub".into(),
            category: "accessories".into(),
            price: Decimal::new(4999, 2),
            discount: None,
            flash_sale: false,
            initial_stock: 150,
        },
    ]
}

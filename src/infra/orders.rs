use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::{OrderSummary, ProductInfo};
use crate::error::{Result, StoreError};

/// Host commerce system access: orders, their metadata, and product weights.
pub trait OrderStore: Send + Sync {
    fn order(&self, order_id: u64) -> Result<Option<OrderSummary>>;

    fn meta(&self, order_id: u64, key: &str) -> Result<Option<String>>;

    /// Writes every entry or none of them.
    fn set_meta(&self, order_id: u64, entries: &[(String, String)]) -> Result<()>;

    fn products(&self) -> Result<Vec<ProductInfo>>;
}

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<u64, OrderSummary>>,
    meta: RwLock<HashMap<u64, HashMap<String, String>>>,
    products: RwLock<Vec<ProductInfo>>,
}

fn poisoned() -> StoreError {
    StoreError::Backend("order store lock poisoned".into())
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: OrderSummary) -> Result<()> {
        self.orders
            .write()
            .map_err(|_| poisoned())?
            .insert(order.id, order);
        Ok(())
    }

    pub fn insert_product(&self, product: ProductInfo) -> Result<()> {
        self.products.write().map_err(|_| poisoned())?.push(product);
        Ok(())
    }
}

impl OrderStore for MemoryOrderStore {
    fn order(&self, order_id: u64) -> Result<Option<OrderSummary>> {
        Ok(self
            .orders
            .read()
            .map_err(|_| poisoned())?
            .get(&order_id)
            .cloned())
    }

    fn meta(&self, order_id: u64, key: &str) -> Result<Option<String>> {
        Ok(self
            .meta
            .read()
            .map_err(|_| poisoned())?
            .get(&order_id)
            .and_then(|entries| entries.get(key).cloned()))
    }

    fn set_meta(&self, order_id: u64, entries: &[(String, String)]) -> Result<()> {
        let mut meta = self.meta.write().map_err(|_| poisoned())?;
        let order_meta = meta.entry(order_id).or_default();
        for (key, value) in entries {
            order_meta.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn products(&self) -> Result<Vec<ProductInfo>> {
        Ok(self.products.read().map_err(|_| poisoned())?.clone())
    }
}

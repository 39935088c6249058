//! Catalog collaborator (menu items and tables)
//!
//! The ledger only reads the catalog. Administration of menu items and tables
//! lives outside this service; `InMemoryCatalog` is the implementation used
//! by development setups and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::BoxError;

/// Menu item as seen by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub available: bool,
    pub out_of_stock: bool,
}

impl CatalogItem {
    /// 可下单：上架且有库存
    pub fn is_orderable(&self) -> bool {
        self.available && !self.out_of_stock
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: String,
    pub number: String,
    pub name: Option<String>,
    pub active: bool,
}

/// Read-only catalog lookups, always scoped to one tenant
///
/// An item or table of another tenant is reported as absent.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_item(&self, item_id: &str, tenant_id: &str)
    -> Result<Option<CatalogItem>, BoxError>;

    async fn get_table(&self, table_id: &str, tenant_id: &str)
    -> Result<Option<TableInfo>, BoxError>;
}

/// DashMap-backed catalog keyed by `(tenant_id, id)`
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    items: Arc<DashMap<(String, String), CatalogItem>>,
    tables: Arc<DashMap<(String, String), TableInfo>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_item(&self, tenant_id: &str, item: CatalogItem) {
        self.items
            .insert((tenant_id.to_string(), item.id.clone()), item);
    }

    pub fn upsert_table(&self, tenant_id: &str, table: TableInfo) {
        self.tables
            .insert((tenant_id.to_string(), table.id.clone()), table);
    }

    /// Change the live price (existing orders keep their snapshot)
    pub fn set_price(&self, tenant_id: &str, item_id: &str, price: Decimal) -> bool {
        match self
            .items
            .get_mut(&(tenant_id.to_string(), item_id.to_string()))
        {
            Some(mut item) => {
                item.unit_price = price;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_item(
        &self,
        item_id: &str,
        tenant_id: &str,
    ) -> Result<Option<CatalogItem>, BoxError> {
        Ok(self
            .items
            .get(&(tenant_id.to_string(), item_id.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn get_table(
        &self,
        table_id: &str,
        tenant_id: &str,
    ) -> Result<Option<TableInfo>, BoxError> {
        Ok(self
            .tables
            .get(&(tenant_id.to_string(), table_id.to_string()))
            .map(|e| e.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> CatalogItem {
        CatalogItem {
            id: id.into(),
            name: "Thieboudienne".into(),
            unit_price: Decimal::from(2500),
            available: true,
            out_of_stock: false,
        }
    }

    #[tokio::test]
    async fn lookups_are_tenant_scoped() {
        let catalog = InMemoryCatalog::new();
        catalog.upsert_item("t1", item("i1"));

        assert!(catalog.get_item("i1", "t1").await.unwrap().is_some());
        assert!(catalog.get_item("i1", "t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_price_changes_live_item_only() {
        let catalog = InMemoryCatalog::new();
        catalog.upsert_item("t1", item("i1"));
        assert!(catalog.set_price("t1", "i1", Decimal::from(3000)));
        assert!(!catalog.set_price("t1", "missing", Decimal::from(3000)));

        let live = catalog.get_item("i1", "t1").await.unwrap().unwrap();
        assert_eq!(live.unit_price, Decimal::from(3000));
    }

    #[test]
    fn orderable_requires_available_and_stock() {
        let mut i = item("i1");
        assert!(i.is_orderable());
        i.out_of_stock = true;
        assert!(!i.is_orderable());
        i.out_of_stock = false;
        i.available = false;
        assert!(!i.is_orderable());
    }
}

//! Seed data for the in-memory collaborators
//!
//! Tenants, users and menus are administered elsewhere; a local run loads a
//! snapshot of them from `SEED_FILE`.
//!
//! ```json
//! {
//!   "tenants": [{"id": "t1", "slug": "chez-awa", "name": "Chez Awa", "active": true}],
//!   "users":   [{"id": "u1", "tenant_id": "t1", "role": "ADMIN", "active": true}],
//!   "items":   [{"tenant_id": "t1", "id": "yassa", "name": "Yassa", "unit_price": 1500,
//!                "available": true, "out_of_stock": false}],
//!   "tables":  [{"tenant_id": "t1", "id": "table-1", "number": "1", "active": true}]
//! }
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::catalog::{CatalogItem, InMemoryCatalog, TableInfo};
use crate::directory::{InMemoryDirectory, Tenant, User};

#[derive(Debug, Deserialize)]
struct TenantScoped<T> {
    tenant_id: String,
    #[serde(flatten)]
    value: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    tenants: Vec<Tenant>,
    users: Vec<User>,
    items: Vec<TenantScoped<CatalogItem>>,
    tables: Vec<TenantScoped<TableInfo>>,
}

impl Seed {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn apply(self, directory: &InMemoryDirectory, catalog: &InMemoryCatalog) {
        tracing::info!(
            tenants = self.tenants.len(),
            users = self.users.len(),
            items = self.items.len(),
            tables = self.tables.len(),
            "Applying seed data"
        );
        for tenant in self.tenants {
            directory.upsert_tenant(tenant);
        }
        for user in self.users {
            directory.upsert_user(user);
        }
        for item in self.items {
            catalog.upsert_item(&item.tenant_id, item.value);
        }
        for table in self.tables {
            catalog.upsert_table(&table.tenant_id, table.value);
        }
    }
}

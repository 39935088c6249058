//! Tenant and user directory
//!
//! Tenant/user administration is an external collaborator; the core reads
//! the active flags and resolves public slugs.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Role;
use crate::error::BoxError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    /// Public slug used by customer-facing order links
    pub slug: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub tenant_id: String,
    pub role: Role,
    pub active: bool,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, BoxError>;

    async fn tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, BoxError>;

    async fn user(&self, user_id: &str) -> Result<Option<User>, BoxError>;
}

#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    tenants: Arc<DashMap<String, Tenant>>,
    /// slug → tenant_id
    slugs: Arc<DashMap<String, String>>,
    users: Arc<DashMap<String, User>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_tenant(&self, tenant: Tenant) {
        self.slugs.insert(tenant.slug.clone(), tenant.id.clone());
        self.tenants.insert(tenant.id.clone(), tenant);
    }

    pub fn upsert_user(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn set_tenant_active(&self, tenant_id: &str, active: bool) {
        if let Some(mut tenant) = self.tenants.get_mut(tenant_id) {
            tenant.active = active;
        }
    }

    pub fn set_user_active(&self, user_id: &str, active: bool) {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.active = active;
        }
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, BoxError> {
        Ok(self.tenants.get(tenant_id).map(|t| t.value().clone()))
    }

    async fn tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>, BoxError> {
        let Some(id) = self.slugs.get(slug).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        self.tenant(&id).await
    }

    async fn user(&self, user_id: &str) -> Result<Option<User>, BoxError> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }
}

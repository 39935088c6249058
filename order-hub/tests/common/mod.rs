//! Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use order_hub::audit::MemoryAuditSink;
use order_hub::auth::{JwtVerifier, Principal, Role};
use order_hub::catalog::{CatalogItem, InMemoryCatalog, TableInfo};
use order_hub::config::Config;
use order_hub::directory::{InMemoryDirectory, Tenant, User};
use order_hub::provider::signature::{sign_hex, verify_hex};
use order_hub::provider::{
    CallbackData, InitiateRequest, InitiateResponse, PaymentProvider, ProviderError, ProviderInfo,
    ProviderRegistry, StatusCheck,
};
use order_hub::state::{Backends, Collaborators};
use order_hub::store::MemoryStore;
use order_hub::AppState;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use shared::order::{CreateOrderRequest, OrderLineInput, PaymentMethod, PaymentStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub const WEBHOOK_SECRET: &str = "integration-secret";
pub const JWT_SECRET: &str = "integration-jwt-secret";

/// Wave-shaped provider that signs the raw body with [`WEBHOOK_SECRET`]
pub struct MockProvider {
    counter: AtomicU64,
    pub initiations: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            initiations: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Wave
    }

    fn signature_header(&self) -> &'static str {
        "x-wave-signature"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            configured: true,
            api_url: "mock://wave".into(),
            merchant_id: Some("***0001".into()),
        }
    }

    async fn initiate(&self, req: &InitiateRequest) -> Result<InitiateResponse, ProviderError> {
        self.initiations.fetch_add(1, Ordering::SeqCst);
        // let concurrent initiations interleave
        tokio::task::yield_now().await;
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(InitiateResponse {
            transaction_id: format!("mock-tx-{n}"),
            payment_url: format!("https://pay.mock/{}", req.order_id),
            raw: Value::Null,
        })
    }

    fn verify_signature(&self, raw_body: &[u8], _payload: &Value, signature: &str) -> bool {
        verify_hex(WEBHOOK_SECRET, raw_body, signature)
    }

    async fn check_status(&self, _transaction_id: &str) -> Result<StatusCheck, ProviderError> {
        Ok(StatusCheck {
            status: PaymentStatus::Pending,
            provider_reference: None,
            raw: Value::Null,
        })
    }

    fn map_status(&self, raw: &str) -> PaymentStatus {
        match raw.to_ascii_lowercase().as_str() {
            "succeeded" => PaymentStatus::Success,
            "failed" => PaymentStatus::Failed,
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Pending,
        }
    }

    fn parse_callback(&self, payload: &Value) -> Result<CallbackData, ProviderError> {
        let transaction_id = payload["id"]
            .as_str()
            .ok_or_else(|| ProviderError::InvalidPayload("missing id".into()))?;
        Ok(CallbackData {
            transaction_id: transaction_id.to_string(),
            order_id: payload["order_id"].as_str().map(str::to_string),
            status: self.map_status(payload["status"].as_str().unwrap_or_default()),
            provider_reference: Some(format!("ref-{transaction_id}")),
            message: None,
            raw: payload.clone(),
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub catalog: InMemoryCatalog,
    pub directory: InMemoryDirectory,
    pub store: MemoryStore,
    pub audit: MemoryAuditSink,
    pub jwt: JwtVerifier,
}

pub fn item(id: &str, price: i64) -> CatalogItem {
    CatalogItem {
        id: id.into(),
        name: format!("Item {id}"),
        unit_price: Decimal::from(price),
        available: true,
        out_of_stock: false,
    }
}

/// Tenant `t1` (slug `chez-awa`) with items `thieb` @1500 and `mafe` @3000,
/// table `table-1`, users `admin`, `manager`, `cook`
pub fn test_app_with(mut config: Config) -> TestApp {
    config.jwt_secret = JWT_SECRET.into();

    let catalog = InMemoryCatalog::new();
    catalog.upsert_item("t1", item("thieb", 1500));
    catalog.upsert_item("t1", item("mafe", 3000));
    catalog.upsert_table(
        "t1",
        TableInfo {
            id: "table-1".into(),
            number: "1".into(),
            name: Some("Terrasse".into()),
            active: true,
        },
    );

    let directory = InMemoryDirectory::new();
    directory.upsert_tenant(Tenant {
        id: "t1".into(),
        slug: "chez-awa".into(),
        name: "Chez Awa".into(),
        active: true,
    });
    for (id, role) in [
        ("admin", Role::Admin),
        ("manager", Role::Manager),
        ("cook", Role::Staff),
    ] {
        directory.upsert_user(User {
            id: id.into(),
            tenant_id: "t1".into(),
            role,
            active: true,
        });
    }

    let store = MemoryStore::new();
    let audit = MemoryAuditSink::new();
    let jwt = JwtVerifier::new(JWT_SECRET);

    let collaborators = Collaborators {
        catalog: Arc::new(catalog.clone()),
        directory: Arc::new(directory.clone()),
        verifier: Arc::new(jwt.clone()),
        providers: ProviderRegistry::new().with(Arc::new(MockProvider::new())),
    };
    let backends = Backends {
        orders: Arc::new(store.clone()),
        payments: Arc::new(store.clone()),
        audit_sink: Arc::new(audit.clone()),
    };

    TestApp {
        state: AppState::assemble(config, collaborators, backends),
        catalog,
        directory,
        store,
        audit,
        jwt,
    }
}

pub fn test_app() -> TestApp {
    test_app_with(Config::for_development())
}

impl TestApp {
    pub fn principal(&self, user_id: &str, role: Role) -> Principal {
        Principal {
            user_id: user_id.into(),
            tenant_id: "t1".into(),
            role,
        }
    }

    pub fn token(&self, user_id: &str, role: Role) -> String {
        self.jwt
            .issue(user_id, "t1", role, chrono::Duration::hours(1))
            .unwrap()
    }
}

pub fn order_request(lines: &[(&str, i32)]) -> CreateOrderRequest {
    CreateOrderRequest {
        items: lines
            .iter()
            .map(|(item_id, quantity)| OrderLineInput {
                item_id: (*item_id).into(),
                quantity: *quantity,
                note: None,
            })
            .collect(),
        payment_method: PaymentMethod::Wave,
        ..Default::default()
    }
}

/// Signed webhook body for the mock provider
pub fn signed_callback(transaction_id: &str, status: &str) -> (String, String) {
    let body = json!({"id": transaction_id, "status": status}).to_string();
    let signature = sign_hex(WEBHOOK_SECRET, body.as_bytes());
    (body, signature)
}

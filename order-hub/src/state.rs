//! Application state shared by every handler

use std::sync::Arc;

use crate::audit::{AuditService, AuditSink, AuditWorker, TracingAuditSink};
use crate::auth::{JwtVerifier, TokenVerifier};
use crate::catalog::{Catalog, InMemoryCatalog};
use crate::config::Config;
use crate::directory::{Directory, InMemoryDirectory};
use crate::live::NotificationHub;
use crate::orders::{LedgerDeps, OrderLedger};
use crate::payments::{PaymentDeps, PaymentOrchestrator, PaymentSettings};
use crate::provider::ProviderRegistry;
use crate::seed::Seed;
use crate::store::{MemoryStore, OrderRepository, PaymentRepository};

/// Services owned outside the order hub
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub directory: Arc<dyn Directory>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub providers: ProviderRegistry,
}

impl Collaborators {
    /// In-memory catalog/directory (optionally seeded), JWT verifier and the
    /// configured providers
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let catalog = InMemoryCatalog::new();
        let directory = InMemoryDirectory::new();
        if let Some(path) = config.seed_file.as_deref() {
            Seed::load(path)?.apply(&directory, &catalog);
        } else {
            tracing::warn!("SEED_FILE not set, directory and catalog start empty");
        }
        Ok(Self {
            catalog: Arc::new(catalog),
            directory: Arc::new(directory),
            verifier: Arc::new(JwtVerifier::new(&config.jwt_secret)),
            providers: ProviderRegistry::from_config(config),
        })
    }
}

/// Persistence and audit backends
pub struct Backends {
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub audit_sink: Arc<dyn AuditSink>,
}

impl Backends {
    pub fn memory() -> Self {
        let store = MemoryStore::new();
        Self {
            orders: Arc::new(store.clone()),
            payments: Arc::new(store),
            audit_sink: Arc::new(TracingAuditSink),
        }
    }

    /// Postgres when built with it and `DATABASE_URL` is set, memory otherwise
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        #[cfg(feature = "postgres")]
        if let Some(url) = config.database_url.as_deref() {
            let store = crate::store::PgStore::connect(url).await?;
            tracing::info!("Using PostgreSQL store");
            let sink = crate::audit::PgAuditSink::new(store.pool().clone());
            let store = Arc::new(store);
            return Ok(Self {
                orders: store.clone(),
                payments: store,
                audit_sink: Arc::new(sink),
            });
        }

        if config.database_url.is_some() && !cfg!(feature = "postgres") {
            tracing::warn!("DATABASE_URL ignored: built without the postgres feature");
        }
        tracing::info!("Using in-memory store");
        Ok(Self::memory())
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<OrderLedger>,
    pub payments: Arc<PaymentOrchestrator>,
    pub hub: NotificationHub,
    pub verifier: Arc<dyn TokenVerifier>,
    pub directory: Arc<dyn Directory>,
}

impl AppState {
    /// Full start-up wiring
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        let backends = Backends::from_config(&config).await?;
        Ok(Self::assemble(config, collaborators, backends))
    }

    /// Wire the core services; spawns the audit worker (needs a runtime)
    pub fn assemble(config: Config, collaborators: Collaborators, backends: Backends) -> Self {
        let hub = NotificationHub::new(config.hub_connection_buffer);
        let (audit, audit_rx) = AuditService::new(config.audit_buffer_size);
        tokio::spawn(AuditWorker::new(backends.audit_sink).run(audit_rx));

        let ledger = OrderLedger::new(LedgerDeps {
            orders: backends.orders.clone(),
            catalog: collaborators.catalog,
            directory: collaborators.directory.clone(),
            publisher: Arc::new(hub.clone()),
            audit: audit.clone(),
        });
        let payments = PaymentOrchestrator::new(PaymentDeps {
            payments: backends.payments,
            orders: backends.orders,
            providers: collaborators.providers,
            publisher: Arc::new(hub.clone()),
            audit,
            settings: PaymentSettings::from_config(&config),
        });

        Self {
            config: Arc::new(config),
            ledger: Arc::new(ledger),
            payments: Arc::new(payments),
            hub,
            verifier: collaborators.verifier,
            directory: collaborators.directory,
        }
    }
}

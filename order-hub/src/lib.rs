//! order-hub: 多租户点餐订单中心
//!
//! ```text
//! client ──► OrderLedger (create / status) ──► PaymentOrchestrator (initiate)
//!                 ▲                                   │
//!                 │                           PaymentProvider (MyNita / Wave)
//!                 │                                   │
//!   webhook ──► PaymentOrchestrator (settle) ◄────────┘
//!                 │
//!                 ▼
//!          NotificationHub ──► WebSocket clients (tenant / role / kitchen / user)
//! ```

pub mod api;
pub mod audit;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod live;
pub mod logger;
pub mod orders;
pub mod payments;
pub mod provider;
pub mod seed;
pub mod state;
pub mod store;

pub use config::Config;
pub use state::AppState;

//! Shared types for the ordering platform
//!
//! Common types used by order-hub and its clients: the unified error system,
//! order/payment records, the realtime protocol and small utilities.

pub mod error;
pub mod order;
pub mod realtime;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, ErrorCode};

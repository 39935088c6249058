//! Order domain types
//!
//! - `status`: order/payment status vocabularies and the legal transition table
//! - `types`: order, line and payment records, requests, listings and stats

pub mod status;
pub mod types;

pub use status::{OrderStatus, PaymentMethod, PaymentStatus, UnknownStatus};
pub use types::*;

//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Domain of an error, taken from the thousands digit of its code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    General,
    Auth,
    Permission,
    Tenant,
    Order,
    Payment,
    Catalog,
    Table,
    /// 8xxx is reserved and folds in here
    System,
}

impl ErrorCategory {
    pub fn from_code(code: u16) -> Self {
        match code / 1000 {
            0 => Self::General,
            1 => Self::Auth,
            2 => Self::Permission,
            3 => Self::Tenant,
            4 => Self::Order,
            5 => Self::Payment,
            6 => Self::Catalog,
            7 => Self::Table,
            _ => Self::System,
        }
    }
}

impl ErrorCode {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

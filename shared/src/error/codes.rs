//! 错误码定义 (ranges documented in the parent module)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes shared by order-hub and its clients
///
/// Serialised as a bare u16; `ALL` must list every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,
    /// Account is disabled
    AccountDisabled = 1007,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Specific role required
    RoleRequired = 2002,
    /// Admin role required
    AdminRequired = 2003,

    // ==================== 3xxx: Tenant ====================
    /// Tenant not found (or inactive)
    TenantNotFound = 3002,
    /// Tenant is disabled
    TenantInactive = 3022,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order has already been completed
    OrderAlreadyCompleted = 4003,
    /// Order has already been cancelled
    OrderAlreadyCancelled = 4004,
    /// Order is empty
    OrderEmpty = 4007,
    /// Requested status transition is not legal from the current status
    OrderInvalidTransition = 4008,
    /// Order is no longer awaiting confirmation
    OrderNotPending = 4009,
    /// Order could not be persisted (numbering exhausted)
    OrderCreationFailed = 4010,
    /// Order was modified concurrently, retries exhausted
    OrderConcurrentModification = 4011,

    // ==================== 5xxx: Payment ====================
    /// Payment processing failed
    PaymentFailed = 5001,
    /// Invalid payment method
    PaymentInvalidMethod = 5003,
    /// Payment not found
    PaymentNotFound = 5006,
    /// An active payment already exists for the order
    PaymentAlreadyInProgress = 5007,
    /// Provider refused or failed to create a payment intent
    PaymentInitiationFailed = 5008,
    /// Webhook signature verification failed
    PaymentInvalidSignature = 5009,
    /// Provider is not configured
    PaymentProviderUnavailable = 5010,
    /// Payment method is not backed by a provider
    PaymentUnsupportedProvider = 5011,

    // ==================== 6xxx: Catalog ====================
    /// Catalog item not found
    ProductNotFound = 6001,
    /// Catalog item is out of stock
    ProductOutOfStock = 6003,
    /// Catalog item is unavailable for ordering
    ProductUnavailable = 6004,

    // ==================== 7xxx: Table ====================
    /// Table not found (or inactive)
    TableNotFound = 7001,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Network error
    NetworkError = 9003,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// System busy (retry later)
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Every code, in numeric order (wire decoding walks this table)
    pub const ALL: &'static [ErrorCode] = &[
        ErrorCode::Success,
        ErrorCode::Unknown,
        ErrorCode::ValidationFailed,
        ErrorCode::NotFound,
        ErrorCode::AlreadyExists,
        ErrorCode::InvalidRequest,
        ErrorCode::InvalidFormat,
        ErrorCode::RequiredField,
        ErrorCode::ValueOutOfRange,
        ErrorCode::NotAuthenticated,
        ErrorCode::TokenExpired,
        ErrorCode::TokenInvalid,
        ErrorCode::AccountDisabled,
        ErrorCode::PermissionDenied,
        ErrorCode::RoleRequired,
        ErrorCode::AdminRequired,
        ErrorCode::TenantNotFound,
        ErrorCode::TenantInactive,
        ErrorCode::OrderNotFound,
        ErrorCode::OrderAlreadyCompleted,
        ErrorCode::OrderAlreadyCancelled,
        ErrorCode::OrderEmpty,
        ErrorCode::OrderInvalidTransition,
        ErrorCode::OrderNotPending,
        ErrorCode::OrderCreationFailed,
        ErrorCode::OrderConcurrentModification,
        ErrorCode::PaymentFailed,
        ErrorCode::PaymentInvalidMethod,
        ErrorCode::PaymentNotFound,
        ErrorCode::PaymentAlreadyInProgress,
        ErrorCode::PaymentInitiationFailed,
        ErrorCode::PaymentInvalidSignature,
        ErrorCode::PaymentProviderUnavailable,
        ErrorCode::PaymentUnsupportedProvider,
        ErrorCode::ProductNotFound,
        ErrorCode::ProductOutOfStock,
        ErrorCode::ProductUnavailable,
        ErrorCode::TableNotFound,
        ErrorCode::InternalError,
        ErrorCode::DatabaseError,
        ErrorCode::NetworkError,
        ErrorCode::TimeoutError,
        ErrorCode::ConfigError,
        ErrorCode::SystemBusy,
    ];

    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",
            ErrorCode::AccountDisabled => "Account is disabled",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::RoleRequired => "Specific role is required",
            ErrorCode::AdminRequired => "Administrator role is required",

            // Tenant
            ErrorCode::TenantNotFound => "Tenant not found",
            ErrorCode::TenantInactive => "Tenant is inactive",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderAlreadyCompleted => "Order has already been delivered",
            ErrorCode::OrderAlreadyCancelled => "Order has already been cancelled",
            ErrorCode::OrderEmpty => "Order must contain at least one item",
            ErrorCode::OrderInvalidTransition => "Invalid order status transition",
            ErrorCode::OrderNotPending => "Order is not awaiting confirmation",
            ErrorCode::OrderCreationFailed => "Order could not be created",
            ErrorCode::OrderConcurrentModification => "Order was modified concurrently",

            // Payment
            ErrorCode::PaymentFailed => "Payment processing failed",
            ErrorCode::PaymentInvalidMethod => "Invalid payment method",
            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::PaymentAlreadyInProgress => {
                "A payment is already in progress or completed for this order"
            }
            ErrorCode::PaymentInitiationFailed => "Payment initiation failed",
            ErrorCode::PaymentInvalidSignature => "Invalid webhook signature",
            ErrorCode::PaymentProviderUnavailable => "Payment provider is not configured",
            ErrorCode::PaymentUnsupportedProvider => "Payment method is not supported",

            // Catalog
            ErrorCode::ProductNotFound => "Item not found",
            ErrorCode::ProductOutOfStock => "Item is out of stock",
            ErrorCode::ProductUnavailable => "Item is unavailable",

            // Table
            ErrorCode::TableNotFound => "Table not found or inactive",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::SystemBusy => "System busy, please retry later",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code() == value)
            .ok_or(InvalidErrorCode(value))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::ValidationFailed.code(), 2);
        assert_eq!(ErrorCode::NotAuthenticated.code(), 1001);
        assert_eq!(ErrorCode::TenantNotFound.code(), 3002);
        assert_eq!(ErrorCode::OrderInvalidTransition.code(), 4008);
        assert_eq!(ErrorCode::PaymentAlreadyInProgress.code(), 5007);
        assert_eq!(ErrorCode::ProductUnavailable.code(), 6004);
        assert_eq!(ErrorCode::TableNotFound.code(), 7001);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&ErrorCode::OrderNotFound).unwrap();
        assert_eq!(json, "4001");

        let json = serde_json::to_string(&ErrorCode::Success).unwrap();
        assert_eq!(json, "0");
    }

    #[test]
    fn test_deserialize() {
        let code: ErrorCode = serde_json::from_str("5009").unwrap();
        assert_eq!(code, ErrorCode::PaymentInvalidSignature);

        let code: ErrorCode = serde_json::from_str("9001").unwrap();
        assert_eq!(code, ErrorCode::InternalError);
    }

    #[test]
    fn test_deserialize_invalid() {
        let result: Result<ErrorCode, _> = serde_json::from_str("999");
        assert!(result.is_err());

        let result: Result<ErrorCode, _> = serde_json::from_str("10000");
        assert!(result.is_err());
    }

    #[test]
    fn all_table_is_sorted_and_round_trips() {
        assert!(ErrorCode::ALL.windows(2).all(|w| w[0].code() < w[1].code()));
        for &code in ErrorCode::ALL {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
            assert!(!code.message().is_empty());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::OrderNotFound), "4001");
        assert_eq!(format!("{}", InvalidErrorCode(999)), "invalid error code: 999");
    }
}

//! Order and payment status vocabularies
//!
//! `OrderStatus` carries the legal transition table. Everything that moves an
//! order (staff updates, cancellation, payment settlement) goes through
//! [`OrderStatus::can_transition_to`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 待确认
    #[default]
    Pending,
    Accepted,
    Preparing,
    Ready,
    /// 终态
    Delivered,
    /// 终态
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Legal successors of this status
    pub const fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Accepted, OrderStatus::Cancelled],
            OrderStatus::Accepted => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Preparing => &[OrderStatus::Ready, OrderStatus::Cancelled],
            OrderStatus::Ready => &[OrderStatus::Delivered, OrderStatus::Cancelled],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Steps a successful payment applies, each one a legal transition
    ///
    /// PENDING goes through ACCEPTED to PREPARING; ACCEPTED goes to
    /// PREPARING; orders already past that point are left alone.
    pub const fn payment_confirmation_path(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Accepted, OrderStatus::Preparing],
            OrderStatus::Accepted => &[OrderStatus::Preparing],
            _ => &[],
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an unknown status string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Canonical payment status
///
/// Provider vocabularies are mapped onto this set; anything unmapped is
/// `Pending`, never `Success`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Pending or succeeded: blocks another initiation for the same order
    pub const fn is_active(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Success)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            PaymentStatus::Pending,
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ]
        .into_iter()
        .find(|st| st.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Payment method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Mobile,
    Wave,
    Mynita,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Mobile,
        PaymentMethod::Wave,
        PaymentMethod::Mynita,
    ];

    /// Whether an external provider settles this method
    pub const fn is_provider_backed(&self) -> bool {
        matches!(self, PaymentMethod::Wave | PaymentMethod::Mynita)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Mobile => "MOBILE",
            PaymentMethod::Wave => "WAVE",
            PaymentMethod::Mynita => "MYNITA",
        }
    }

    /// Lower-case name used in webhook paths (`/payments/webhooks/wave`)
    pub fn slug(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_pipeline_is_legal() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Accepted));
        assert!(OrderStatus::Accepted.can_transition_to(OrderStatus::Preparing));
        assert!(OrderStatus::Preparing.can_transition_to(OrderStatus::Ready));
        assert!(OrderStatus::Ready.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_cancel_reachable_from_non_terminal() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Accepted,
            OrderStatus::Preparing,
            OrderStatus::Ready,
        ] {
            assert!(status.can_transition_to(OrderStatus::Cancelled), "{status}");
        }
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.is_terminal(),
                status.allowed_transitions().is_empty(),
                "{status}"
            );
        }
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_skips_and_backwards_moves_are_illegal() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Ready.can_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Accepted.can_transition_to(OrderStatus::Accepted));
    }

    #[test]
    fn test_payment_confirmation_path_is_legal() {
        for status in OrderStatus::ALL {
            let mut current = status;
            for next in status.payment_confirmation_path() {
                assert!(current.can_transition_to(*next), "{current} -> {next}");
                current = *next;
            }
        }
        assert_eq!(
            OrderStatus::Pending.payment_confirmation_path().last(),
            Some(&OrderStatus::Preparing)
        );
        assert!(OrderStatus::Cancelled.payment_confirmation_path().is_empty());
        assert!(OrderStatus::Ready.payment_confirmation_path().is_empty());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Preparing).unwrap(),
            "\"PREPARING\""
        );
        assert_eq!(
            serde_json::from_str::<PaymentMethod>("\"MYNITA\"").unwrap(),
            PaymentMethod::Mynita
        );
        assert_eq!("ready".parse::<OrderStatus>().unwrap(), OrderStatus::Ready);
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_payment_status_flags() {
        assert!(PaymentStatus::Pending.is_active());
        assert!(PaymentStatus::Success.is_active());
        assert!(!PaymentStatus::Failed.is_active());
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_provider_backed_methods() {
        assert!(PaymentMethod::Wave.is_provider_backed());
        assert!(PaymentMethod::Mynita.is_provider_backed());
        assert!(!PaymentMethod::Cash.is_provider_backed());
        assert_eq!(PaymentMethod::Mynita.slug(), "mynita");
        assert_eq!("wave".parse::<PaymentMethod>().unwrap(), PaymentMethod::Wave);
    }
}

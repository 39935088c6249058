//! 订单编号：`YYYYMMDD` + 4 位日内序号
//!
//! Derive-and-insert runs under a per-(tenant, UTC date) async mutex; the
//! store's unique `(tenant_id, order_number)` constraint backs it up across
//! processes, and collisions are retried by the ledger.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LedgerError, LedgerResult};

/// Insert attempts before giving up with `CreationFailed`
pub const MAX_NUMBER_ATTEMPTS: usize = 5;

const MAX_SEQUENCE: u32 = 9999;

/// Number following `last` for the day `date_prefix` (`YYYYMMDD`)
pub fn next_order_number(last: Option<&str>, date_prefix: &str) -> LedgerResult<String> {
    let next = match last {
        None => 1,
        Some(number) => {
            let seq = number
                .strip_prefix(date_prefix)
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| {
                    LedgerError::CreationFailed(format!("unparseable order number {number}"))
                })?;
            seq + 1
        }
    };
    if next > MAX_SEQUENCE {
        return Err(LedgerError::CreationFailed(format!(
            "daily sequence exhausted for {date_prefix}"
        )));
    }
    Ok(format!("{date_prefix}{next:04}"))
}

/// Serialises numbering per tenant and day
#[derive(Default)]
pub struct OrderNumbering {
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl OrderNumbering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the (tenant, day) lock for the duration of derive + insert
    pub async fn lock(&self, tenant_id: &str, date_prefix: &str) -> OwnedMutexGuard<()> {
        let key = (tenant_id.to_string(), date_prefix.to_string());
        let existing = self.locks.get(&key).map(|m| m.clone());
        let mutex = match existing {
            Some(m) => m,
            None => {
                // 新的一天：清理前一天未被持有的锁
                self.locks
                    .retain(|(_, day), m| day.as_str() == date_prefix || Arc::strong_count(m) > 1);
                self.locks.entry(key).or_default().clone()
            }
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_number_of_the_day() {
        assert_eq!(next_order_number(None, "20260115").unwrap(), "202601150001");
    }

    #[test]
    fn increments_trailing_sequence() {
        assert_eq!(
            next_order_number(Some("202601150041"), "20260115").unwrap(),
            "202601150042"
        );
    }

    #[test]
    fn exhausted_sequence_fails() {
        let err = next_order_number(Some("202601159999"), "20260115").unwrap_err();
        assert!(matches!(err, LedgerError::CreationFailed(_)));
    }

    #[test]
    fn garbage_number_fails() {
        assert!(next_order_number(Some("ABC"), "20260115").is_err());
    }

    #[tokio::test]
    async fn stale_day_locks_are_pruned() {
        let numbering = OrderNumbering::new();
        drop(numbering.lock("t1", "20260114").await);
        drop(numbering.lock("t2", "20260114").await);
        assert_eq!(numbering.lock_count(), 2);

        let _guard = numbering.lock("t1", "20260115").await;
        assert_eq!(numbering.lock_count(), 1);
    }
}

//! event sources
//!
//! anything that can hand out the three append-only logs. batches are checked
//! before they touch a tree: sorted by index, exact duplicates dropped,
//! conflicting duplicates and holes rejected.

use std::future::Future;

use ap_core::{AccountEvent, EventKind, Indexed, MemoryEventLog, TreeEvent};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

pub trait EventSource {
    /// deposit events with `index >= since`
    fn deposit_events(&self, since: u64) -> impl Future<Output = Result<Vec<TreeEvent>>>;

    /// withdrawal events with `index >= since`
    fn withdrawal_events(&self, since: u64) -> impl Future<Output = Result<Vec<TreeEvent>>>;

    /// account events with `index >= since`
    fn account_events(&self, since: u64) -> impl Future<Output = Result<Vec<AccountEvent>>>;
}

impl EventSource for MemoryEventLog {
    async fn deposit_events(&self, since: u64) -> Result<Vec<TreeEvent>> {
        Ok(self.deposits_since(since))
    }

    async fn withdrawal_events(&self, since: u64) -> Result<Vec<TreeEvent>> {
        Ok(self.withdrawals_since(since))
    }

    async fn account_events(&self, since: u64) -> Result<Vec<AccountEvent>> {
        Ok(self.accounts_since(since))
    }
}

/// order a fetched batch and make sure it continues the log at `since`
pub fn validate_batch<E>(kind: EventKind, since: u64, mut events: Vec<E>) -> Result<Vec<E>>
where
    E: Indexed + PartialEq,
{
    events.sort_by_key(|e| e.index());

    let mut out: Vec<E> = Vec::with_capacity(events.len());
    let mut expected = since;
    for event in events {
        let index = event.index();
        if index < since {
            debug!(%kind, index, since, "skipping already consumed event");
            continue;
        }
        if let Some(prev) = out.last() {
            if prev.index() == index {
                if *prev == event {
                    debug!(%kind, index, "dropping duplicate event");
                    continue;
                }
                warn!(%kind, index, "conflicting events");
                return Err(ClientError::ConflictingEvent { kind, index });
            }
        }
        if index != expected {
            warn!(%kind, expected, found = index, "gap in event log");
            return Err(ClientError::LogGap {
                kind,
                expected,
                found: index,
            });
        }
        out.push(event);
        expected += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    fn event(index: u64, byte: u8) -> TreeEvent {
        TreeEvent {
            instance: Address::repeat_byte(1),
            hash: B256::repeat_byte(byte),
            block: 100 + index,
            index,
        }
    }

    #[test]
    fn test_sorts_and_dedupes() {
        let batch = vec![event(2, 2), event(0, 0), event(1, 1), event(1, 1)];
        let out = validate_batch(EventKind::Deposit, 0, batch).unwrap();
        let indices: Vec<u64> = out.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_gap_rejected() {
        let err = validate_batch(EventKind::Withdrawal, 0, vec![event(0, 0), event(2, 2)])
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::LogGap {
                expected: 1,
                found: 2,
                ..
            }
        ));

        // batch must start where the cache stopped
        let err = validate_batch(EventKind::Withdrawal, 3, vec![event(4, 4)]).unwrap_err();
        assert!(matches!(err, ClientError::LogGap { expected: 3, .. }));
    }

    #[test]
    fn test_conflict_rejected() {
        let err = validate_batch(EventKind::Deposit, 0, vec![event(0, 0), event(0, 9)])
            .unwrap_err();
        assert!(matches!(err, ClientError::ConflictingEvent { index: 0, .. }));
    }

    #[test]
    fn test_consumed_prefix_skipped() {
        let out = validate_batch(EventKind::Deposit, 2, vec![event(1, 1), event(2, 2)]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].index, 2);
    }

    #[tokio::test]
    async fn test_memory_log_source() {
        let log = MemoryEventLog::new();
        log.push_deposit(Address::ZERO, B256::repeat_byte(1), 1);
        log.push_deposit(Address::ZERO, B256::repeat_byte(2), 2);
        let events = log.deposit_events(1).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, 1);
        assert!(log.account_events(0).await.unwrap().is_empty());
    }
}

//! Partitioned parallel replay
//!
//! This module provides the `BatchProcessor`, which fans a batch of
//! marketplace events out across tokio tasks while preserving the
//! orderings that matter:
//!
//! - Events addressing the same purchase request are processed in log
//!   order (they share a partition).
//! - Events addressing the same account (deposits, withdrawals) are
//!   processed in log order.
//! - The relative order of account events and request events is
//!   preserved: a batch is split into consecutive *runs* of one class,
//!   with a barrier between runs. A deposit that precedes a placement
//!   settlement in the log therefore lands before it, even though the
//!   two live in different partitions.
//!
//! Within one run, partitions are independent workflows and process in
//! parallel. Two settlements drawing on the same advertiser serialize on
//! the account lock inside the ledger; their relative order is
//! unspecified, which only matters when the advertiser cannot fund both.

use std::collections::HashMap;
use std::sync::Arc;

use super::AsyncSettlementEngine;
use crate::types::{AccountId, EventRecord, MarketError, RequestId};
use tracing::debug;

/// Partition a single event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PartitionKey {
    Request(RequestId),
    Account(AccountId),
}

impl PartitionKey {
    fn of(event: &EventRecord) -> PartitionKey {
        match (event.request(), event.account()) {
            (Some(request), _) => PartitionKey::Request(request),
            (None, Some(account)) => PartitionKey::Account(account),
            // Every event names a request or an account; the enum makes
            // anything else unrepresentable
            (None, None) => unreachable!("event without request or account"),
        }
    }

    fn is_account(&self) -> bool {
        matches!(self, PartitionKey::Account(_))
    }
}

/// Result of processing a single event
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The event that was processed
    pub event: EventRecord,

    /// The engine's verdict; rejected events are expected during replay
    /// (duplicates, stale retries) and do not stop the batch
    pub result: Result<(), MarketError>,
}

/// Fan-out processor over a shared [`AsyncSettlementEngine`]
#[derive(Clone)]
pub struct BatchProcessor {
    engine: Arc<AsyncSettlementEngine>,
}

impl BatchProcessor {
    /// Create a processor over a shared engine
    pub fn new(engine: Arc<AsyncSettlementEngine>) -> Self {
        BatchProcessor { engine }
    }

    /// Split a batch into consecutive runs of one partition class
    ///
    /// Each run is then partitioned by key. Runs execute sequentially;
    /// partitions within a run execute in parallel.
    fn runs(batch: Vec<EventRecord>) -> Vec<Vec<(PartitionKey, EventRecord)>> {
        let mut runs: Vec<Vec<(PartitionKey, EventRecord)>> = Vec::new();
        let mut current: Vec<(PartitionKey, EventRecord)> = Vec::new();
        let mut current_class: Option<bool> = None;

        for event in batch {
            let key = PartitionKey::of(&event);
            let class = key.is_account();
            if current_class != Some(class) && !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            current_class = Some(class);
            current.push((key, event));
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }

    /// Process one batch, returning per-event results in no particular
    /// order
    pub async fn process_batch(&self, batch: Vec<EventRecord>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(batch.len());

        for run in Self::runs(batch) {
            // Partition the run by key, preserving in-partition order
            let mut partitions: HashMap<PartitionKey, Vec<EventRecord>> = HashMap::new();
            for (key, event) in run {
                partitions.entry(key).or_default().push(event);
            }

            // One task per partition; the join is the barrier before the
            // next run
            let mut tasks = Vec::with_capacity(partitions.len());
            for (_key, events) in partitions {
                let engine = Arc::clone(&self.engine);
                tasks.push(tokio::spawn(async move {
                    let mut partial = Vec::with_capacity(events.len());
                    for event in events {
                        let result = engine.process(event.clone());
                        if let Err(err) = &result {
                            debug!(event = event.name(), error = %err, "event rejected");
                        }
                        partial.push(ProcessingResult { event, result });
                    }
                    partial
                }));
            }

            for task in tasks {
                match task.await {
                    Ok(partial) => results.extend(partial),
                    Err(join_err) => {
                        debug!(error = %join_err, "partition task panicked");
                    }
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commission::CommissionPolicy;
    use crate::types::{ContentMode, PLATFORM_ACCOUNT};
    use rust_decimal::Decimal;

    fn units(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn deposit(account: AccountId, gross: i64, reference: &str) -> EventRecord {
        EventRecord::Deposit {
            account,
            gross: units(gross),
            method: "paypal".to_string(),
            reference: reference.to_string(),
        }
    }

    fn workflow(request: RequestId, advertiser: AccountId, publisher: AccountId) -> Vec<EventRecord> {
        vec![
            EventRecord::CreateRequest {
                request,
                advertiser,
                publisher,
                price: units(500),
                content_mode: ContentMode::Existing,
                listing_reference: format!("listing-{}", request),
                target_url: "https://shop.example/".to_string(),
            },
            EventRecord::Accept { request },
            EventRecord::SubmitPlacement {
                request,
                url: "https://blog.example/p".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_deposit_ordered_before_dependent_settlement() {
        let engine = Arc::new(AsyncSettlementEngine::new(CommissionPolicy::default()));
        let processor = BatchProcessor::new(Arc::clone(&engine));

        let mut batch = vec![deposit(1, 1000, "pp-1")];
        batch.extend(workflow(1, 1, 2));

        let results = processor.process_batch(batch).await;
        assert!(results.iter().all(|r| r.result.is_ok()));

        assert_eq!(engine.balance_of(1), units(450));
        assert_eq!(engine.balance_of(2), units(350));
        assert_eq!(engine.balance_of(PLATFORM_ACCOUNT), units(200));
    }

    #[tokio::test]
    async fn test_independent_workflows_in_parallel() {
        let engine = Arc::new(AsyncSettlementEngine::new(CommissionPolicy::default()));
        let processor = BatchProcessor::new(Arc::clone(&engine));

        let mut batch = vec![
            deposit(1, 1000, "pp-1"),
            deposit(3, 1000, "pp-2"),
            deposit(5, 1000, "pp-3"),
        ];
        batch.extend(workflow(1, 1, 2));
        batch.extend(workflow(2, 3, 4));
        batch.extend(workflow(3, 5, 6));

        let results = processor.process_batch(batch).await;
        assert!(results.iter().all(|r| r.result.is_ok()));

        for advertiser in [1, 3, 5] {
            assert_eq!(engine.balance_of(advertiser), units(450));
        }
        for publisher in [2, 4, 6] {
            assert_eq!(engine.balance_of(publisher), units(350));
        }
        assert_eq!(engine.balance_of(PLATFORM_ACCOUNT), units(600));
        assert!(engine.reconcile_all().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_events_do_not_stop_batch() {
        let engine = Arc::new(AsyncSettlementEngine::new(CommissionPolicy::default()));
        let processor = BatchProcessor::new(Arc::clone(&engine));

        let batch = vec![
            deposit(1, 1000, "pp-1"),
            deposit(1, 1000, "pp-1"), // duplicate reference
            deposit(2, 500, "pp-2"),
        ];
        let results = processor.process_batch(batch).await;

        let failures = results.iter().filter(|r| r.result.is_err()).count();
        assert_eq!(failures, 1);
        assert_eq!(engine.balance_of(1), units(950));
        assert_eq!(engine.balance_of(2), units(475));
    }

    #[tokio::test]
    async fn test_withdrawal_after_settlement_in_same_batch() {
        let engine = Arc::new(AsyncSettlementEngine::new(CommissionPolicy::default()));
        let processor = BatchProcessor::new(Arc::clone(&engine));

        let mut batch = vec![deposit(1, 1000, "pp-1")];
        batch.extend(workflow(1, 1, 2));
        batch.push(EventRecord::Withdrawal {
            account: 2,
            amount: units(350),
        });

        let results = processor.process_batch(batch).await;
        assert!(results.iter().all(|r| r.result.is_ok()));
        assert_eq!(engine.balance_of(2), Decimal::ZERO);
    }
}

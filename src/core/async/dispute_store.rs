//! Thread-safe dispute storage
//!
//! The concurrent counterpart of
//! [`crate::core::dispute_store::DisputeStore`]. The per-request index
//! entry guard is the serialization point for opening disputes: two
//! parties racing to open against the same request resolve to one
//! dispute and one `ConflictingDispute`.
//!
//! Lock order is always index guard before dispute row; no operation
//! acquires them the other way around.

use crate::types::{
    AccountId, Dispute, DisputeId, DisputeMessage, DisputeStatus, MarketError, RequestId,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrent dispute table with message threads
pub struct AsyncDisputeStore {
    disputes: DashMap<DisputeId, Dispute>,
    by_request: DashMap<RequestId, DisputeId>,
    messages: DashMap<DisputeId, Vec<DisputeMessage>>,
    next_dispute: AtomicU64,
    next_message: AtomicU64,
}

impl AsyncDisputeStore {
    /// Create an empty store
    pub fn new() -> Self {
        AsyncDisputeStore {
            disputes: DashMap::new(),
            by_request: DashMap::new(),
            messages: DashMap::new(),
            next_dispute: AtomicU64::new(1),
            next_message: AtomicU64::new(1),
        }
    }

    /// Open a dispute against a purchase request
    ///
    /// Runs under the request's index entry guard, so the single-active
    /// invariant holds under concurrency.
    pub fn open(
        &self,
        request: RequestId,
        initiator: AccountId,
        respondent: AccountId,
        dispute_type: impl Into<String>,
        description: impl Into<String>,
        evidence: Vec<String>,
    ) -> Result<DisputeId, MarketError> {
        let description = description.into();
        let dispute_type = dispute_type.into();

        // The dispute row is inserted while the index entry guard is
        // held, so a racing open always finds the row behind the index
        let entry = self.by_request.entry(request);
        let id = match &entry {
            Entry::Occupied(occupied) => {
                let existing = *occupied.get();
                let active = self
                    .disputes
                    .get(&existing)
                    .map(|dispute| dispute.status.is_active())
                    .unwrap_or(false);
                if active {
                    return Err(MarketError::ConflictingDispute {
                        request,
                        dispute: existing,
                    });
                }
                self.next_dispute.fetch_add(1, Ordering::Relaxed)
            }
            Entry::Vacant(_) => self.next_dispute.fetch_add(1, Ordering::Relaxed),
        };

        self.disputes.insert(
            id,
            Dispute {
                id,
                request,
                initiator,
                respondent,
                dispute_type,
                description: description.clone(),
                status: DisputeStatus::Open,
                resolution: None,
                resolution_amount: None,
                opened_at: Utc::now(),
                resolved_at: None,
            },
        );

        match entry {
            Entry::Occupied(mut occupied) => {
                occupied.insert(id);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        if !description.is_empty() || !evidence.is_empty() {
            self.push_message(id, initiator, description, evidence);
        }

        Ok(id)
    }

    /// Snapshot of a dispute at the time of the call
    pub fn get(&self, id: DisputeId) -> Option<Dispute> {
        self.disputes.get(&id).map(|row| row.value().clone())
    }

    /// The request's active dispute, if one exists
    pub fn active_for(&self, request: RequestId) -> Option<Dispute> {
        self.latest_for(request)
            .filter(|dispute| dispute.status.is_active())
    }

    /// The request's most recent dispute, active or not
    pub fn latest_for(&self, request: RequestId) -> Option<Dispute> {
        let id = self.by_request.get(&request).map(|row| *row.value())?;
        self.get(id)
    }

    /// Run a guarded mutation against one dispute
    ///
    /// The closure executes under the row's entry lock; racing updates
    /// serialize, so status checks inside the closure are compare-and-
    /// swap.
    pub fn update<T, F>(&self, id: DisputeId, f: F) -> Result<T, MarketError>
    where
        F: FnOnce(&mut Dispute) -> Result<T, MarketError>,
    {
        let mut row = self
            .disputes
            .get_mut(&id)
            .ok_or(MarketError::DisputeNotFound { dispute: id })?;
        f(row.value_mut())
    }

    /// Append a message to a dispute's thread
    pub fn append_message(
        &self,
        dispute: DisputeId,
        author: AccountId,
        body: impl Into<String>,
        evidence: Vec<String>,
    ) -> Result<u64, MarketError> {
        let status = self
            .disputes
            .get(&dispute)
            .ok_or(MarketError::DisputeNotFound { dispute })?
            .status;

        if status == DisputeStatus::Closed {
            return Err(MarketError::invalid_dispute_transition(
                dispute,
                status,
                "append_message",
            ));
        }

        Ok(self.push_message(dispute, author, body.into(), evidence))
    }

    fn push_message(
        &self,
        dispute: DisputeId,
        author: AccountId,
        body: String,
        evidence: Vec<String>,
    ) -> u64 {
        let id = self.next_message.fetch_add(1, Ordering::Relaxed);
        self.messages.entry(dispute).or_default().push(DisputeMessage {
            id,
            dispute,
            author,
            body,
            evidence,
            created_at: Utc::now(),
        });
        id
    }

    /// Snapshot of the dispute's message thread, oldest first
    pub fn messages_for(&self, dispute: DisputeId) -> Vec<DisputeMessage> {
        self.messages
            .get(&dispute)
            .map(|thread| thread.value().clone())
            .unwrap_or_default()
    }
}

impl Default for AsyncDisputeStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Dispute storage
//!
//! Holds disputes, their append-only message threads, and a per-request
//! index that enforces the single-active-dispute invariant: a second
//! dispute cannot be opened while one is `open`, `under_review`, or
//! `escalated`.

use crate::types::{
    AccountId, Dispute, DisputeId, DisputeMessage, DisputeStatus, MarketError, RequestId,
};
use chrono::Utc;
use std::collections::HashMap;

/// In-memory dispute table with message threads
pub struct DisputeStore {
    disputes: HashMap<DisputeId, Dispute>,

    /// Latest dispute per request; combined with the dispute's status
    /// this enforces at most one active dispute per request
    by_request: HashMap<RequestId, DisputeId>,

    messages: HashMap<DisputeId, Vec<DisputeMessage>>,
    next_dispute: DisputeId,
    next_message: u64,
}

impl DisputeStore {
    /// Create an empty store
    pub fn new() -> Self {
        DisputeStore {
            disputes: HashMap::new(),
            by_request: HashMap::new(),
            messages: HashMap::new(),
            next_dispute: 1,
            next_message: 1,
        }
    }

    /// Open a dispute against a purchase request
    ///
    /// Evidence supplied at opening time becomes the first message of the
    /// thread, so it is on the audit trail from the start.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingDispute` if the request already has an active
    /// dispute.
    pub fn open(
        &mut self,
        request: RequestId,
        initiator: AccountId,
        respondent: AccountId,
        dispute_type: impl Into<String>,
        description: impl Into<String>,
        evidence: Vec<String>,
    ) -> Result<DisputeId, MarketError> {
        if let Some(&existing) = self.by_request.get(&request) {
            if self.disputes[&existing].status.is_active() {
                return Err(MarketError::ConflictingDispute {
                    request,
                    dispute: existing,
                });
            }
        }

        let id = self.next_dispute;
        self.next_dispute += 1;

        let description = description.into();
        self.disputes.insert(
            id,
            Dispute {
                id,
                request,
                initiator,
                respondent,
                dispute_type: dispute_type.into(),
                description: description.clone(),
                status: DisputeStatus::Open,
                resolution: None,
                resolution_amount: None,
                opened_at: Utc::now(),
                resolved_at: None,
            },
        );
        self.by_request.insert(request, id);

        if !description.is_empty() || !evidence.is_empty() {
            self.push_message(id, initiator, description, evidence);
        }

        Ok(id)
    }

    /// Look up a dispute by id
    pub fn get(&self, id: DisputeId) -> Option<&Dispute> {
        self.disputes.get(&id)
    }

    /// The request's active dispute, if one exists
    pub fn active_for(&self, request: RequestId) -> Option<&Dispute> {
        self.by_request
            .get(&request)
            .and_then(|id| self.disputes.get(id))
            .filter(|dispute| dispute.status.is_active())
    }

    /// The request's most recent dispute, active or not
    pub fn latest_for(&self, request: RequestId) -> Option<&Dispute> {
        self.by_request
            .get(&request)
            .and_then(|id| self.disputes.get(id))
    }

    /// Run a guarded mutation against one dispute
    ///
    /// # Errors
    ///
    /// Returns `DisputeNotFound` for an unknown id, otherwise whatever
    /// the closure returns.
    pub fn update<T, F>(&mut self, id: DisputeId, f: F) -> Result<T, MarketError>
    where
        F: FnOnce(&mut Dispute) -> Result<T, MarketError>,
    {
        let dispute = self
            .disputes
            .get_mut(&id)
            .ok_or(MarketError::DisputeNotFound { dispute: id })?;
        f(dispute)
    }

    /// Append a message to a dispute's thread
    ///
    /// # Errors
    ///
    /// Returns `DisputeNotFound` for an unknown id and
    /// `InvalidDisputeTransition` once the dispute is closed — the audit
    /// trail is frozen with the dispute.
    pub fn append_message(
        &mut self,
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
        &mut self,
        dispute: DisputeId,
        author: AccountId,
        body: String,
        evidence: Vec<String>,
    ) -> u64 {
        let id = self.next_message;
        self.next_message += 1;
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

    /// The dispute's message thread, oldest first
    pub fn messages_for(&self, dispute: DisputeId) -> &[DisputeMessage] {
        self.messages
            .get(&dispute)
            .map(|thread| thread.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for DisputeStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Replayable marketplace events
//!
//! An [`EventRecord`] is one row of the marketplace event log: a deposit
//! from the payment collector, a lifecycle action on a purchase request,
//! or a dispute action. The replay front-end parses CSV rows into this
//! closed enum and feeds them to a settlement engine.
//!
//! Dispute events are addressed by purchase-request id; the single-active-
//! dispute invariant makes that unambiguous.

use super::account::AccountId;
use super::dispute::ResolutionKind;
use super::request::{ContentMode, RequestId};
use rust_decimal::Decimal;

/// One event from the marketplace log
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    /// Funds received from an external payment collector
    Deposit {
        account: AccountId,
        /// Gross amount collected; the deposit fee comes out of this
        gross: Decimal,
        /// Payment method reported by the collector (opaque)
        method: String,
        /// Collector-side idempotency reference
        reference: String,
    },

    /// Payout to the account owner
    Withdrawal { account: AccountId, amount: Decimal },

    /// Advertiser creates a purchase request
    CreateRequest {
        request: RequestId,
        advertiser: AccountId,
        publisher: AccountId,
        price: Decimal,
        content_mode: ContentMode,
        listing_reference: String,
        target_url: String,
    },

    /// Publisher accepts the pending request
    Accept { request: RequestId },

    /// Publisher declines the pending request
    Reject { request: RequestId },

    /// Advertiser withdraws the pending request
    Cancel { request: RequestId },

    /// Editorial team delivers the article (platform-written content)
    SubmitArticle { request: RequestId, title: String },

    /// Publisher reports the live placement URL
    SubmitPlacement { request: RequestId, url: String },

    /// Either party opens a dispute
    OpenDispute {
        request: RequestId,
        initiator: AccountId,
        dispute_type: String,
    },

    /// Arbitration picks up the open dispute
    BeginReview { request: RequestId },

    /// Arbitration escalates the dispute under review
    Escalate { request: RequestId },

    /// Arbitrator resolves the active dispute
    ResolveDispute {
        request: RequestId,
        resolution: ResolutionKind,
        amount: Option<Decimal>,
    },

    /// Resolved dispute is closed out
    CloseDispute { request: RequestId },
}

impl EventRecord {
    /// Lowercase wire name of the event, as it appears in the log
    pub fn name(&self) -> &'static str {
        match self {
            EventRecord::Deposit { .. } => "deposit",
            EventRecord::Withdrawal { .. } => "withdrawal",
            EventRecord::CreateRequest { .. } => "create_request",
            EventRecord::Accept { .. } => "accept",
            EventRecord::Reject { .. } => "reject",
            EventRecord::Cancel { .. } => "cancel",
            EventRecord::SubmitArticle { .. } => "submit_article",
            EventRecord::SubmitPlacement { .. } => "submit_placement",
            EventRecord::OpenDispute { .. } => "open_dispute",
            EventRecord::BeginReview { .. } => "begin_review",
            EventRecord::Escalate { .. } => "escalate",
            EventRecord::ResolveDispute { .. } => "resolve_dispute",
            EventRecord::CloseDispute { .. } => "close_dispute",
        }
    }

    /// The purchase request this event addresses, if any
    pub fn request(&self) -> Option<RequestId> {
        match self {
            EventRecord::Deposit { .. } | EventRecord::Withdrawal { .. } => None,
            EventRecord::CreateRequest { request, .. }
            | EventRecord::Accept { request }
            | EventRecord::Reject { request }
            | EventRecord::Cancel { request }
            | EventRecord::SubmitArticle { request, .. }
            | EventRecord::SubmitPlacement { request, .. }
            | EventRecord::OpenDispute { request, .. }
            | EventRecord::BeginReview { request }
            | EventRecord::Escalate { request }
            | EventRecord::ResolveDispute { request, .. }
            | EventRecord::CloseDispute { request } => Some(*request),
        }
    }

    /// The account a request-less event acts on, if any
    pub fn account(&self) -> Option<AccountId> {
        match self {
            EventRecord::Deposit { account, .. } | EventRecord::Withdrawal { account, .. } => {
                Some(*account)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let deposit = EventRecord::Deposit {
            account: 1,
            gross: Decimal::new(100000, 2),
            method: "paypal".to_string(),
            reference: "pp-1".to_string(),
        };
        assert_eq!(deposit.name(), "deposit");
        assert_eq!(deposit.request(), None);
        assert_eq!(deposit.account(), Some(1));

        let accept = EventRecord::Accept { request: 9 };
        assert_eq!(accept.name(), "accept");
        assert_eq!(accept.request(), Some(9));
        assert_eq!(accept.account(), None);
    }
}

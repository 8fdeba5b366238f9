//! Dispute lifecycle and resolution types
//!
//! A dispute is a parallel state machine keyed to a purchase request, at
//! most one active at a time. Its terminal resolution feeds back into the
//! balance service (refund, compensation, commission reversal) and may
//! force-terminate the purchase request.

use super::account::AccountId;
use super::ledger::EntryId;
use super::request::RequestId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Dispute identifier
pub type DisputeId = u64;

/// Dispute lifecycle
///
/// ```text
/// Open ──> UnderReview ──> Resolved ──> Closed
///               └────────> Escalated ──> Resolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    Closed,
    Escalated,
}

impl DisputeStatus {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Closed => "closed",
            DisputeStatus::Escalated => "escalated",
        }
    }

    /// True while the dispute blocks a second dispute on the same request
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DisputeStatus::Open | DisputeStatus::UnderReview | DisputeStatus::Escalated
        )
    }

    /// States from which an arbitrator may resolve
    pub fn resolvable(&self) -> bool {
        self.is_active()
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal resolution chosen by the arbitrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// Full price back to the advertiser; any posted publisher commission
    /// is reversed
    RefundFull,

    /// A fixed amount back to the advertiser; publisher commission stands
    RefundPartial,

    /// Publisher owes a new placement; no money moves
    Replacement,

    /// A fixed amount to the initiating party; counterpart untouched
    Compensation,

    /// No merit; no money moves
    Dismissed,
}

impl ResolutionKind {
    /// Lowercase wire name, as used in replay logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionKind::RefundFull => "refund_full",
            ResolutionKind::RefundPartial => "refund_partial",
            ResolutionKind::Replacement => "replacement",
            ResolutionKind::Compensation => "compensation",
            ResolutionKind::Dismissed => "dismissed",
        }
    }

    /// Parse the wire name used in replay logs
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refund_full" => Some(ResolutionKind::RefundFull),
            "refund_partial" => Some(ResolutionKind::RefundPartial),
            "replacement" => Some(ResolutionKind::Replacement),
            "compensation" => Some(ResolutionKind::Compensation),
            "dismissed" => Some(ResolutionKind::Dismissed),
            _ => None,
        }
    }

    /// Resolutions that need an explicit amount from the arbitrator
    pub fn requires_amount(&self) -> bool {
        matches!(
            self,
            ResolutionKind::RefundPartial | ResolutionKind::Compensation
        )
    }
}

/// One dispute over one purchase request
#[derive(Debug, Clone, PartialEq)]
pub struct Dispute {
    pub id: DisputeId,
    pub request: RequestId,

    /// Party that opened the dispute
    pub initiator: AccountId,

    /// The other side of the purchase request
    pub respondent: AccountId,

    /// Opaque category supplied by the initiator (stored, not validated)
    pub dispute_type: String,

    pub description: String,
    pub status: DisputeStatus,
    pub resolution: Option<ResolutionKind>,
    pub resolution_amount: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Append-only thread entry tied to a dispute
///
/// Transport is delegated to the conversation gateway; the core keeps the
/// entries so evidence-bearing messages stay on the resolution audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct DisputeMessage {
    pub id: u64,
    pub dispute: DisputeId,
    pub author: AccountId,
    pub body: String,
    pub evidence: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// What happened to a previously posted publisher commission during a
/// full-refund resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ReversalOutcome {
    /// Commission debited back from the publisher
    Reversed { entry: EntryId },

    /// Publisher balance could not cover the reversal; the advertiser
    /// refund still went through and the shortfall is an administrative
    /// follow-up
    Shortfall { missing: Decimal },

    /// The resolution did not call for a reversal
    NotApplicable,
}

/// Result of resolving a dispute, including every ledger effect applied
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    pub dispute: DisputeId,
    pub resolution: ResolutionKind,

    /// Refund or compensation entry credited by the resolution, if any
    pub refund: Option<EntryId>,

    pub reversal: ReversalOutcome,
}

//! Purchase-request lifecycle types
//!
//! A purchase request is one advertiser's offer to place a link on a
//! publisher's site. Its primary lifecycle is the closed [`RequestStatus`]
//! enum; platform-written content additionally tracks an article
//! sub-lifecycle through the [`ArticleStage`] overlay.

use super::account::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Purchase request identifier
pub type RequestId = u64;

/// How the placed content is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    /// Link goes into an existing article on the publisher's site
    Existing,

    /// The platform's editorial team writes the article
    PlatformWritten,

    /// The advertiser supplies the article
    Custom,
}

impl ContentMode {
    /// Lowercase wire name, as used in replay logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentMode::Existing => "existing",
            ContentMode::PlatformWritten => "platform_written",
            ContentMode::Custom => "custom",
        }
    }

    /// Parse the wire name used in replay logs
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "existing" => Some(ContentMode::Existing),
            "platform_written" => Some(ContentMode::PlatformWritten),
            "custom" => Some(ContentMode::Custom),
            _ => None,
        }
    }
}

/// Primary lifecycle of a purchase request
///
/// Transitions are owned exclusively by the settlement engine; no caller
/// mutates the status directly.
///
/// ```text
/// Pending ── accept (existing/custom) ──────────> PlacementPendingDirect
/// Pending ── accept (platform_written) ─────────> AcceptedWaitingArticle
/// AcceptedWaitingArticle ── submit_article ─────> ArticleReady
/// ArticleReady ── submit_placement ─────────────> PlacementCompleted
/// PlacementPendingDirect ── submit_placement ───> PlacementCompleted
/// Pending ── reject ────────────────────────────> Rejected
/// Pending ── cancel ────────────────────────────> Cancelled
/// PlacementCompleted ── full refund resolution ─> Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Created by the advertiser, awaiting the publisher's decision
    Pending,

    /// Accepted; publisher places the link directly (existing/custom content)
    PlacementPendingDirect,

    /// Accepted; waiting for the editorial team to write the article
    AcceptedWaitingArticle,

    /// Article written; publisher places it
    ArticleReady,

    /// Link is live and the commission has been settled
    PlacementCompleted,

    /// Publisher declined the offer
    Rejected,

    /// Advertiser withdrew the offer
    Cancelled,

    /// A dispute resolution refunded the full price
    Refunded,
}

impl RequestStatus {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::PlacementPendingDirect => "placement_pending_direct",
            RequestStatus::AcceptedWaitingArticle => "accepted_waiting_article",
            RequestStatus::ArticleReady => "article_ready",
            RequestStatus::PlacementCompleted => "placement_completed",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Refunded => "refunded",
        }
    }

    /// True for states with no outgoing transitions other than the
    /// dispute-forced refund
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Rejected
                | RequestStatus::Cancelled
                | RequestStatus::PlacementCompleted
                | RequestStatus::Refunded
        )
    }

    /// States from which `submit_placement` is a legal transition
    pub fn accepts_placement(&self) -> bool {
        matches!(
            self,
            RequestStatus::PlacementPendingDirect | RequestStatus::ArticleReady
        )
    }

    /// States in which either party may open a dispute
    ///
    /// Everything after acceptance and before a failure-terminal state:
    /// the request is accepted (work owed) or completed (work delivered).
    pub fn dispute_eligible(&self) -> bool {
        matches!(
            self,
            RequestStatus::PlacementPendingDirect
                | RequestStatus::AcceptedWaitingArticle
                | RequestStatus::ArticleReady
                | RequestStatus::PlacementCompleted
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Article sub-lifecycle overlay, used only for platform-written content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStage {
    /// Waiting for the editorial team
    AwaitingArticle,

    /// Article delivered, ready for placement
    ArticleReady,
}

/// Editorial article payload attached at submission time
///
/// The core stores and surfaces these attributes; it does not validate
/// them semantically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub body: String,
    pub keywords: Vec<String>,
    pub writer: String,
}

/// Parameters for creating a purchase request
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub advertiser: AccountId,
    pub publisher: AccountId,
    pub listing_reference: String,
    pub anchor_text: String,
    pub target_url: String,
    pub price: Decimal,
    pub duration_days: u32,
    pub content_mode: ContentMode,
}

/// One advertiser→publisher transaction
///
/// Created by the advertiser; status mutated only through the settlement
/// engine's validated entry points. Never destroyed — terminal states are
/// `Rejected`, `Cancelled`, `PlacementCompleted`, or the dispute-forced
/// `Refunded`.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub id: RequestId,
    pub advertiser: AccountId,
    pub publisher: AccountId,

    /// Opaque reference into the listing catalog (external subsystem)
    pub listing_reference: String,

    pub anchor_text: String,
    pub target_url: String,

    /// Agreed price, paid in full by the advertiser at placement time
    pub price: Decimal,

    /// Agreed placement duration
    pub duration_days: u32,

    pub content_mode: ContentMode,
    pub status: RequestStatus,

    /// Article sub-lifecycle; populated only for platform-written content
    pub extended: Option<ArticleStage>,

    /// Editorial payload, attached when the article is submitted
    pub article: Option<Article>,

    /// Live URL of the placement, set exactly once on completion
    pub placed_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub placed_at: Option<DateTime<Utc>>,
}

impl PurchaseRequest {
    /// Build a fresh `Pending` request from creation parameters
    pub fn new(id: RequestId, spec: NewRequest) -> Self {
        PurchaseRequest {
            id,
            advertiser: spec.advertiser,
            publisher: spec.publisher,
            listing_reference: spec.listing_reference,
            anchor_text: spec.anchor_text,
            target_url: spec.target_url,
            price: spec.price,
            duration_days: spec.duration_days,
            content_mode: spec.content_mode,
            status: RequestStatus::Pending,
            extended: None,
            article: None,
            placed_url: None,
            created_at: Utc::now(),
            responded_at: None,
            placed_at: None,
        }
    }
}

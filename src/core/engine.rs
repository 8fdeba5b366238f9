//! Settlement engine
//!
//! This module provides the `SettlementEngine`, which owns every
//! transition of the purchase-request lifecycle and every ledger effect
//! those transitions produce. All mutations go through the engine's
//! validated entry points; no caller can skip a status or post a
//! commission twice.
//!
//! The engine coordinates:
//! - the [`LedgerBook`] (balances, entries, settlement postings)
//! - the [`RequestStore`] (purchase-request rows and transitions)
//! - the [`DisputeStore`] (disputes, threads, the single-active invariant)
//! - the [`CommissionPolicy`] (pure split calculations)
//! - outbound lifecycle sinks (fire-and-forget, never rolled back)

use crate::core::commission::{CommissionPolicy, DepositSplit};
use crate::core::dispute_store::DisputeStore;
use crate::core::ledger_book::{LedgerBook, SettlementEntries};
use crate::core::notify::{emit, LifecycleSink, Notification, NullSink};
use crate::core::request_store::RequestStore;
use crate::types::{
    AccountId, ArticleStage, BalanceSnapshot, ContentMode, Dispute, DisputeId, DisputeStatus,
    EntryDirection, EntryId, EntryKind, EventRecord, LedgerEntry, MarketError, NewRequest,
    PurchaseRequest, RequestId, RequestStatus, ResolutionKind, ResolutionOutcome, ReversalOutcome,
    PLATFORM_ACCOUNT,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Check that a string is a well-formed absolute http(s) URL
pub(crate) fn validate_absolute_url(raw: &str) -> Result<(), MarketError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| MarketError::validation(format!("'{}' is not a valid URL: {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(MarketError::validation(format!(
            "'{}' is not an absolute http(s) URL",
            raw
        )));
    }
    Ok(())
}

/// Single-threaded settlement engine
///
/// Operations take `&mut self`; callers that need true parallelism use
/// the `core::async` variant, which provides the same semantics over
/// shared state.
pub struct SettlementEngine {
    policy: CommissionPolicy,
    ledger: LedgerBook,
    requests: RequestStore,
    disputes: DisputeStore,

    /// Idempotency references of deposits already applied
    applied_deposits: HashSet<String>,

    conversations: Arc<dyn LifecycleSink>,
    notifications: Arc<dyn LifecycleSink>,
}

impl SettlementEngine {
    /// Create an engine with the default commission policy and no wired
    /// gateways
    pub fn new() -> Self {
        Self::with_policy(CommissionPolicy::default())
    }

    /// Create an engine with an explicit commission policy
    pub fn with_policy(policy: CommissionPolicy) -> Self {
        SettlementEngine {
            policy,
            ledger: LedgerBook::new(),
            requests: RequestStore::new(),
            disputes: DisputeStore::new(),
            applied_deposits: HashSet::new(),
            conversations: Arc::new(NullSink),
            notifications: Arc::new(NullSink),
        }
    }

    /// Wire the conversation gateway
    pub fn set_conversation_sink(&mut self, sink: Arc<dyn LifecycleSink>) {
        self.conversations = sink;
    }

    /// Wire the notification/email fan-out
    pub fn set_notification_sink(&mut self, sink: Arc<dyn LifecycleSink>) {
        self.notifications = sink;
    }

    /// Process one replayed marketplace event
    ///
    /// Routes the event to the matching typed operation. Actors are
    /// derived from the stored request (the log is the authenticated
    /// record; per-call actor checks matter for the direct API).
    pub fn process(&mut self, event: EventRecord) -> Result<(), MarketError> {
        match event {
            EventRecord::Deposit {
                account,
                gross,
                method,
                reference,
            } => self
                .register_deposit(account, gross, &method, &reference)
                .map(|_| ()),
            EventRecord::Withdrawal { account, amount } => {
                self.withdraw(account, amount).map(|_| ())
            }
            EventRecord::CreateRequest {
                request,
                advertiser,
                publisher,
                price,
                content_mode,
                listing_reference,
                target_url,
            } => self.create_request(
                request,
                NewRequest {
                    advertiser,
                    publisher,
                    listing_reference,
                    anchor_text: String::new(),
                    target_url,
                    price,
                    duration_days: 0,
                    content_mode,
                },
            ),
            EventRecord::Accept { request } => {
                let publisher = self.publisher_of(request)?;
                self.accept(request, publisher).map(|_| ())
            }
            EventRecord::Reject { request } => {
                let publisher = self.publisher_of(request)?;
                self.reject(request, publisher)
            }
            EventRecord::Cancel { request } => {
                let advertiser = self.advertiser_of(request)?;
                self.cancel(request, advertiser)
            }
            EventRecord::SubmitArticle { request, title } => self.submit_article(
                request,
                crate::types::Article {
                    title,
                    body: String::new(),
                    keywords: Vec::new(),
                    writer: String::new(),
                },
            ),
            EventRecord::SubmitPlacement { request, url } => {
                let publisher = self.publisher_of(request)?;
                self.submit_placement_url(request, &url, publisher)
                    .map(|_| ())
            }
            EventRecord::OpenDispute {
                request,
                initiator,
                dispute_type,
            } => self
                .open_dispute(request, initiator, &dispute_type, "", Vec::new())
                .map(|_| ()),
            EventRecord::BeginReview { request } => {
                let dispute = self.active_dispute_id(request)?;
                self.begin_review(dispute)
            }
            EventRecord::Escalate { request } => {
                let dispute = self.active_dispute_id(request)?;
                self.escalate(dispute)
            }
            EventRecord::ResolveDispute {
                request,
                resolution,
                amount,
            } => {
                let dispute = self.active_dispute_id(request)?;
                self.resolve_dispute(dispute, resolution, amount).map(|_| ())
            }
            EventRecord::CloseDispute { request } => {
                let dispute = self
                    .disputes
                    .latest_for(request)
                    .map(|d| d.id)
                    .ok_or(MarketError::NoActiveDispute { request })?;
                self.close_dispute(dispute)
            }
        }
    }

    // ---- balance operations -------------------------------------------

    /// Apply a funds-received event from the payment collector
    ///
    /// Splits the gross amount per the commission policy, credits the
    /// account with the net and books the fee to the platform account.
    /// Idempotent on `reference`: a replayed reference fails with
    /// `DuplicateDeposit` and has no ledger effect.
    pub fn register_deposit(
        &mut self,
        account: AccountId,
        gross: Decimal,
        method: &str,
        reference: &str,
    ) -> Result<DepositSplit, MarketError> {
        if account == PLATFORM_ACCOUNT {
            return Err(MarketError::validation(
                "cannot deposit into the platform account",
            ));
        }
        if reference.is_empty() {
            return Err(MarketError::validation(
                "deposit reference must not be empty",
            ));
        }
        if gross <= Decimal::ZERO {
            return Err(MarketError::validation(format!(
                "deposit amount must be positive, got {}",
                gross
            )));
        }
        if self.applied_deposits.contains(reference) {
            return Err(MarketError::DuplicateDeposit {
                reference: reference.to_string(),
            });
        }

        let split = self.policy.deposit_split(gross);
        if split.credited > Decimal::ZERO {
            self.ledger.credit(
                account,
                split.credited,
                EntryKind::Deposit,
                format!("deposit via {} ({})", method, reference),
                None,
            )?;
        }
        if split.platform_fee > Decimal::ZERO {
            self.ledger.credit(
                PLATFORM_ACCOUNT,
                split.platform_fee,
                EntryKind::Commission,
                format!("deposit fee ({})", reference),
                None,
            )?;
        }
        self.applied_deposits.insert(reference.to_string());

        debug!(account, gross = %gross, credited = %split.credited, "deposit applied");
        Ok(split)
    }

    /// Pay out part of an account's balance
    pub fn withdraw(&mut self, account: AccountId, amount: Decimal) -> Result<EntryId, MarketError> {
        self.ledger.debit(
            account,
            amount,
            EntryKind::Withdrawal,
            "withdrawal payout",
            None,
        )
    }

    // ---- purchase-request lifecycle -----------------------------------

    /// Create a purchase request in `Pending`
    ///
    /// No ledger effect: funds move at placement confirmation, not at
    /// creation or acceptance.
    pub fn create_request(&mut self, id: RequestId, spec: NewRequest) -> Result<(), MarketError> {
        if spec.advertiser == spec.publisher {
            return Err(MarketError::validation(
                "advertiser and publisher must be different accounts",
            ));
        }
        if spec.advertiser == PLATFORM_ACCOUNT || spec.publisher == PLATFORM_ACCOUNT {
            return Err(MarketError::validation(
                "the platform account cannot be a party to a request",
            ));
        }
        if spec.price <= Decimal::ZERO {
            return Err(MarketError::validation(format!(
                "price must be positive, got {}",
                spec.price
            )));
        }
        validate_absolute_url(&spec.target_url)?;

        self.requests.insert(PurchaseRequest::new(id, spec))
    }

    /// Publisher accepts a pending request
    ///
    /// Branches on content mode: existing/custom content goes straight to
    /// direct placement; platform-written content waits for the editorial
    /// team. No ledger effect at this step.
    pub fn accept(
        &mut self,
        id: RequestId,
        actor: AccountId,
    ) -> Result<RequestStatus, MarketError> {
        let (status, advertiser, publisher) = self.requests.transition(id, |request| {
            if actor != request.publisher {
                return Err(MarketError::actor_mismatch(
                    id,
                    request.publisher,
                    actor,
                    "accept",
                ));
            }
            if request.status != RequestStatus::Pending {
                return Err(MarketError::invalid_transition(id, request.status, "accept"));
            }

            request.status = match request.content_mode {
                ContentMode::PlatformWritten => {
                    request.extended = Some(ArticleStage::AwaitingArticle);
                    RequestStatus::AcceptedWaitingArticle
                }
                ContentMode::Existing | ContentMode::Custom => {
                    RequestStatus::PlacementPendingDirect
                }
            };
            request.responded_at = Some(Utc::now());
            Ok((request.status, request.advertiser, request.publisher))
        })?;

        emit(
            &*self.conversations,
            Notification::RequestAccepted {
                request: id,
                advertiser,
                publisher,
            },
        );
        emit(
            &*self.notifications,
            Notification::StatusChanged {
                request: id,
                status,
            },
        );
        Ok(status)
    }

    /// Publisher declines a pending request
    pub fn reject(&mut self, id: RequestId, actor: AccountId) -> Result<(), MarketError> {
        self.requests.transition(id, |request| {
            if actor != request.publisher {
                return Err(MarketError::actor_mismatch(
                    id,
                    request.publisher,
                    actor,
                    "reject",
                ));
            }
            if request.status != RequestStatus::Pending {
                return Err(MarketError::invalid_transition(id, request.status, "reject"));
            }
            request.status = RequestStatus::Rejected;
            request.responded_at = Some(Utc::now());
            Ok(())
        })?;

        emit(
            &*self.notifications,
            Notification::StatusChanged {
                request: id,
                status: RequestStatus::Rejected,
            },
        );
        Ok(())
    }

    /// Advertiser withdraws a pending request
    ///
    /// Always a no-penalty, synchronous exit. Under the debit-at-placement
    /// policy no funds were reserved at creation, so there is nothing to
    /// release.
    pub fn cancel(&mut self, id: RequestId, actor: AccountId) -> Result<(), MarketError> {
        self.requests.transition(id, |request| {
            if actor != request.advertiser {
                return Err(MarketError::actor_mismatch(
                    id,
                    request.advertiser,
                    actor,
                    "cancel",
                ));
            }
            if request.status != RequestStatus::Pending {
                return Err(MarketError::invalid_transition(id, request.status, "cancel"));
            }
            request.status = RequestStatus::Cancelled;
            request.responded_at = Some(Utc::now());
            Ok(())
        })?;

        emit(
            &*self.notifications,
            Notification::StatusChanged {
                request: id,
                status: RequestStatus::Cancelled,
            },
        );
        Ok(())
    }

    /// Editorial team delivers the article for platform-written content
    pub fn submit_article(
        &mut self,
        id: RequestId,
        article: crate::types::Article,
    ) -> Result<(), MarketError> {
        self.requests.transition(id, |request| {
            if request.status != RequestStatus::AcceptedWaitingArticle {
                return Err(MarketError::invalid_transition(
                    id,
                    request.status,
                    "submit_article",
                ));
            }
            request.status = RequestStatus::ArticleReady;
            request.extended = Some(ArticleStage::ArticleReady);
            request.article = Some(article);
            Ok(())
        })?;

        emit(
            &*self.notifications,
            Notification::StatusChanged {
                request: id,
                status: RequestStatus::ArticleReady,
            },
        );
        Ok(())
    }

    /// Publisher reports the live placement URL; settles the commission
    ///
    /// Exactly once: the advertiser is debited the full price and the
    /// publisher share plus platform fee are credited, all or nothing. A
    /// second call on a completed request fails with `AlreadyFinalized`
    /// and performs no ledger effect, which keeps client retries safe.
    pub fn submit_placement_url(
        &mut self,
        id: RequestId,
        url: &str,
        actor: AccountId,
    ) -> Result<SettlementEntries, MarketError> {
        let request = self
            .requests
            .get(id)
            .ok_or(MarketError::RequestNotFound { request: id })?;

        if actor != request.publisher {
            return Err(MarketError::actor_mismatch(
                id,
                request.publisher,
                actor,
                "submit_placement",
            ));
        }
        match request.status {
            RequestStatus::PlacementCompleted | RequestStatus::Refunded => {
                return Err(MarketError::AlreadyFinalized { request: id });
            }
            status if !status.accepts_placement() => {
                return Err(MarketError::invalid_transition(
                    id,
                    status,
                    "submit_placement",
                ));
            }
            _ => {}
        }
        validate_absolute_url(url)?;

        let (advertiser, publisher, price) =
            (request.advertiser, request.publisher, request.price);
        let split = self.policy.settlement_split(price);

        // All-or-nothing; InsufficientFunds leaves the request untouched
        let entries = self
            .ledger
            .post_settlement(advertiser, publisher, price, &split, id)?;

        self.requests.transition(id, |request| {
            request.status = RequestStatus::PlacementCompleted;
            request.placed_url = Some(url.to_string());
            request.placed_at = Some(Utc::now());
            Ok(())
        })?;

        debug!(
            request = id,
            %price,
            publisher_share = %split.publisher_share,
            platform_fee = %split.platform_fee,
            "placement settled"
        );
        emit(
            &*self.conversations,
            Notification::PlacementSubmitted {
                request: id,
                advertiser,
                publisher,
            },
        );
        emit(
            &*self.notifications,
            Notification::StatusChanged {
                request: id,
                status: RequestStatus::PlacementCompleted,
            },
        );
        Ok(entries)
    }

    // ---- disputes ------------------------------------------------------

    /// Open a dispute against a request
    ///
    /// Allowed to either party while the request is accepted or
    /// completed; at most one active dispute per request.
    pub fn open_dispute(
        &mut self,
        id: RequestId,
        initiator: AccountId,
        dispute_type: &str,
        description: &str,
        evidence: Vec<String>,
    ) -> Result<DisputeId, MarketError> {
        let request = self
            .requests
            .get(id)
            .ok_or(MarketError::RequestNotFound { request: id })?;

        let respondent = if initiator == request.advertiser {
            request.publisher
        } else if initiator == request.publisher {
            request.advertiser
        } else {
            return Err(MarketError::validation(format!(
                "account {} is not a party to request {}",
                initiator, id
            )));
        };
        if !request.status.dispute_eligible() {
            return Err(MarketError::invalid_transition(
                id,
                request.status,
                "open_dispute",
            ));
        }

        self.disputes.open(
            id,
            initiator,
            respondent,
            dispute_type,
            description,
            evidence,
        )
    }

    /// Arbitration picks up an open dispute
    pub fn begin_review(&mut self, dispute: DisputeId) -> Result<(), MarketError> {
        self.disputes.update(dispute, |d| {
            if d.status != DisputeStatus::Open {
                return Err(MarketError::invalid_dispute_transition(
                    dispute,
                    d.status,
                    "begin_review",
                ));
            }
            d.status = DisputeStatus::UnderReview;
            Ok(())
        })
    }

    /// Escalate a dispute under review
    pub fn escalate(&mut self, dispute: DisputeId) -> Result<(), MarketError> {
        self.disputes.update(dispute, |d| {
            if d.status != DisputeStatus::UnderReview {
                return Err(MarketError::invalid_dispute_transition(
                    dispute,
                    d.status,
                    "escalate",
                ));
            }
            d.status = DisputeStatus::Escalated;
            Ok(())
        })
    }

    /// Arbitrator resolves a dispute; the resolution is terminal
    ///
    /// Side effects by resolution kind:
    /// - `RefundFull`: the advertiser gets the full price back if it was
    ///   charged; a posted publisher commission is reversed. A reversal
    ///   the publisher's balance cannot cover is flagged as a shortfall —
    ///   logged and carried in the outcome, never blocking the refund.
    ///   The request is forced to `Refunded`.
    /// - `RefundPartial`: the advertiser is credited `amount`; the
    ///   publisher commission stands and the request stays
    ///   `PlacementCompleted`.
    /// - `Compensation`: the initiating party is credited `amount`.
    /// - `Replacement` / `Dismissed`: no ledger effect.
    pub fn resolve_dispute(
        &mut self,
        dispute: DisputeId,
        resolution: ResolutionKind,
        amount: Option<Decimal>,
    ) -> Result<ResolutionOutcome, MarketError> {
        let (request_id, initiator, status) = {
            let d = self
                .disputes
                .get(dispute)
                .ok_or(MarketError::DisputeNotFound { dispute })?;
            (d.request, d.initiator, d.status)
        };
        if !status.resolvable() {
            return Err(MarketError::invalid_dispute_transition(
                dispute, status, "resolve",
            ));
        }
        let awarded = if resolution.requires_amount() {
            match amount {
                Some(value) if value > Decimal::ZERO => Some(value),
                _ => {
                    return Err(MarketError::validation(format!(
                        "resolution {} requires a positive amount",
                        resolution.as_str()
                    )));
                }
            }
        } else {
            None
        };

        let (advertiser, publisher, price, request_status) = {
            let request = self
                .requests
                .get(request_id)
                .ok_or(MarketError::RequestNotFound {
                    request: request_id,
                })?;
            (
                request.advertiser,
                request.publisher,
                request.price,
                request.status,
            )
        };

        let mut refund = None;
        let mut reversal = ReversalOutcome::NotApplicable;

        match resolution {
            ResolutionKind::RefundFull => {
                // Funds only moved if the placement settled; before that
                // the advertiser was never charged
                if request_status == RequestStatus::PlacementCompleted {
                    refund = Some(self.ledger.credit(
                        advertiser,
                        price,
                        EntryKind::Refund,
                        format!("full refund for request {}", request_id),
                        Some(request_id),
                    )?);
                    reversal = self.reverse_commission(request_id, publisher)?;
                }
            }
            ResolutionKind::RefundPartial => {
                if let Some(value) = awarded {
                    refund = Some(self.ledger.credit(
                        advertiser,
                        value,
                        EntryKind::Refund,
                        format!("partial refund for request {}", request_id),
                        Some(request_id),
                    )?);
                }
            }
            ResolutionKind::Compensation => {
                if let Some(value) = awarded {
                    refund = Some(self.ledger.credit(
                        initiator,
                        value,
                        EntryKind::Refund,
                        format!("dispute compensation for request {}", request_id),
                        Some(request_id),
                    )?);
                }
            }
            ResolutionKind::Replacement | ResolutionKind::Dismissed => {}
        }

        self.disputes.update(dispute, |d| {
            d.status = DisputeStatus::Resolved;
            d.resolution = Some(resolution);
            d.resolution_amount = amount;
            d.resolved_at = Some(Utc::now());
            Ok(())
        })?;

        if resolution == ResolutionKind::RefundFull {
            self.requests.transition(request_id, |request| {
                request.status = RequestStatus::Refunded;
                Ok(())
            })?;
            emit(
                &*self.notifications,
                Notification::StatusChanged {
                    request: request_id,
                    status: RequestStatus::Refunded,
                },
            );
        }
        emit(
            &*self.notifications,
            Notification::DisputeResolved {
                request: request_id,
                dispute,
                resolution,
            },
        );

        Ok(ResolutionOutcome {
            dispute,
            resolution,
            refund,
            reversal,
        })
    }

    /// Debit back the commission previously credited to the publisher
    ///
    /// An `InsufficientFunds` failure here is reported as a shortfall,
    /// not an error: the advertiser refund has already been applied and
    /// the missing amount becomes an administrative follow-up.
    fn reverse_commission(
        &mut self,
        request: RequestId,
        publisher: AccountId,
    ) -> Result<ReversalOutcome, MarketError> {
        let posted = self
            .ledger
            .entries_for(publisher)
            .iter()
            .rev()
            .find(|entry| {
                entry.request == Some(request)
                    && entry.kind == EntryKind::Commission
                    && entry.direction == EntryDirection::Credit
            })
            .map(|entry| entry.amount);

        let Some(amount) = posted else {
            return Ok(ReversalOutcome::NotApplicable);
        };

        match self.ledger.debit(
            publisher,
            amount,
            EntryKind::Refund,
            format!("commission reversal for request {}", request),
            Some(request),
        ) {
            Ok(entry) => Ok(ReversalOutcome::Reversed { entry }),
            Err(MarketError::InsufficientFunds { balance, .. }) => {
                let missing = amount - balance;
                warn!(
                    publisher,
                    request,
                    %amount,
                    %missing,
                    "commission reversal shortfall; escalating for recovery"
                );
                Ok(ReversalOutcome::Shortfall { missing })
            }
            Err(other) => Err(other),
        }
    }

    /// Close out a resolved dispute
    pub fn close_dispute(&mut self, dispute: DisputeId) -> Result<(), MarketError> {
        self.disputes.update(dispute, |d| {
            if d.status != DisputeStatus::Resolved {
                return Err(MarketError::invalid_dispute_transition(
                    dispute,
                    d.status,
                    "close",
                ));
            }
            d.status = DisputeStatus::Closed;
            Ok(())
        })
    }

    /// Append a message to a dispute thread
    pub fn post_dispute_message(
        &mut self,
        dispute: DisputeId,
        author: AccountId,
        body: &str,
        evidence: Vec<String>,
    ) -> Result<u64, MarketError> {
        self.disputes.append_message(dispute, author, body, evidence)
    }

    // ---- reads ---------------------------------------------------------

    /// Cached balance of an account
    pub fn balance_of(&self, account: AccountId) -> Decimal {
        self.ledger.balance_of(account)
    }

    /// Ledger entries of an account, oldest first
    pub fn entries_for(&self, account: AccountId) -> &[LedgerEntry] {
        self.ledger.entries_for(account)
    }

    /// Balance snapshots for every touched account
    pub fn snapshots(&self) -> Vec<BalanceSnapshot> {
        self.ledger.snapshots()
    }

    /// Accounts whose cached balance disagrees with the ledger aggregate
    pub fn reconcile_all(&self) -> Vec<AccountId> {
        self.ledger.reconcile_all()
    }

    /// Look up a purchase request
    pub fn request(&self, id: RequestId) -> Option<&PurchaseRequest> {
        self.requests.get(id)
    }

    /// Look up a dispute
    pub fn dispute(&self, id: DisputeId) -> Option<&Dispute> {
        self.disputes.get(id)
    }

    /// The request's active dispute, if any
    pub fn active_dispute_for(&self, request: RequestId) -> Option<&Dispute> {
        self.disputes.active_for(request)
    }

    fn active_dispute_id(&self, request: RequestId) -> Result<DisputeId, MarketError> {
        self.disputes
            .active_for(request)
            .map(|d| d.id)
            .ok_or(MarketError::NoActiveDispute { request })
    }

    fn publisher_of(&self, request: RequestId) -> Result<AccountId, MarketError> {
        self.requests
            .get(request)
            .map(|r| r.publisher)
            .ok_or(MarketError::RequestNotFound { request })
    }

    fn advertiser_of(&self, request: RequestId) -> Result<AccountId, MarketError> {
        self.requests
            .get(request)
            .map(|r| r.advertiser)
            .ok_or(MarketError::RequestNotFound { request })
    }
}

impl Default for SettlementEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notify::{FailingSink, RecordingSink};
    use crate::types::Article;

    fn units(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn spec(advertiser: AccountId, publisher: AccountId, price: i64) -> NewRequest {
        NewRequest {
            advertiser,
            publisher,
            listing_reference: "listing-1".to_string(),
            anchor_text: "widgets".to_string(),
            target_url: "https://shop.example/widgets".to_string(),
            price: units(price),
            duration_days: 365,
            content_mode: ContentMode::Existing,
        }
    }

    /// deposit → create → accept → placement, ready for dispute tests
    fn engine_with_completed_placement() -> SettlementEngine {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(2000), "paypal", "pp-1").unwrap();
        engine.create_request(10, spec(1, 2, 1000)).unwrap();
        engine.accept(10, 2).unwrap();
        engine
            .submit_placement_url(10, "https://blog.example/post", 2)
            .unwrap();
        engine
    }

    #[test]
    fn test_register_deposit_splits_fee() {
        let mut engine = SettlementEngine::new();

        let split = engine
            .register_deposit(1, units(1000), "paypal", "pp-1")
            .unwrap();

        assert_eq!(split.credited, units(950));
        assert_eq!(split.platform_fee, units(50));
        assert_eq!(engine.balance_of(1), units(950));
        assert_eq!(engine.balance_of(PLATFORM_ACCOUNT), units(50));
    }

    #[test]
    fn test_register_deposit_duplicate_reference_is_noop() {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();

        let result = engine.register_deposit(1, units(1000), "paypal", "pp-1");

        assert!(matches!(result, Err(MarketError::DuplicateDeposit { .. })));
        assert_eq!(engine.balance_of(1), units(950));
        assert_eq!(engine.balance_of(PLATFORM_ACCOUNT), units(50));
        assert_eq!(engine.entries_for(1).len(), 1);
    }

    #[test]
    fn test_register_deposit_validations() {
        let mut engine = SettlementEngine::new();

        assert!(matches!(
            engine.register_deposit(PLATFORM_ACCOUNT, units(100), "paypal", "pp-1"),
            Err(MarketError::Validation { .. })
        ));
        assert!(matches!(
            engine.register_deposit(1, units(0), "paypal", "pp-2"),
            Err(MarketError::Validation { .. })
        ));
        assert!(matches!(
            engine.register_deposit(1, units(100), "paypal", ""),
            Err(MarketError::Validation { .. })
        ));
    }

    #[test]
    fn test_small_deposit_has_no_fee_entry() {
        let mut engine = SettlementEngine::new();

        // 5% of 9 rounds to 0; the whole amount is credited
        let split = engine.register_deposit(1, units(9), "stripe", "st-1").unwrap();

        assert_eq!(split.platform_fee, Decimal::ZERO);
        assert_eq!(engine.balance_of(1), units(9));
        assert_eq!(engine.entries_for(PLATFORM_ACCOUNT).len(), 0);
    }

    #[test]
    fn test_withdraw_requires_funds() {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();

        engine.withdraw(1, units(400)).unwrap();
        assert_eq!(engine.balance_of(1), units(550));

        let result = engine.withdraw(1, units(600));
        assert!(matches!(
            result,
            Err(MarketError::InsufficientFunds { .. })
        ));
        assert_eq!(engine.balance_of(1), units(550));
    }

    #[test]
    fn test_create_request_validations() {
        let mut engine = SettlementEngine::new();

        let same_party = spec(1, 1, 500);
        assert!(matches!(
            engine.create_request(1, same_party),
            Err(MarketError::Validation { .. })
        ));

        let mut platform_party = spec(1, 2, 500);
        platform_party.publisher = PLATFORM_ACCOUNT;
        assert!(matches!(
            engine.create_request(2, platform_party),
            Err(MarketError::Validation { .. })
        ));

        let mut free = spec(1, 2, 500);
        free.price = Decimal::ZERO;
        assert!(matches!(
            engine.create_request(3, free),
            Err(MarketError::Validation { .. })
        ));

        let mut relative = spec(1, 2, 500);
        relative.target_url = "/widgets".to_string();
        assert!(matches!(
            engine.create_request(4, relative),
            Err(MarketError::Validation { .. })
        ));

        // No ledger effect from any of it, nor from a valid creation
        engine.create_request(5, spec(1, 2, 500)).unwrap();
        assert_eq!(engine.snapshots().len(), 0);
    }

    #[test]
    fn test_accept_branches_on_content_mode() {
        let mut engine = SettlementEngine::new();
        engine.create_request(1, spec(1, 2, 500)).unwrap();

        let mut written = spec(1, 2, 500);
        written.content_mode = ContentMode::PlatformWritten;
        engine.create_request(2, written).unwrap();

        assert_eq!(
            engine.accept(1, 2).unwrap(),
            RequestStatus::PlacementPendingDirect
        );
        assert_eq!(
            engine.accept(2, 2).unwrap(),
            RequestStatus::AcceptedWaitingArticle
        );
        assert_eq!(
            engine.request(2).unwrap().extended,
            Some(ArticleStage::AwaitingArticle)
        );
        assert!(engine.request(1).unwrap().responded_at.is_some());
    }

    #[test]
    fn test_accept_wrong_actor_and_state() {
        let mut engine = SettlementEngine::new();
        engine.create_request(1, spec(1, 2, 500)).unwrap();

        assert!(matches!(
            engine.accept(1, 3),
            Err(MarketError::ActorMismatch { .. })
        ));

        engine.accept(1, 2).unwrap();
        assert!(matches!(
            engine.accept(1, 2),
            Err(MarketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_reject_and_cancel_only_from_pending() {
        let mut engine = SettlementEngine::new();
        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.create_request(2, spec(1, 2, 300)).unwrap();

        engine.reject(1, 2).unwrap();
        assert_eq!(engine.request(1).unwrap().status, RequestStatus::Rejected);

        // Cancel is the advertiser's move
        assert!(matches!(
            engine.cancel(2, 2),
            Err(MarketError::ActorMismatch { .. })
        ));
        engine.cancel(2, 1).unwrap();
        assert_eq!(engine.request(2).unwrap().status, RequestStatus::Cancelled);

        assert!(matches!(
            engine.reject(1, 2),
            Err(MarketError::InvalidTransition { .. })
        ));
        assert!(matches!(
            engine.cancel(2, 1),
            Err(MarketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_platform_written_article_flow() {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();

        let mut written = spec(1, 2, 500);
        written.content_mode = ContentMode::PlatformWritten;
        engine.create_request(1, written).unwrap();
        engine.accept(1, 2).unwrap();

        // Placement before the article is ready is rejected
        assert!(matches!(
            engine.submit_placement_url(1, "https://blog.example/p", 2),
            Err(MarketError::InvalidTransition { .. })
        ));

        engine
            .submit_article(
                1,
                Article {
                    title: "Ten widget trends".to_string(),
                    body: "...".to_string(),
                    keywords: vec!["widgets".to_string()],
                    writer: "editorial-7".to_string(),
                },
            )
            .unwrap();

        let request = engine.request(1).unwrap();
        assert_eq!(request.status, RequestStatus::ArticleReady);
        assert_eq!(request.extended, Some(ArticleStage::ArticleReady));
        assert!(request.article.is_some());

        engine
            .submit_placement_url(1, "https://blog.example/p", 2)
            .unwrap();
        assert_eq!(
            engine.request(1).unwrap().status,
            RequestStatus::PlacementCompleted
        );
    }

    #[test]
    fn test_submit_article_wrong_state() {
        let mut engine = SettlementEngine::new();
        engine.create_request(1, spec(1, 2, 500)).unwrap();

        let result = engine.submit_article(
            1,
            Article {
                title: "early".to_string(),
                body: String::new(),
                keywords: vec![],
                writer: String::new(),
            },
        );
        assert!(matches!(
            result,
            Err(MarketError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_submit_placement_settles_commission() {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();
        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.accept(1, 2).unwrap();

        engine
            .submit_placement_url(1, "https://blog.example/post/42", 2)
            .unwrap();

        // 950 - 500 advertiser, 350 publisher, 50 + 150 platform
        assert_eq!(engine.balance_of(1), units(450));
        assert_eq!(engine.balance_of(2), units(350));
        assert_eq!(engine.balance_of(PLATFORM_ACCOUNT), units(200));

        let request = engine.request(1).unwrap();
        assert_eq!(request.status, RequestStatus::PlacementCompleted);
        assert_eq!(
            request.placed_url.as_deref(),
            Some("https://blog.example/post/42")
        );
        assert!(request.placed_at.is_some());
    }

    #[test]
    fn test_submit_placement_is_idempotent() {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();
        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.accept(1, 2).unwrap();
        engine
            .submit_placement_url(1, "https://blog.example/post", 2)
            .unwrap();

        let result = engine.submit_placement_url(1, "https://blog.example/post", 2);
        assert_eq!(result, Err(MarketError::AlreadyFinalized { request: 1 }));

        // Exactly one commission credit for the publisher
        let commissions = engine
            .entries_for(2)
            .iter()
            .filter(|e| e.kind == EntryKind::Commission)
            .count();
        assert_eq!(commissions, 1);
        assert_eq!(engine.balance_of(2), units(350));
    }

    #[test]
    fn test_submit_placement_rejects_bad_url() {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();
        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.accept(1, 2).unwrap();

        for bad in ["not a url", "/relative/path", "ftp://files.example/x"] {
            let result = engine.submit_placement_url(1, bad, 2);
            assert!(
                matches!(result, Err(MarketError::Validation { .. })),
                "expected validation failure for {:?}",
                bad
            );
        }
        assert_eq!(
            engine.request(1).unwrap().status,
            RequestStatus::PlacementPendingDirect
        );
    }

    #[test]
    fn test_submit_placement_insufficient_funds_rolls_nothing() {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(100), "paypal", "pp-1").unwrap();
        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.accept(1, 2).unwrap();

        let result = engine.submit_placement_url(1, "https://blog.example/p", 2);

        assert!(matches!(
            result,
            Err(MarketError::InsufficientFunds { .. })
        ));
        let request = engine.request(1).unwrap();
        assert_eq!(request.status, RequestStatus::PlacementPendingDirect);
        assert_eq!(request.placed_url, None);
        assert_eq!(engine.balance_of(1), units(95));
        assert_eq!(engine.balance_of(2), Decimal::ZERO);
    }

    #[test]
    fn test_open_dispute_eligibility() {
        let mut engine = SettlementEngine::new();
        engine.create_request(1, spec(1, 2, 500)).unwrap();

        // Pending is not eligible
        assert!(matches!(
            engine.open_dispute(1, 1, "link_removed", "", vec![]),
            Err(MarketError::InvalidTransition { .. })
        ));

        engine.accept(1, 2).unwrap();
        let dispute = engine
            .open_dispute(1, 1, "slow_delivery", "nothing placed yet", vec![])
            .unwrap();
        assert_eq!(engine.dispute(dispute).unwrap().respondent, 2);
    }

    #[test]
    fn test_open_dispute_rejects_non_party() {
        let mut engine = engine_with_completed_placement();

        let result = engine.open_dispute(10, 9, "link_removed", "", vec![]);
        assert!(matches!(result, Err(MarketError::Validation { .. })));
    }

    #[test]
    fn test_second_dispute_conflicts_until_resolved() {
        let mut engine = engine_with_completed_placement();

        let first = engine
            .open_dispute(10, 1, "link_removed", "", vec![])
            .unwrap();
        assert!(matches!(
            engine.open_dispute(10, 2, "payment_issue", "", vec![]),
            Err(MarketError::ConflictingDispute { .. })
        ));

        engine
            .resolve_dispute(first, ResolutionKind::Dismissed, None)
            .unwrap();
        engine
            .open_dispute(10, 2, "payment_issue", "", vec![])
            .unwrap();
    }

    #[test]
    fn test_dispute_review_and_escalation_path() {
        let mut engine = engine_with_completed_placement();
        let dispute = engine
            .open_dispute(10, 1, "link_removed", "", vec![])
            .unwrap();

        assert!(matches!(
            engine.escalate(dispute),
            Err(MarketError::InvalidDisputeTransition { .. })
        ));

        engine.begin_review(dispute).unwrap();
        assert_eq!(
            engine.dispute(dispute).unwrap().status,
            DisputeStatus::UnderReview
        );

        engine.escalate(dispute).unwrap();
        assert_eq!(
            engine.dispute(dispute).unwrap().status,
            DisputeStatus::Escalated
        );

        // Escalated disputes are still resolvable
        engine
            .resolve_dispute(dispute, ResolutionKind::Dismissed, None)
            .unwrap();
    }

    #[test]
    fn test_refund_full_reverses_commission() {
        let mut engine = engine_with_completed_placement();
        // price 1000: advertiser 900, publisher 700, platform 100 + 300
        let dispute = engine
            .open_dispute(10, 1, "link_removed", "", vec![])
            .unwrap();

        let outcome = engine
            .resolve_dispute(dispute, ResolutionKind::RefundFull, None)
            .unwrap();

        assert!(outcome.refund.is_some());
        assert!(matches!(outcome.reversal, ReversalOutcome::Reversed { .. }));
        assert_eq!(engine.balance_of(1), units(1900));
        assert_eq!(engine.balance_of(2), Decimal::ZERO);
        assert_eq!(engine.balance_of(PLATFORM_ACCOUNT), units(400));
        assert_eq!(engine.request(10).unwrap().status, RequestStatus::Refunded);
        assert_eq!(
            engine.dispute(dispute).unwrap().status,
            DisputeStatus::Resolved
        );
    }

    #[test]
    fn test_refund_full_shortfall_still_refunds_advertiser() {
        let mut engine = engine_with_completed_placement();
        engine.withdraw(2, units(700)).unwrap();

        let dispute = engine
            .open_dispute(10, 1, "link_removed", "", vec![])
            .unwrap();
        let outcome = engine
            .resolve_dispute(dispute, ResolutionKind::RefundFull, None)
            .unwrap();

        assert_eq!(
            outcome.reversal,
            ReversalOutcome::Shortfall {
                missing: units(700)
            }
        );
        // The refund happened anyway
        assert_eq!(engine.balance_of(1), units(1900));
        assert_eq!(engine.balance_of(2), Decimal::ZERO);
        assert_eq!(engine.request(10).unwrap().status, RequestStatus::Refunded);
    }

    #[test]
    fn test_refund_full_before_placement_is_ledger_neutral() {
        let mut engine = SettlementEngine::new();
        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();
        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.accept(1, 2).unwrap();

        let dispute = engine
            .open_dispute(1, 1, "slow_delivery", "", vec![])
            .unwrap();
        let outcome = engine
            .resolve_dispute(dispute, ResolutionKind::RefundFull, None)
            .unwrap();

        // Nothing was charged, so nothing is refunded
        assert_eq!(outcome.refund, None);
        assert_eq!(outcome.reversal, ReversalOutcome::NotApplicable);
        assert_eq!(engine.balance_of(1), units(950));
        assert_eq!(engine.balance_of(2), Decimal::ZERO);
        assert_eq!(engine.request(1).unwrap().status, RequestStatus::Refunded);
    }

    #[test]
    fn test_refund_partial_leaves_commission_and_status() {
        let mut engine = engine_with_completed_placement();
        let dispute = engine
            .open_dispute(10, 1, "low_quality", "", vec![])
            .unwrap();

        let outcome = engine
            .resolve_dispute(dispute, ResolutionKind::RefundPartial, Some(units(200)))
            .unwrap();

        assert!(outcome.refund.is_some());
        assert_eq!(outcome.reversal, ReversalOutcome::NotApplicable);
        assert_eq!(engine.balance_of(1), units(1100));
        assert_eq!(engine.balance_of(2), units(700));
        assert_eq!(
            engine.request(10).unwrap().status,
            RequestStatus::PlacementCompleted
        );
    }

    #[test]
    fn test_compensation_credits_initiator() {
        let mut engine = engine_with_completed_placement();
        // Publisher-initiated dispute over a payment issue
        let dispute = engine
            .open_dispute(10, 2, "payment_issue", "", vec![])
            .unwrap();

        engine
            .resolve_dispute(dispute, ResolutionKind::Compensation, Some(units(50)))
            .unwrap();

        assert_eq!(engine.balance_of(2), units(750));
        assert_eq!(engine.balance_of(1), units(900));
        assert_eq!(
            engine.request(10).unwrap().status,
            RequestStatus::PlacementCompleted
        );
    }

    #[test]
    fn test_replacement_and_dismissed_are_ledger_neutral() {
        for resolution in [ResolutionKind::Replacement, ResolutionKind::Dismissed] {
            let mut engine = engine_with_completed_placement();
            let dispute = engine
                .open_dispute(10, 1, "link_removed", "", vec![])
                .unwrap();

            let outcome = engine.resolve_dispute(dispute, resolution, None).unwrap();

            assert_eq!(outcome.refund, None);
            assert_eq!(outcome.reversal, ReversalOutcome::NotApplicable);
            assert_eq!(engine.balance_of(1), units(900));
            assert_eq!(engine.balance_of(2), units(700));
            assert_eq!(
                engine.request(10).unwrap().status,
                RequestStatus::PlacementCompleted
            );
        }
    }

    #[test]
    fn test_resolution_amount_required() {
        let mut engine = engine_with_completed_placement();
        let dispute = engine
            .open_dispute(10, 1, "low_quality", "", vec![])
            .unwrap();

        for amount in [None, Some(Decimal::ZERO), Some(units(-5))] {
            let result = engine.resolve_dispute(dispute, ResolutionKind::RefundPartial, amount);
            assert!(matches!(result, Err(MarketError::Validation { .. })));
        }
        assert_eq!(
            engine.dispute(dispute).unwrap().status,
            DisputeStatus::Open
        );
    }

    #[test]
    fn test_resolve_twice_fails() {
        let mut engine = engine_with_completed_placement();
        let dispute = engine
            .open_dispute(10, 1, "link_removed", "", vec![])
            .unwrap();
        engine
            .resolve_dispute(dispute, ResolutionKind::Dismissed, None)
            .unwrap();

        let result = engine.resolve_dispute(dispute, ResolutionKind::RefundFull, None);
        assert!(matches!(
            result,
            Err(MarketError::InvalidDisputeTransition { .. })
        ));
        assert_eq!(engine.balance_of(1), units(900));
    }

    #[test]
    fn test_close_dispute_requires_resolved() {
        let mut engine = engine_with_completed_placement();
        let dispute = engine
            .open_dispute(10, 1, "link_removed", "", vec![])
            .unwrap();

        assert!(matches!(
            engine.close_dispute(dispute),
            Err(MarketError::InvalidDisputeTransition { .. })
        ));

        engine
            .resolve_dispute(dispute, ResolutionKind::Dismissed, None)
            .unwrap();
        engine.close_dispute(dispute).unwrap();
        assert_eq!(
            engine.dispute(dispute).unwrap().status,
            DisputeStatus::Closed
        );
    }

    #[test]
    fn test_lifecycle_notifications_emitted() {
        let conversations = Arc::new(RecordingSink::new());
        let notifications = Arc::new(RecordingSink::new());

        let mut engine = SettlementEngine::new();
        engine.set_conversation_sink(conversations.clone());
        engine.set_notification_sink(notifications.clone());

        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();
        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.accept(1, 2).unwrap();
        engine
            .submit_placement_url(1, "https://blog.example/p", 2)
            .unwrap();
        let dispute = engine.open_dispute(1, 1, "low_quality", "", vec![]).unwrap();
        engine
            .resolve_dispute(dispute, ResolutionKind::Dismissed, None)
            .unwrap();

        let conv = conversations.events();
        assert_eq!(conv.len(), 2);
        assert!(matches!(conv[0], Notification::RequestAccepted { .. }));
        assert!(matches!(conv[1], Notification::PlacementSubmitted { .. }));

        let notif = notifications.events();
        assert!(notif
            .iter()
            .any(|e| matches!(e, Notification::DisputeResolved { .. })));
    }

    #[test]
    fn test_failing_sink_does_not_change_outcome() {
        let mut engine = SettlementEngine::new();
        engine.set_conversation_sink(Arc::new(FailingSink));
        engine.set_notification_sink(Arc::new(FailingSink));

        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();
        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.accept(1, 2).unwrap();
        engine
            .submit_placement_url(1, "https://blog.example/p", 2)
            .unwrap();

        assert_eq!(
            engine.request(1).unwrap().status,
            RequestStatus::PlacementCompleted
        );
        assert_eq!(engine.balance_of(2), units(350));
    }

    #[test]
    fn test_end_to_end_scenario() {
        // Deposit 1000 → credited 950; request at 500 → publisher 350,
        // platform 150; partial refund 200 leaves the commission alone.
        let mut engine = SettlementEngine::new();

        engine.register_deposit(1, units(1000), "paypal", "pp-1").unwrap();
        assert_eq!(engine.balance_of(1), units(950));

        engine.create_request(1, spec(1, 2, 500)).unwrap();
        engine.accept(1, 2).unwrap();
        engine
            .submit_placement_url(1, "https://blog.example/post", 2)
            .unwrap();

        assert_eq!(engine.balance_of(2), units(350));
        assert_eq!(engine.balance_of(PLATFORM_ACCOUNT), units(200));

        let dispute = engine.open_dispute(1, 1, "low_quality", "", vec![]).unwrap();
        engine
            .resolve_dispute(dispute, ResolutionKind::RefundPartial, Some(units(200)))
            .unwrap();

        assert_eq!(engine.balance_of(1), units(650));
        assert_eq!(engine.balance_of(2), units(350));
        assert_eq!(
            engine.request(1).unwrap().status,
            RequestStatus::PlacementCompleted
        );
        assert_eq!(engine.reconcile_all(), Vec::<AccountId>::new());
    }

    #[test]
    fn test_process_routes_events() {
        let mut engine = SettlementEngine::new();

        let events = vec![
            EventRecord::Deposit {
                account: 1,
                gross: units(1000),
                method: "paypal".to_string(),
                reference: "pp-1".to_string(),
            },
            EventRecord::CreateRequest {
                request: 1,
                advertiser: 1,
                publisher: 2,
                price: units(500),
                content_mode: ContentMode::Existing,
                listing_reference: "listing-1".to_string(),
                target_url: "https://shop.example/".to_string(),
            },
            EventRecord::Accept { request: 1 },
            EventRecord::SubmitPlacement {
                request: 1,
                url: "https://blog.example/p".to_string(),
            },
            EventRecord::OpenDispute {
                request: 1,
                initiator: 1,
                dispute_type: "low_quality".to_string(),
            },
            EventRecord::BeginReview { request: 1 },
            EventRecord::ResolveDispute {
                request: 1,
                resolution: ResolutionKind::RefundPartial,
                amount: Some(units(200)),
            },
            EventRecord::CloseDispute { request: 1 },
        ];
        for event in events {
            engine.process(event).unwrap();
        }

        assert_eq!(engine.balance_of(1), units(650));
        assert_eq!(engine.balance_of(2), units(350));
        assert_eq!(engine.balance_of(PLATFORM_ACCOUNT), units(200));
    }

    #[test]
    fn test_process_dispute_event_without_active_dispute() {
        let mut engine = engine_with_completed_placement();

        let result = engine.process(EventRecord::ResolveDispute {
            request: 10,
            resolution: ResolutionKind::Dismissed,
            amount: None,
        });
        assert_eq!(result, Err(MarketError::NoActiveDispute { request: 10 }));
    }

    #[test]
    fn test_dispute_thread_messages() {
        let mut engine = engine_with_completed_placement();
        let dispute = engine
            .open_dispute(
                10,
                1,
                "link_removed",
                "link vanished",
                vec!["https://archive.example/1".to_string()],
            )
            .unwrap();

        engine
            .post_dispute_message(dispute, 2, "site was migrated, restoring", vec![])
            .unwrap();
        engine
            .resolve_dispute(dispute, ResolutionKind::Dismissed, None)
            .unwrap();
        engine.close_dispute(dispute).unwrap();

        let result = engine.post_dispute_message(dispute, 1, "too late", vec![]);
        assert!(matches!(
            result,
            Err(MarketError::InvalidDisputeTransition { .. })
        ));
    }
}

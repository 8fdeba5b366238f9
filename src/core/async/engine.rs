//! Thread-safe settlement orchestration
//!
//! This module provides the `AsyncSettlementEngine`, the concurrent
//! counterpart of [`crate::core::engine::SettlementEngine`]. It is
//! cloneable and safe to drive from many threads or tasks at once:
//! advertisers, publishers, and arbitrators acting at arbitrary times
//! against shared accounts and shared purchase-request rows.
//!
//! # Ordering guarantees
//!
//! - Per-account balance mutations serialize on the account's mutex in
//!   the [`AsyncLedgerBook`]; two debits racing for the last funds
//!   resolve deterministically to one success.
//! - Per-request status transitions are compare-and-swap under the
//!   request's entry guard; of two concurrent placement submissions
//!   exactly one settles the commission and the other observes
//!   `AlreadyFinalized`.
//! - Guards are acquired in one global direction — dispute row, then
//!   request row, then account locks — and never nested the other way,
//!   so a placement confirmation and a dispute resolution racing on the
//!   same request cannot deadlock.
//!
//! A placement transition is committed before the ledger settlement
//! runs; if the settlement then fails (advertiser balance too low), the
//! transition is compensated by a second guarded write restoring the
//! prior status.

use crate::core::commission::{CommissionPolicy, DepositSplit};
use crate::core::engine::validate_absolute_url;
use crate::core::ledger_book::SettlementEntries;
use crate::core::notify::{emit, LifecycleSink, Notification, NullSink};
use crate::types::{
    AccountId, ArticleStage, BalanceSnapshot, ContentMode, Dispute, DisputeId, DisputeStatus,
    EntryDirection, EntryId, EntryKind, EventRecord, LedgerEntry, MarketError, NewRequest,
    PurchaseRequest, RequestId, RequestStatus, ResolutionKind, ResolutionOutcome, ReversalOutcome,
    PLATFORM_ACCOUNT,
};
use chrono::Utc;
use dashmap::DashSet;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{AsyncDisputeStore, AsyncLedgerBook, AsyncRequestStore};

/// Concurrent settlement engine
///
/// Cloning is cheap; clones share all state and may be used from
/// different threads simultaneously.
#[derive(Clone)]
pub struct AsyncSettlementEngine {
    policy: CommissionPolicy,
    ledger: Arc<AsyncLedgerBook>,
    requests: Arc<AsyncRequestStore>,
    disputes: Arc<AsyncDisputeStore>,
    applied_deposits: Arc<DashSet<String>>,
    conversations: Arc<dyn LifecycleSink>,
    notifications: Arc<dyn LifecycleSink>,
}

impl AsyncSettlementEngine {
    /// Create an engine with the given commission policy and no wired
    /// gateways
    pub fn new(policy: CommissionPolicy) -> Self {
        AsyncSettlementEngine {
            policy,
            ledger: Arc::new(AsyncLedgerBook::new()),
            requests: Arc::new(AsyncRequestStore::new()),
            disputes: Arc::new(AsyncDisputeStore::new()),
            applied_deposits: Arc::new(DashSet::new()),
            conversations: Arc::new(NullSink),
            notifications: Arc::new(NullSink),
        }
    }

    /// Wire the conversation gateway (before handing out clones)
    pub fn set_conversation_sink(&mut self, sink: Arc<dyn LifecycleSink>) {
        self.conversations = sink;
    }

    /// Wire the notification/email fan-out (before handing out clones)
    pub fn set_notification_sink(&mut self, sink: Arc<dyn LifecycleSink>) {
        self.notifications = sink;
    }

    /// Process one replayed marketplace event
    pub fn process(&self, event: EventRecord) -> Result<(), MarketError> {
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

    /// Apply a funds-received event; idempotent on `reference`
    ///
    /// Claiming the reference in the shared set is the atomic step: of
    /// two concurrent replays of the same collector event, one proceeds
    /// and one fails with `DuplicateDeposit`.
    pub fn register_deposit(
        &self,
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
        if !self.applied_deposits.insert(reference.to_string()) {
            return Err(MarketError::DuplicateDeposit {
                reference: reference.to_string(),
            });
        }

        let split = self.policy.deposit_split(gross);
        let outcome = (|| -> Result<(), MarketError> {
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
            Ok(())
        })();

        if let Err(err) = outcome {
            // Release the claim so the collector can retry
            self.applied_deposits.remove(reference);
            return Err(err);
        }

        debug!(account, gross = %gross, credited = %split.credited, "deposit applied");
        Ok(split)
    }

    /// Pay out part of an account's balance
    pub fn withdraw(&self, account: AccountId, amount: Decimal) -> Result<EntryId, MarketError> {
        self.ledger.debit(
            account,
            amount,
            EntryKind::Withdrawal,
            "withdrawal payout",
            None,
        )
    }

    // ---- purchase-request lifecycle -----------------------------------

    /// Create a purchase request in `Pending`; no ledger effect
    pub fn create_request(&self, id: RequestId, spec: NewRequest) -> Result<(), MarketError> {
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
    pub fn accept(&self, id: RequestId, actor: AccountId) -> Result<RequestStatus, MarketError> {
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
    pub fn reject(&self, id: RequestId, actor: AccountId) -> Result<(), MarketError> {
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

    /// Advertiser withdraws a pending request; nothing to release under
    /// the debit-at-placement policy
    pub fn cancel(&self, id: RequestId, actor: AccountId) -> Result<(), MarketError> {
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
        &self,
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

    /// Publisher reports the live placement URL; settles exactly once
    ///
    /// Phase one is the compare-and-swap transition under the request
    /// guard: only one racing caller commits `PlacementCompleted`. Phase
    /// two posts the settlement with no request guard held; an
    /// `InsufficientFunds` failure compensates the transition so the
    /// publisher can retry once the advertiser is funded.
    pub fn submit_placement_url(
        &self,
        id: RequestId,
        url: &str,
        actor: AccountId,
    ) -> Result<SettlementEntries, MarketError> {
        validate_absolute_url(url)?;

        let (advertiser, publisher, price, prior_status) =
            self.requests.transition(id, |request| {
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
                let prior = request.status;
                request.status = RequestStatus::PlacementCompleted;
                request.placed_url = Some(url.to_string());
                request.placed_at = Some(Utc::now());
                Ok((
                    request.advertiser,
                    request.publisher,
                    request.price,
                    prior,
                ))
            })?;

        let split = self.policy.settlement_split(price);
        match self
            .ledger
            .post_settlement(advertiser, publisher, price, &split, id)
        {
            Ok(entries) => {
                debug!(
                    request = id,
                    price = %price,
                    publisher_share = %split.publisher_share,
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
            Err(err) => {
                // Compensate the committed transition; the guarded write
                // restores the pre-placement state for a later retry
                let rollback = self.requests.transition(id, |request| {
                    request.status = prior_status;
                    request.placed_url = None;
                    request.placed_at = None;
                    Ok(())
                });
                if let Err(rollback_err) = rollback {
                    warn!(request = id, error = %rollback_err, "placement rollback failed");
                }
                Err(err)
            }
        }
    }

    // ---- disputes ------------------------------------------------------

    /// Open a dispute against a request
    pub fn open_dispute(
        &self,
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
    pub fn begin_review(&self, dispute: DisputeId) -> Result<(), MarketError> {
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
    pub fn escalate(&self, dispute: DisputeId) -> Result<(), MarketError> {
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
    /// The dispute row is swapped to `Resolved` first (second resolver
    /// loses), then for a full refund the request row is swapped to
    /// `Refunded` before any money moves — a placement submission racing
    /// with the resolution either settles before the swap (and is
    /// reversed) or observes the refunded state and fails.
    pub fn resolve_dispute(
        &self,
        dispute: DisputeId,
        resolution: ResolutionKind,
        amount: Option<Decimal>,
    ) -> Result<ResolutionOutcome, MarketError> {
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

        let (request_id, initiator) = self.disputes.update(dispute, |d| {
            if !d.status.resolvable() {
                return Err(MarketError::invalid_dispute_transition(
                    dispute, d.status, "resolve",
                ));
            }
            d.status = DisputeStatus::Resolved;
            d.resolution = Some(resolution);
            d.resolution_amount = amount;
            d.resolved_at = Some(Utc::now());
            Ok((d.request, d.initiator))
        })?;

        let mut refund = None;
        let mut reversal = ReversalOutcome::NotApplicable;

        match resolution {
            ResolutionKind::RefundFull => {
                let (advertiser, publisher, price, prior_status) =
                    self.requests.transition(request_id, |request| {
                        let prior = request.status;
                        request.status = RequestStatus::Refunded;
                        Ok((
                            request.advertiser,
                            request.publisher,
                            request.price,
                            prior,
                        ))
                    })?;

                if prior_status == RequestStatus::PlacementCompleted {
                    refund = Some(self.ledger.credit(
                        advertiser,
                        price,
                        EntryKind::Refund,
                        format!("full refund for request {}", request_id),
                        Some(request_id),
                    )?);
                    reversal = self.reverse_commission(request_id, publisher)?;
                }

                emit(
                    &*self.notifications,
                    Notification::StatusChanged {
                        request: request_id,
                        status: RequestStatus::Refunded,
                    },
                );
            }
            ResolutionKind::RefundPartial => {
                if let Some(value) = awarded {
                    let advertiser = self.advertiser_of(request_id)?;
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

    fn reverse_commission(
        &self,
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
                    amount = %amount,
                    missing = %missing,
                    "commission reversal shortfall; escalating for recovery"
                );
                Ok(ReversalOutcome::Shortfall { missing })
            }
            Err(other) => Err(other),
        }
    }

    /// Close out a resolved dispute
    pub fn close_dispute(&self, dispute: DisputeId) -> Result<(), MarketError> {
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
        &self,
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

    /// Snapshot of the account's ledger entries
    pub fn entries_for(&self, account: AccountId) -> Vec<LedgerEntry> {
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

    /// Snapshot of a purchase request
    pub fn request(&self, id: RequestId) -> Option<PurchaseRequest> {
        self.requests.get(id)
    }

    /// Snapshot of a dispute
    pub fn dispute(&self, id: DisputeId) -> Option<Dispute> {
        self.disputes.get(id)
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

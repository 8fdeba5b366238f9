//! Error types for the settlement engine
//!
//! Every failure kind maps to a stable machine-readable code via
//! [`MarketError::code`]; the UI layer translates codes to localized
//! messages. Expected, benign overlaps of concurrent retries (a second
//! placement submission, a replayed deposit reference) are typed outcomes
//! here, not panics — no exception-style control flow anywhere in the core.

use super::account::AccountId;
use super::dispute::{DisputeId, DisputeStatus};
use super::request::{RequestId, RequestStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the settlement engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    /// Malformed input: non-URL placement link, non-positive amount,
    /// advertiser buying from themselves, and the like. Surfaced
    /// immediately, never retried.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// Operation attempted from a purchase-request state that does not
    /// permit it
    #[error("Request {request} cannot {operation} from status {from}")]
    InvalidTransition {
        request: RequestId,
        from: RequestStatus,
        /// Operation that was attempted
        operation: String,
    },

    /// Operation attempted from a dispute state that does not permit it
    #[error("Dispute {dispute} cannot {operation} from status {from}")]
    InvalidDisputeTransition {
        dispute: DisputeId,
        from: DisputeStatus,
        operation: String,
    },

    /// Debit would breach the non-negative balance invariant
    ///
    /// The balance is unchanged when this is returned.
    #[error("Insufficient funds for account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    /// Duplicate terminal operation on a request — a benign overlap of
    /// concurrent retries, with no ledger effect
    #[error("Request {request} is already finalized")]
    AlreadyFinalized { request: RequestId },

    /// Funds-received event replayed with an already-applied idempotency
    /// reference; no ledger effect
    #[error("Deposit reference '{reference}' was already applied")]
    DuplicateDeposit { reference: String },

    /// Unknown purchase request id
    #[error("Purchase request {request} not found")]
    RequestNotFound { request: RequestId },

    /// Unknown dispute id
    #[error("Dispute {dispute} not found")]
    DisputeNotFound { dispute: DisputeId },

    /// No active dispute exists for the request
    #[error("No active dispute for request {request}")]
    NoActiveDispute { request: RequestId },

    /// A second dispute was opened while one is still active
    #[error("Request {request} already has active dispute {dispute}")]
    ConflictingDispute {
        request: RequestId,
        dispute: DisputeId,
    },

    /// The acting party is not the one this operation belongs to
    #[error("Account {actual} may not {operation} request {request} (expected {expected})")]
    ActorMismatch {
        request: RequestId,
        expected: AccountId,
        actual: AccountId,
        operation: String,
    },

    /// Balance arithmetic would overflow; the operation is rejected and
    /// the account is unchanged
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow {
        operation: String,
        account: AccountId,
    },

    /// I/O error in the replay front-end
    #[error("I/O error: {message}")]
    Io { message: String },

    /// CSV parsing error in the replay front-end
    #[error("Parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        line: Option<u64>,
        message: String,
    },
}

impl From<std::io::Error> for MarketError {
    fn from(error: std::io::Error) -> Self {
        MarketError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for MarketError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());
        MarketError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl MarketError {
    /// Stable machine-readable code for the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Validation { .. } => "VALIDATION",
            MarketError::InvalidTransition { .. } | MarketError::InvalidDisputeTransition { .. } => {
                "INVALID_TRANSITION"
            }
            MarketError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            MarketError::AlreadyFinalized { .. } | MarketError::DuplicateDeposit { .. } => {
                "ALREADY_FINALIZED"
            }
            MarketError::RequestNotFound { .. }
            | MarketError::DisputeNotFound { .. }
            | MarketError::NoActiveDispute { .. } => "NOT_FOUND",
            MarketError::ConflictingDispute { .. } => "CONFLICTING_DISPUTE",
            MarketError::ActorMismatch { .. } => "FORBIDDEN",
            MarketError::ArithmeticOverflow { .. } => "OVERFLOW",
            MarketError::Io { .. } => "IO",
            MarketError::Parse { .. } => "PARSE",
        }
    }

    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        MarketError::Validation {
            message: message.into(),
        }
    }

    /// Create an InvalidTransition error
    pub fn invalid_transition(request: RequestId, from: RequestStatus, operation: &str) -> Self {
        MarketError::InvalidTransition {
            request,
            from,
            operation: operation.to_string(),
        }
    }

    /// Create an InvalidDisputeTransition error
    pub fn invalid_dispute_transition(
        dispute: DisputeId,
        from: DisputeStatus,
        operation: &str,
    ) -> Self {
        MarketError::InvalidDisputeTransition {
            dispute,
            from,
            operation: operation.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: AccountId, balance: Decimal, requested: Decimal) -> Self {
        MarketError::InsufficientFunds {
            account,
            balance,
            requested,
        }
    }

    /// Create an ActorMismatch error
    pub fn actor_mismatch(
        request: RequestId,
        expected: AccountId,
        actual: AccountId,
        operation: &str,
    ) -> Self {
        MarketError::ActorMismatch {
            request,
            expected,
            actual,
            operation: operation.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: AccountId) -> Self {
        MarketError::ArithmeticOverflow {
            operation: operation.to_string(),
            account,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::validation(
        MarketError::validation("target URL must be absolute"),
        "Validation failed: target URL must be absolute",
        "VALIDATION"
    )]
    #[case::invalid_transition(
        MarketError::invalid_transition(9, RequestStatus::Pending, "submit_placement"),
        "Request 9 cannot submit_placement from status pending",
        "INVALID_TRANSITION"
    )]
    #[case::invalid_dispute_transition(
        MarketError::invalid_dispute_transition(3, DisputeStatus::Closed, "resolve"),
        "Dispute 3 cannot resolve from status closed",
        "INVALID_TRANSITION"
    )]
    #[case::insufficient_funds(
        MarketError::insufficient_funds(4, Decimal::new(9500, 2), Decimal::new(50000, 2)),
        "Insufficient funds for account 4: balance 95.00, requested 500.00",
        "INSUFFICIENT_FUNDS"
    )]
    #[case::already_finalized(
        MarketError::AlreadyFinalized { request: 12 },
        "Request 12 is already finalized",
        "ALREADY_FINALIZED"
    )]
    #[case::duplicate_deposit(
        MarketError::DuplicateDeposit { reference: "pp-881".to_string() },
        "Deposit reference 'pp-881' was already applied",
        "ALREADY_FINALIZED"
    )]
    #[case::request_not_found(
        MarketError::RequestNotFound { request: 404 },
        "Purchase request 404 not found",
        "NOT_FOUND"
    )]
    #[case::conflicting_dispute(
        MarketError::ConflictingDispute { request: 8, dispute: 2 },
        "Request 8 already has active dispute 2",
        "CONFLICTING_DISPUTE"
    )]
    #[case::actor_mismatch(
        MarketError::actor_mismatch(5, 2, 3, "accept"),
        "Account 3 may not accept request 5 (expected 2)",
        "FORBIDDEN"
    )]
    #[case::parse_with_line(
        MarketError::Parse { line: Some(42), message: "bad field".to_string() },
        "Parse error at line 42: bad field",
        "PARSE"
    )]
    #[case::parse_without_line(
        MarketError::Parse { line: None, message: "bad field".to_string() },
        "Parse error: bad field",
        "PARSE"
    )]
    fn test_display_and_code(
        #[case] error: MarketError,
        #[case] expected: &str,
        #[case] code: &str,
    ) {
        assert_eq!(error.to_string(), expected);
        assert_eq!(error.code(), code);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: MarketError = io_error.into();
        assert!(matches!(error, MarketError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}

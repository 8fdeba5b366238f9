//! Outbound lifecycle notifications
//!
//! The settlement core emits fire-and-forget events so external
//! collaborators (conversation threads, email) can react to lifecycle
//! changes. Delivery failure never rolls back a state transition: a
//! failed sink is logged at `warn` and the operation's outcome stands.

use crate::types::{AccountId, DisputeId, RequestId, RequestStatus, ResolutionKind};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// One lifecycle notification
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Publisher accepted the request; a conversation thread should exist
    RequestAccepted {
        request: RequestId,
        advertiser: AccountId,
        publisher: AccountId,
    },

    /// Placement URL submitted and commission settled
    PlacementSubmitted {
        request: RequestId,
        advertiser: AccountId,
        publisher: AccountId,
    },

    /// Any primary-status change on a purchase request
    StatusChanged {
        request: RequestId,
        status: RequestStatus,
    },

    /// A dispute reached its terminal resolution
    DisputeResolved {
        request: RequestId,
        dispute: DisputeId,
        resolution: ResolutionKind,
    },
}

/// Receiver of lifecycle notifications
///
/// Implementations are external collaborators (conversation gateway,
/// notification/email fan-out). Delivery is at-least-once from the
/// caller's perspective and failures are swallowed by [`emit`].
pub trait LifecycleSink: Send + Sync {
    /// Deliver one notification; an `Err` is logged and dropped
    fn deliver(&self, event: &Notification) -> Result<(), String>;
}

/// Deliver a notification, logging and swallowing any failure
pub(crate) fn emit(sink: &dyn LifecycleSink, event: Notification) {
    if let Err(reason) = sink.deliver(&event) {
        warn!(?event, %reason, "lifecycle notification dropped");
    }
}

/// Sink that drops everything; the default when no gateway is wired up
pub struct NullSink;

impl LifecycleSink for NullSink {
    fn deliver(&self, _event: &Notification) -> Result<(), String> {
        Ok(())
    }
}

/// Sink that records every delivered notification, for assertions in
/// tests and for local inspection
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications delivered so far, in order
    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LifecycleSink for RecordingSink {
    fn deliver(&self, event: &Notification) -> Result<(), String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Sink that always fails delivery; used to verify that failures never
/// affect engine outcomes
pub struct FailingSink;

impl LifecycleSink for FailingSink {
    fn deliver(&self, _event: &Notification) -> Result<(), String> {
        Err("gateway unavailable".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();

        emit(
            &sink,
            Notification::RequestAccepted {
                request: 1,
                advertiser: 1,
                publisher: 2,
            },
        );
        emit(
            &sink,
            Notification::StatusChanged {
                request: 1,
                status: RequestStatus::PlacementPendingDirect,
            },
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Notification::RequestAccepted { .. }));
        assert!(matches!(events[1], Notification::StatusChanged { .. }));
    }

    #[test]
    fn test_failing_sink_is_swallowed() {
        // emit must not panic or propagate
        emit(
            &FailingSink,
            Notification::DisputeResolved {
                request: 1,
                dispute: 1,
                resolution: ResolutionKind::Dismissed,
            },
        );
    }
}

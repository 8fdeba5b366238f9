//! Thread-safe purchase-request storage
//!
//! The concurrent counterpart of
//! [`crate::core::request_store::RequestStore`]. Rows live in a sharded
//! map; [`AsyncRequestStore::transition`] runs its closure under the
//! row's entry guard, which makes every status change a compare-and-swap:
//! of two racing transitions, exactly one sees the expected state and
//! commits, the other observes the result.

use crate::types::{MarketError, PurchaseRequest, RequestId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Concurrent purchase-request table
pub struct AsyncRequestStore {
    requests: DashMap<RequestId, PurchaseRequest>,
}

impl AsyncRequestStore {
    /// Create an empty store
    pub fn new() -> Self {
        AsyncRequestStore {
            requests: DashMap::new(),
        }
    }

    /// Insert a freshly created request
    ///
    /// The entry guard makes the uniqueness check atomic: two concurrent
    /// creations with the same id resolve to one success.
    pub fn insert(&self, request: PurchaseRequest) -> Result<(), MarketError> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(MarketError::validation(format!(
                "purchase request {} already exists",
                request.id
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(request);
                Ok(())
            }
        }
    }

    /// Snapshot of a request at the time of the call
    pub fn get(&self, id: RequestId) -> Option<PurchaseRequest> {
        self.requests.get(&id).map(|row| row.value().clone())
    }

    /// Run a guarded mutation against one request
    ///
    /// The closure executes while the row's entry lock is held, so no
    /// other thread can observe or produce an intermediate state. The
    /// closure validates the current status and either commits or
    /// returns an error without mutating.
    pub fn transition<T, F>(&self, id: RequestId, f: F) -> Result<T, MarketError>
    where
        F: FnOnce(&mut PurchaseRequest) -> Result<T, MarketError>,
    {
        let mut row = self
            .requests
            .get_mut(&id)
            .ok_or(MarketError::RequestNotFound { request: id })?;
        f(row.value_mut())
    }

    /// Number of stored requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// True when no request has been created yet
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Default for AsyncRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

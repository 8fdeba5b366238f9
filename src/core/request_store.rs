//! Purchase-request storage
//!
//! Holds every purchase request ever created (requests are never
//! destroyed; terminal states end the lifecycle). Status transitions go
//! through [`RequestStore::transition`], which hands a closure a mutable
//! row so callers validate the current state and mutate in one step —
//! the only way status changes happen.

use crate::types::{MarketError, PurchaseRequest, RequestId};
use std::collections::HashMap;

/// In-memory purchase-request table
pub struct RequestStore {
    requests: HashMap<RequestId, PurchaseRequest>,
}

impl RequestStore {
    /// Create an empty store
    pub fn new() -> Self {
        RequestStore {
            requests: HashMap::new(),
        }
    }

    /// Insert a freshly created request
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the id is already taken; request ids come
    /// from the caller and must be unique.
    pub fn insert(&mut self, request: PurchaseRequest) -> Result<(), MarketError> {
        if self.requests.contains_key(&request.id) {
            return Err(MarketError::validation(format!(
                "purchase request {} already exists",
                request.id
            )));
        }
        self.requests.insert(request.id, request);
        Ok(())
    }

    /// Look up a request by id
    pub fn get(&self, id: RequestId) -> Option<&PurchaseRequest> {
        self.requests.get(&id)
    }

    /// Run a guarded mutation against one request
    ///
    /// The closure sees the row's current state and either mutates it and
    /// returns a value, or returns an error leaving the row as it found
    /// it (closures must not mutate before deciding to fail).
    ///
    /// # Errors
    ///
    /// Returns `RequestNotFound` for an unknown id, otherwise whatever
    /// the closure returns.
    pub fn transition<T, F>(&mut self, id: RequestId, f: F) -> Result<T, MarketError>
    where
        F: FnOnce(&mut PurchaseRequest) -> Result<T, MarketError>,
    {
        let request = self
            .requests
            .get_mut(&id)
            .ok_or(MarketError::RequestNotFound { request: id })?;
        f(request)
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

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}

//! The mutable state slot backing one store.

use crate::types::{Selected, StateVersion, StoreStatus};
use parking_lot::RwLock;
use std::sync::Arc;

struct StateInner {
    /// Current snapshot. Replaced wholesale on mutation so live reads keep
    /// their own `Arc`.
    snapshot: Selected,
    version: StateVersion,
    status: StoreStatus,
}

/// Holds the current state snapshot, its monotonic version, and the status
/// slot.
///
/// Mutation and the version bump happen together under the write lock; a
/// subscription read observes either the old snapshot at the old version or
/// the new snapshot at the new version, never a mix.
pub struct StateHolder {
    inner: RwLock<StateInner>,
}

impl StateHolder {
    pub fn new(initial: serde_json::Value) -> Self {
        Self {
            inner: RwLock::new(StateInner {
                snapshot: Arc::new(initial),
                version: StateVersion::default(),
                status: StoreStatus::Ready,
            }),
        }
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Selected {
        Arc::clone(&self.inner.read().snapshot)
    }

    /// Current state version.
    pub fn version(&self) -> StateVersion {
        self.inner.read().version
    }

    /// Snapshot and version read together.
    pub fn snapshot_with_version(&self) -> (Selected, StateVersion) {
        let inner = self.inner.read();
        (Arc::clone(&inner.snapshot), inner.version)
    }

    /// Apply a mutation to a copy of the state and bump the version.
    pub fn mutate<F>(&self, f: F) -> StateVersion
    where
        F: FnOnce(&mut serde_json::Value),
    {
        let mut inner = self.inner.write();
        let mut next = (*inner.snapshot).clone();
        f(&mut next);
        inner.snapshot = Arc::new(next);
        inner.version = inner.version.next();
        inner.version
    }

    /// Replace the state wholesale and bump the version.
    pub fn replace(&self, state: serde_json::Value) -> StateVersion {
        let mut inner = self.inner.write();
        inner.snapshot = Arc::new(state);
        inner.version = inner.version.next();
        inner.version
    }

    /// Current status slot value.
    pub fn status(&self) -> StoreStatus {
        self.inner.read().status
    }

    /// Swap the status slot, returning the previous value.
    pub fn swap_status(&self, status: StoreStatus) -> StoreStatus {
        let mut inner = self.inner.write();
        std::mem::replace(&mut inner.status, status)
    }
}

//! The hook handle: one consumer's lease on a subscription.

use crate::store::StoreInner;
use crate::types::{HandleId, Params, ParamsId, Selected, SelectorId, SubscriptionKey};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// One consumer's lease on a subscription.
///
/// Created and destroyed exclusively by the store. The subscription table
/// owns the node; the handle only back-references it by key. May be
/// retargeted in place by `Store::reparameterize`; destroyed by
/// [`unsubscribe`](HookHandle::unsubscribe), which is idempotent.
pub struct HookHandle {
    id: HandleId,
    selector_id: SelectorId,
    key: SubscriptionKey,
    params_id: ParamsId,
    params: Params,
    cache_only: bool,

    /// Set when a read delivered a value differing by identity from the
    /// previous one. Cleared by the boundary layer after rendering.
    pending_render: bool,

    /// Last value delivered through this handle.
    last_value: Option<Selected>,

    store: Weak<StoreInner>,
    detached: bool,
}

impl HookHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: HandleId,
        selector_id: SelectorId,
        key: SubscriptionKey,
        params_id: ParamsId,
        params: Params,
        cache_only: bool,
        initial_value: Option<Selected>,
        store: Weak<StoreInner>,
    ) -> Self {
        Self {
            id,
            selector_id,
            key,
            params_id,
            params,
            cache_only,
            pending_render: false,
            last_value: initial_value,
            store,
            detached: false,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn selector_id(&self) -> &SelectorId {
        &self.selector_id
    }

    pub fn subscription_key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn params_id(&self) -> &ParamsId {
        &self.params_id
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn is_cache_only(&self) -> bool {
        self.cache_only
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn pending_render(&self) -> bool {
        self.pending_render
    }

    /// Acknowledge a pending render.
    pub fn clear_pending_render(&mut self) {
        self.pending_render = false;
    }

    /// Last value delivered through this handle.
    pub fn last_value(&self) -> Option<&Selected> {
        self.last_value.as_ref()
    }

    /// Detach this handle from its subscription, cascading cleanup through
    /// the graph. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        if let Some(store) = self.store.upgrade() {
            trace!(handle = %self.id, key = %self.key, "unsubscribing");
            store.graph.lock().detach(self.id, &self.key);
        }
    }

    /// Point the handle at a new subscription. The id stays; the target
    /// (and possibly the mode) changes.
    pub(crate) fn retarget(
        &mut self,
        selector_id: SelectorId,
        key: SubscriptionKey,
        params_id: ParamsId,
        params: Params,
        cache_only: bool,
    ) {
        self.selector_id = selector_id;
        self.key = key;
        self.params_id = params_id;
        self.params = params;
        self.cache_only = cache_only;
    }

    /// Record a delivered value, flagging a pending render on identity
    /// change.
    pub(crate) fn record_read(&mut self, value: Selected) {
        let changed = match &self.last_value {
            Some(previous) => !Arc::ptr_eq(previous, &value),
            None => true,
        };
        if changed {
            self.pending_render = true;
        }
        self.last_value = Some(value);
    }
}

impl fmt::Debug for HookHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookHandle")
            .field("id", &self.id)
            .field("selector_id", &self.selector_id)
            .field("key", &self.key)
            .field("cache_only", &self.cache_only)
            .field("detached", &self.detached)
            .finish()
    }
}

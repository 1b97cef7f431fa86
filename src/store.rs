//! Main Store struct tying all components together.

use crate::error::{Result, StoreError};
use crate::graph::manager::{GraphContext, SubscriptionGraph};
use crate::graph::{HandleTarget, HookHandle, SubscriptionInfo};
use crate::selectors::{Selector, SelectorRegistry};
use crate::state::StateHolder;
use crate::types::{
    Params, Selected, SelectorId, StateVersion, StoreStats, StoreStatus, SubscriptionKey,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Precondition check run once, on first creation of a requested
/// subscription, before any graph mutation. Receives the target store name,
/// the selector's store name, and the selector id; an `Err` vetoes the
/// subscription and leaves the graph exactly as it was.
pub type SubscriptionValidator =
    Arc<dyn Fn(&str, &str, &SelectorId) -> std::result::Result<(), String> + Send + Sync>;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Store name, handed to validators.
    pub name: String,

    /// Initial state snapshot.
    pub initial_state: serde_json::Value,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            initial_state: serde_json::Value::Null,
        }
    }
}

/// Options for [`Store::subscribe_with`] and [`Store::reparameterize_with`].
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Store the selector is declared in, when different from the target
    /// store. Defaults to the target store's own name.
    pub selector_store: Option<String>,

    /// Hold the subscription as a cache-only dependency: it is kept alive
    /// but never enters the trigger registry.
    pub cache_only: bool,

    /// Precondition check for first-time creation.
    pub validator: Option<SubscriptionValidator>,
}

/// Shared interior of a store. Handles keep a weak reference to it so
/// `unsubscribe` works without threading the store through.
pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    pub(crate) state: StateHolder,
    pub(crate) selectors: SelectorRegistry,
    /// The whole graph is guarded by one mutex per public operation:
    /// every operation's invariants span multiple nodes.
    pub(crate) graph: Mutex<SubscriptionGraph>,
}

/// An in-memory store with a memoized selector subscription graph.
///
/// Provides a unified interface for:
/// - Registering selector pipelines
/// - Subscribing consumers to memoized selector evaluations
/// - Mutating state and bumping the cache-validity version
/// - Inspecting live subscriptions in subscribe order
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a new store.
    pub fn new(config: StoreConfig) -> Self {
        let initial = config.initial_state.clone();
        Self {
            inner: Arc::new(StoreInner {
                config,
                state: StateHolder::new(initial),
                selectors: SelectorRegistry::new(),
                graph: Mutex::new(SubscriptionGraph::new()),
            }),
        }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    // --- Selector Registration ---

    /// Register a compiled selector pipeline.
    pub fn register_selector(&self, selector: Selector) -> Result<()> {
        self.inner.selectors.register(selector)
    }

    // --- Subscriptions ---

    /// Subscribe a consumer to a selector, creating or sharing the
    /// subscription node and returning the consumer's handle.
    pub fn subscribe(&self, selector_id: impl Into<SelectorId>, params: Params) -> Result<HookHandle> {
        self.subscribe_with(selector_id, params, SubscribeOptions::default())
    }

    /// Subscribe with explicit options.
    pub fn subscribe_with(
        &self,
        selector_id: impl Into<SelectorId>,
        params: Params,
        options: SubscribeOptions,
    ) -> Result<HookHandle> {
        let selector_id = selector_id.into();
        let mut graph = self.inner.graph.lock();
        let ctx = self.graph_context(options.selector_store.as_deref());

        let handle_id = graph.allocate_handle_id();
        match graph.resolve(
            &ctx,
            &selector_id,
            params.clone(),
            handle_id,
            options.cache_only,
            &[],
            options.validator.as_ref(),
        ) {
            Ok((key, params_id)) => {
                if !options.cache_only {
                    graph.register_trigger(HandleTarget {
                        handle_id,
                        selector_id: selector_id.clone(),
                        subscription_key: key,
                        params_id: params_id.clone(),
                    });
                }
                let initial = graph.read_value(&ctx, &key);
                drop(graph);
                Ok(HookHandle::new(
                    handle_id,
                    selector_id,
                    key,
                    params_id,
                    params,
                    options.cache_only,
                    initial,
                    Arc::downgrade(&self.inner),
                ))
            }
            Err(e) => {
                graph.purge_handle(handle_id);
                Err(e)
            }
        }
    }

    /// Cache-only convenience wrapper: holds the value alive as a
    /// dependency without ever render-notifying.
    pub fn subscribe_cached(
        &self,
        selector_id: impl Into<SelectorId>,
        params: Params,
    ) -> Result<HookHandle> {
        self.subscribe_with(
            selector_id,
            params,
            SubscribeOptions {
                cache_only: true,
                ..Default::default()
            },
        )
    }

    /// Retarget a live handle to a new selector/parameter pair in place.
    ///
    /// Frees upstream dependencies exclusive to the old target; preserves
    /// those shared with the new one. Fails fatally, before any mutation,
    /// when the new parameters derive the same params key as the current
    /// ones.
    pub fn reparameterize(
        &self,
        handle: &mut HookHandle,
        selector_id: impl Into<SelectorId>,
        params: Params,
    ) -> Result<()> {
        let options = SubscribeOptions {
            cache_only: handle.is_cache_only(),
            ..Default::default()
        };
        self.reparameterize_with(handle, selector_id, params, options)
    }

    /// Retarget with explicit options. `options.cache_only` becomes the
    /// handle's mode on the new target.
    pub fn reparameterize_with(
        &self,
        handle: &mut HookHandle,
        selector_id: impl Into<SelectorId>,
        params: Params,
        options: SubscribeOptions,
    ) -> Result<()> {
        if handle.is_detached() {
            return Err(StoreError::HandleDetached);
        }

        let selector_id = selector_id.into();
        let mut graph = self.inner.graph.lock();
        let ctx = self.graph_context(options.selector_store.as_deref());

        let (new_key, new_params_id) = graph.reparameterize(
            &ctx,
            handle.id(),
            handle.is_cache_only(),
            options.cache_only,
            handle.subscription_key(),
            handle.params_id(),
            &selector_id,
            params.clone(),
            options.validator.as_ref(),
        )?;
        let value = graph.read_value(&ctx, &new_key);
        drop(graph);

        handle.retarget(selector_id, new_key, new_params_id, params, options.cache_only);
        if let Some(value) = value {
            handle.record_read(value);
        }
        Ok(())
    }

    // --- Reads ---

    /// Current value of the handle's subscription, recomputed at most once
    /// per state version. Updates the handle's last value and pending-render
    /// flag.
    pub fn select(&self, handle: &mut HookHandle) -> Result<Selected> {
        if handle.is_detached() {
            return Err(StoreError::HandleDetached);
        }

        let mut graph = self.inner.graph.lock();
        let ctx = self.graph_context(None);
        let value = graph
            .read_value(&ctx, handle.subscription_key())
            .ok_or_else(|| StoreError::SubscriptionNotFound(*handle.subscription_key()))?;
        drop(graph);

        handle.record_read(Arc::clone(&value));
        Ok(value)
    }

    // --- State ---

    /// Apply a mutation to the state and bump the version.
    pub fn mutate<F>(&self, f: F) -> StateVersion
    where
        F: FnOnce(&mut serde_json::Value),
    {
        let _graph = self.inner.graph.lock();
        self.inner.state.mutate(f)
    }

    /// Replace the state wholesale and bump the version.
    pub fn replace_state(&self, state: serde_json::Value) -> StateVersion {
        let _graph = self.inner.graph.lock();
        self.inner.state.replace(state)
    }

    /// Current state snapshot.
    pub fn state(&self) -> Selected {
        self.inner.state.snapshot()
    }

    /// Current state version.
    pub fn state_version(&self) -> StateVersion {
        self.inner.state.version()
    }

    /// Current status slot value.
    pub fn status(&self) -> StoreStatus {
        self.inner.state.status()
    }

    // --- Introspection ---

    /// Live subscription count.
    pub fn subscription_count(&self) -> usize {
        self.inner.graph.lock().subscription_count()
    }

    /// Live non-cache-only handle count.
    pub fn trigger_count(&self) -> usize {
        self.inner.graph.lock().trigger_count()
    }

    /// Live subscription keys in creation order.
    pub fn subscription_keys(&self) -> Vec<SubscriptionKey> {
        self.inner.graph.lock().subscription_keys()
    }

    /// Live trigger targets in subscribe order.
    pub fn trigger_targets(&self) -> Vec<HandleTarget> {
        self.inner.graph.lock().trigger_targets()
    }

    /// Snapshots of every live subscription, in creation order.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner.graph.lock().subscriptions()
    }

    /// (trigger, holder) counts of one subscription node.
    pub fn consumers_of(&self, key: &SubscriptionKey) -> Option<(usize, usize)> {
        self.inner.graph.lock().consumers(key)
    }

    /// Whether a subscription lives under this key.
    pub fn contains_subscription(&self, key: &SubscriptionKey) -> bool {
        self.inner.graph.lock().contains(key)
    }

    /// Graph occupancy snapshot.
    pub fn stats(&self) -> StoreStats {
        self.inner.graph.lock().stats()
    }

    /// Build the context a graph operation runs against.
    fn graph_context<'a>(&'a self, selector_store: Option<&'a str>) -> GraphContext<'a> {
        let (snapshot, version) = self.inner.state.snapshot_with_version();
        GraphContext {
            snapshot,
            version,
            state: &self.inner.state,
            selectors: &self.inner.selectors,
            store_name: &self.inner.config.name,
            selector_store_name: selector_store.unwrap_or(&self.inner.config.name),
        }
    }
}

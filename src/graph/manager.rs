//! The subscription graph manager.
//!
//! Owns the subscription table and the trigger registry for one store, and
//! implements the three public graph operations: `resolve` (find-or-create a
//! node, recursively resolving selector references as cache-only
//! dependencies), `detach` (cascading, order-independent garbage
//! collection), and `reparameterize` (in-place retargeting of a live
//! handle). Reads go through `read_value`, which recomputes each node at
//! most once per state version.
//!
//! Both the table and the registry are insertion-ordered; enumeration
//! reflects subscribe order.

use crate::error::{Result, StoreError};
use crate::identity::derive_ids;
use crate::selectors::{SelectorRegistry, Stage};
use crate::state::StateHolder;
use crate::store::SubscriptionValidator;
use crate::types::{
    HandleId, Params, ParamsId, Selected, SelectorId, StateVersion, StoreStats, StoreStatus,
    SubscriptionKey,
};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::subscription::{BoundStage, HandleEntry, Subscription};

/// Everything a graph operation needs from its collaborators: the state
/// snapshot pinned for the duration of the operation, the selector
/// registry, and the store identity handed to validators.
pub(crate) struct GraphContext<'a> {
    pub snapshot: Selected,
    pub version: StateVersion,
    pub state: &'a StateHolder,
    pub selectors: &'a SelectorRegistry,
    pub store_name: &'a str,
    pub selector_store_name: &'a str,
}

/// Target triple of one live non-cache-only handle in the trigger registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandleTarget {
    pub handle_id: HandleId,
    pub selector_id: SelectorId,
    pub subscription_key: SubscriptionKey,
    pub params_id: ParamsId,
}

/// Introspection snapshot of one live subscription node.
#[derive(Clone, Debug)]
pub struct SubscriptionInfo {
    pub key: SubscriptionKey,
    pub selector_id: SelectorId,
    pub params_id: ParamsId,
    pub trigger_count: usize,
    pub holder_count: usize,
    pub keep_memo: bool,
    /// Whether the last recomputation produced a new value identity.
    pub value_changed: bool,
}

/// The per-store subscription graph.
pub(crate) struct SubscriptionGraph {
    /// All live subscription nodes, keyed by derived subscription key, in
    /// creation order. Exclusive owner of the nodes.
    table: IndexMap<SubscriptionKey, Subscription>,

    /// Live non-cache-only handles, in subscribe order.
    trigger_registry: IndexMap<HandleId, HandleTarget>,

    /// Arena counter for handle identities.
    next_handle_id: u64,
}

impl SubscriptionGraph {
    pub fn new() -> Self {
        Self {
            table: IndexMap::new(),
            trigger_registry: IndexMap::new(),
            next_handle_id: 1,
        }
    }

    /// Allocate a fresh handle identity.
    pub fn allocate_handle_id(&mut self) -> HandleId {
        let id = HandleId(self.next_handle_id);
        self.next_handle_id += 1;
        id
    }

    // --- Resolution ---

    /// Find or create the subscription for `(selector_id, params)` and
    /// attach `consumer` to it.
    ///
    /// `chain` is the resolution path that led here: empty for a consumer's
    /// direct request, the accumulated ancestor set for recursive
    /// dependency resolution. Only the outermost call toggles the store
    /// status slot. `validator` runs once, before construction, only when
    /// the node does not exist yet; a veto leaves the graph untouched.
    pub fn resolve(
        &mut self,
        ctx: &GraphContext<'_>,
        selector_id: &SelectorId,
        params: Params,
        consumer: HandleId,
        cache_only: bool,
        chain: &[SubscriptionKey],
        validator: Option<&SubscriptionValidator>,
    ) -> Result<(SubscriptionKey, ParamsId)> {
        let (key, params_id) = derive_ids(selector_id, &params)?;

        if self.table.contains_key(&key) {
            trace!(selector = %selector_id, key = %key, handle = %consumer, "attaching to existing subscription");
            self.attach(&key, consumer, cache_only);
            self.propagate_holds(&key, consumer);
            self.link_chain(&key, chain);
            return Ok((key, params_id));
        }

        if let Some(validate) = validator {
            validate(ctx.store_name, ctx.selector_store_name, selector_id).map_err(|reason| {
                StoreError::ValidationRejected {
                    selector: selector_id.clone(),
                    reason,
                }
            })?;
        }

        // Only the outermost call flips the status slot; nested resolutions
        // observe the outer request's marker.
        let prev_status = if chain.is_empty() {
            Some(ctx.state.swap_status(StoreStatus::Selecting))
        } else {
            None
        };

        let result = self.construct(ctx, selector_id, key, params_id.clone(), params, consumer, chain);

        if let Some(prev) = prev_status {
            ctx.state.swap_status(prev);
        }
        result?;

        self.attach(&key, consumer, cache_only);
        self.link_chain(&key, chain);

        Ok((key, params_id))
    }

    /// Build a new node: evaluate every stage against the pinned snapshot,
    /// recursively resolving selector references as cache-only
    /// dependencies of `consumer`, and seed the memo.
    fn construct(
        &mut self,
        ctx: &GraphContext<'_>,
        selector_id: &SelectorId,
        key: SubscriptionKey,
        params_id: ParamsId,
        params: Params,
        consumer: HandleId,
        chain: &[SubscriptionKey],
    ) -> Result<()> {
        let selector = ctx.selectors.lookup(selector_id);
        debug!(selector = %selector_id, key = %key, stages = selector.stages.len(), "constructing subscription");

        // Insert the skeleton first so dependency resolutions can register
        // into this node's associated set through the extended chain.
        self.table.insert(
            key,
            Subscription::new(key, Arc::clone(&selector), params_id, params.clone()),
        );

        let stage_count = selector.stages.len();
        let mut bound: Vec<BoundStage> = Vec::with_capacity(stage_count);
        let mut args: Vec<Selected> = Vec::new();
        let mut terminal_value: Option<Selected> = None;
        let mut upstream_closure: Vec<SubscriptionKey> = Vec::new();

        for (index, stage) in selector.stages.iter().enumerate() {
            let terminal = index + 1 == stage_count;
            let (bound_stage, value) = match stage {
                Stage::ReadState(f) => (
                    BoundStage::ReadState(Arc::clone(f)),
                    Arc::new(f(&ctx.snapshot, &params)),
                ),
                Stage::SelectorRef(upstream_id) => {
                    let upstream = ctx.selectors.lookup(upstream_id);
                    let upstream_params = match selector.projector_for(upstream.signature.as_deref())
                    {
                        Some(project) => project(&params),
                        None => Params::none(),
                    };
                    let (upstream_key, _) = derive_ids(upstream_id, &upstream_params)?;

                    // Extended ancestor chain: the path so far, this node,
                    // and everything already associated with it.
                    let mut extended: Vec<SubscriptionKey> = chain.to_vec();
                    extended.push(key);
                    if let Some(node) = self.table.get(&key) {
                        extended.extend(node.associated.iter().copied());
                    }

                    if extended.contains(&upstream_key) {
                        // Resolution cycle: the reference degrades to the
                        // identity selector instead of recursing.
                        debug!(selector = %selector_id, upstream = %upstream_id, "cyclic selector reference, degrading to identity");
                        (
                            BoundStage::ReadState(Arc::new(|state: &serde_json::Value, _: &Params| {
                                state.clone()
                            })),
                            Arc::clone(&ctx.snapshot),
                        )
                    } else {
                        self.resolve(
                            ctx,
                            upstream_id,
                            upstream_params,
                            consumer,
                            true,
                            &extended,
                            None,
                        )?;
                        upstream_closure.push(upstream_key);
                        if let Some(dep) = self.table.get(&upstream_key) {
                            upstream_closure.extend(dep.upstreams.iter().copied());
                        }
                        let value = self
                            .read_value(ctx, &upstream_key)
                            .unwrap_or_else(|| Arc::clone(&ctx.snapshot));
                        (
                            BoundStage::Dep {
                                selector_id: upstream_id.clone(),
                                key: upstream_key,
                            },
                            value,
                        )
                    }
                }
                Stage::Combine(f) => (
                    BoundStage::Combine(Arc::clone(f)),
                    Arc::new(f(&args, &params)),
                ),
            };

            bound.push(bound_stage);
            if terminal {
                terminal_value = Some(value);
            } else {
                args.push(value);
            }
        }

        let value = terminal_value.unwrap_or_else(|| Arc::clone(&ctx.snapshot));
        if let Some(node) = self.table.get_mut(&key) {
            node.stages = bound;
            node.upstreams.extend(upstream_closure);
            node.memo.last_selected = Some(value);
            node.memo.last_args = Some(args);
            node.memo.last_state_version = Some(ctx.version);
        }

        Ok(())
    }

    /// Attach a consumer to an existing node's trigger or holder map.
    fn attach(&mut self, key: &SubscriptionKey, handle_id: HandleId, cache_only: bool) {
        if let Some(node) = self.table.get_mut(key) {
            node.attach(HandleEntry {
                handle_id,
                cache_only,
            });
        }
    }

    /// Register a consumer as holder across a node's transitive upstream
    /// closure, mirroring what dependency recursion does for a freshly
    /// built node. Detachment removes the handle from the whole associated
    /// set, so attachment has to be its exact inverse for cleanup to stay
    /// order-independent.
    fn propagate_holds(&mut self, key: &SubscriptionKey, handle_id: HandleId) {
        let upstreams: Vec<SubscriptionKey> = self
            .table
            .get(key)
            .map(|node| node.upstreams.iter().copied().collect())
            .unwrap_or_default();

        for upstream in upstreams {
            if let Some(node) = self.table.get_mut(&upstream) {
                node.attach(HandleEntry {
                    handle_id,
                    cache_only: true,
                });
            }
        }
    }

    /// Full bidirectional linkage across a resolution path: this node plus
    /// its associated set are registered into every chain ancestor, and
    /// every chain ancestor into this node.
    fn link_chain(&mut self, key: &SubscriptionKey, chain: &[SubscriptionKey]) {
        if chain.is_empty() {
            return;
        }

        let mut group: Vec<SubscriptionKey> = vec![*key];
        if let Some(node) = self.table.get(key) {
            group.extend(node.associated.iter().copied());
        }

        for ancestor in chain {
            if let Some(node) = self.table.get_mut(ancestor) {
                for member in &group {
                    if member != ancestor {
                        node.associated.insert(*member);
                    }
                }
            }
        }

        if let Some(node) = self.table.get_mut(key) {
            for ancestor in chain {
                if ancestor != key {
                    node.associated.insert(*ancestor);
                }
            }
        }
    }

    // --- Reads ---

    /// Current value of a node, recomputing at most once per state version.
    ///
    /// Returns `None` when no node lives under the key. An absent upstream
    /// referenced by a bound stage degrades to the identity fallback (the
    /// full state snapshot).
    pub fn read_value(&mut self, ctx: &GraphContext<'_>, key: &SubscriptionKey) -> Option<Selected> {
        struct ReplayPlan {
            stages: Vec<BoundStage>,
            params: Params,
            memo_on_args: bool,
            last_args: Option<Vec<Selected>>,
            last_selected: Option<Selected>,
        }

        let plan = {
            let node = self.table.get(key)?;
            if node.memo.last_state_version == Some(ctx.version) {
                if let Some(cached) = &node.memo.last_selected {
                    trace!(key = %key, version = ?ctx.version, "memo hit");
                    return Some(Arc::clone(cached));
                }
            }
            ReplayPlan {
                stages: node.stages.clone(),
                params: node.params.clone(),
                memo_on_args: node.selector.memo_on_args,
                last_args: node.memo.last_args.clone(),
                last_selected: node.memo.last_selected.clone(),
            }
        };

        trace!(key = %key, version = ?ctx.version, "replaying stages");
        let stage_count = plan.stages.len();
        let mut args: Vec<Selected> = Vec::new();
        let mut terminal_value: Option<Selected> = None;

        for (index, stage) in plan.stages.iter().enumerate() {
            let terminal = index + 1 == stage_count;

            // The terminal recomputes unconditionally per version bump
            // unless the selector memoizes on arguments, in which case it
            // reruns only when some positional argument changed identity.
            if terminal && plan.memo_on_args {
                if let (true, Some(cached)) =
                    (args_identical(&args, plan.last_args.as_deref()), &plan.last_selected)
                {
                    terminal_value = Some(Arc::clone(cached));
                    break;
                }
            }

            let value = match stage {
                BoundStage::ReadState(f) => {
                    // A re-read slice that compares equal keeps its previous
                    // allocation, so argument identity survives mutations
                    // that did not touch it.
                    let fresh = f(&ctx.snapshot, &plan.params);
                    let previous = if terminal {
                        plan.last_selected.as_ref()
                    } else {
                        plan.last_args.as_ref().and_then(|a| a.get(index))
                    };
                    match previous {
                        Some(prev) if **prev == fresh => Arc::clone(prev),
                        _ => Arc::new(fresh),
                    }
                }
                BoundStage::Dep { key: upstream_key, .. } => self
                    .read_value(ctx, upstream_key)
                    .unwrap_or_else(|| Arc::clone(&ctx.snapshot)),
                BoundStage::Combine(f) => Arc::new(f(&args, &plan.params)),
            };

            if terminal {
                terminal_value = Some(value);
            } else {
                args.push(value);
            }
        }

        let value = terminal_value.unwrap_or_else(|| Arc::clone(&ctx.snapshot));
        if let Some(node) = self.table.get_mut(key) {
            node.memo.prev_selected = node.memo.last_selected.take();
            node.memo.last_selected = Some(Arc::clone(&value));
            node.memo.last_args = Some(args);
            node.memo.last_state_version = Some(ctx.version);
        }
        Some(value)
    }

    // --- Detachment ---

    /// Cascading cleanup for one consumer handle. Idempotent: detaching an
    /// already-removed handle or node is a no-op.
    pub fn detach(&mut self, handle_id: HandleId, key: &SubscriptionKey) {
        // Phase 1: release the handle's holds across the transitive
        // associated set. Runs whether or not the root itself survives:
        // siblings may still reference the same upstreams through other
        // paths.
        let associated: Vec<SubscriptionKey> = self
            .table
            .get(key)
            .map(|node| node.associated.iter().copied().collect())
            .unwrap_or_default();

        for upstream in associated {
            if let Some(node) = self.table.get_mut(&upstream) {
                node.holders.shift_remove(&handle_id);
                if node.is_orphaned() {
                    debug!(key = %upstream, "collecting orphaned upstream subscription");
                    self.table.shift_remove(&upstream);
                }
            }
        }

        // Phase 2: the handle itself.
        self.trigger_registry.shift_remove(&handle_id);
        if let Some(node) = self.table.get_mut(key) {
            node.triggers.shift_remove(&handle_id);
            node.holders.shift_remove(&handle_id);
            if node.is_orphaned() {
                debug!(key = %key, "collecting orphaned subscription");
                self.table.shift_remove(key);
            }
        }
    }

    /// Remove every trace of a handle. Used to unwind a failed subscribe.
    pub fn purge_handle(&mut self, handle_id: HandleId) {
        self.trigger_registry.shift_remove(&handle_id);
        let keys: Vec<SubscriptionKey> = self.table.keys().copied().collect();
        for key in keys {
            if let Some(node) = self.table.get_mut(&key) {
                node.triggers.shift_remove(&handle_id);
                node.holders.shift_remove(&handle_id);
                if node.is_orphaned() {
                    self.table.shift_remove(&key);
                }
            }
        }
    }

    // --- Reparameterization ---

    /// Retarget a live handle to `(selector_id, params)` without destroying
    /// it. Frees upstream dependencies exclusive to the old target and
    /// preserves those shared with the new one. The handle's mode may
    /// change: `old_cache_only` is the role being released,
    /// `new_cache_only` the role attached to the new target.
    #[allow(clippy::too_many_arguments)]
    pub fn reparameterize(
        &mut self,
        ctx: &GraphContext<'_>,
        handle_id: HandleId,
        old_cache_only: bool,
        new_cache_only: bool,
        old_key: &SubscriptionKey,
        old_params_id: &ParamsId,
        selector_id: &SelectorId,
        params: Params,
        validator: Option<&SubscriptionValidator>,
    ) -> Result<(SubscriptionKey, ParamsId)> {
        let (_, new_params_id) = derive_ids(selector_id, &params)?;
        if new_params_id == *old_params_id {
            // Params changed but their derived key did not: parameter
            // serialization defect. Raised before any graph mutation.
            return Err(StoreError::ParamsKeyUnchanged {
                selector: selector_id.clone(),
                params_id: new_params_id,
            });
        }

        let (new_key, new_params_id) =
            self.resolve(ctx, selector_id, params, handle_id, new_cache_only, &[], validator)?;

        // What the new resolution holds: the new root and its transitive
        // upstream closure.
        let mut new_holds: Vec<SubscriptionKey> = vec![new_key];
        if let Some(node) = self.table.get(&new_key) {
            new_holds.extend(node.upstreams.iter().copied());
        }
        let old_associated: Vec<SubscriptionKey> = self
            .table
            .get(old_key)
            .map(|node| node.associated.iter().copied().collect())
            .unwrap_or_default();

        // Release upstreams exclusive to the old target; nodes shared with
        // the new target are already held by the new resolution and stay
        // untouched.
        for upstream in old_associated {
            if new_holds.contains(&upstream) {
                continue;
            }
            if let Some(node) = self.table.get_mut(&upstream) {
                node.holders.shift_remove(&handle_id);
                if node.is_orphaned() {
                    debug!(key = %upstream, "collecting upstream exclusive to old target");
                    self.table.shift_remove(&upstream);
                }
            }
        }

        // Release the handle's old role on the previous root. A cache-only
        // handle whose old root is an upstream of the new target keeps its
        // holder entry: the new resolution re-used it.
        let old_root_shared = new_holds.contains(old_key);
        if let Some(node) = self.table.get_mut(old_key) {
            if old_cache_only {
                if !old_root_shared {
                    node.holders.shift_remove(&handle_id);
                }
            } else {
                node.triggers.shift_remove(&handle_id);
            }
            if node.is_orphaned() {
                debug!(key = %old_key, "collecting old target subscription");
                self.table.shift_remove(old_key);
            }
        }

        // Retarget the registry entry in place: same handle, same slot.
        // A mode change enters or leaves the registry instead.
        if new_cache_only {
            self.trigger_registry.shift_remove(&handle_id);
        } else if let Some(target) = self.trigger_registry.get_mut(&handle_id) {
            target.selector_id = selector_id.clone();
            target.subscription_key = new_key;
            target.params_id = new_params_id.clone();
        } else {
            self.register_trigger(HandleTarget {
                handle_id,
                selector_id: selector_id.clone(),
                subscription_key: new_key,
                params_id: new_params_id.clone(),
            });
        }

        Ok((new_key, new_params_id))
    }

    // --- Registry ---

    /// Record a live non-cache-only handle, in subscribe order.
    pub fn register_trigger(&mut self, target: HandleTarget) {
        self.trigger_registry.insert(target.handle_id, target);
    }

    // --- Introspection ---

    pub fn subscription_count(&self) -> usize {
        self.table.len()
    }

    pub fn trigger_count(&self) -> usize {
        self.trigger_registry.len()
    }

    /// Live subscription keys in creation order.
    pub fn subscription_keys(&self) -> Vec<SubscriptionKey> {
        self.table.keys().copied().collect()
    }

    /// Live trigger targets in subscribe order.
    pub fn trigger_targets(&self) -> Vec<HandleTarget> {
        self.trigger_registry.values().cloned().collect()
    }

    /// Snapshots of every live node, in creation order.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.table
            .values()
            .map(|node| {
                let value_changed = match (&node.memo.last_selected, &node.memo.prev_selected) {
                    (Some(last), Some(prev)) => !Arc::ptr_eq(last, prev),
                    (Some(_), None) => true,
                    _ => false,
                };
                SubscriptionInfo {
                    key: node.key,
                    selector_id: node.selector_id.clone(),
                    params_id: node.params_id.clone(),
                    trigger_count: node.triggers.len(),
                    holder_count: node.holders.len(),
                    keep_memo: node.selector.keep_memo,
                    value_changed,
                }
            })
            .collect()
    }

    /// (trigger, holder) counts of one node.
    pub fn consumers(&self, key: &SubscriptionKey) -> Option<(usize, usize)> {
        self.table
            .get(key)
            .map(|node| (node.triggers.len(), node.holders.len()))
    }

    /// Transitive associated set of one node, in registration order.
    pub fn associated_keys(&self, key: &SubscriptionKey) -> Option<Vec<SubscriptionKey>> {
        self.table
            .get(key)
            .map(|node| node.associated.iter().copied().collect())
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.table.contains_key(key)
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            subscription_count: self.table.len(),
            trigger_count: self.trigger_registry.len(),
            holder_count: self.table.values().map(|node| node.holders.len()).sum(),
            idle_keep_memo_count: self.table.values().filter(|node| node.is_idle()).count(),
        }
    }
}

/// Positional identity comparison against the previous computation's args.
fn args_identical(current: &[Selected], last: Option<&[Selected]>) -> bool {
    match last {
        Some(last) => {
            last.len() == current.len()
                && current.iter().zip(last).all(|(a, b)| Arc::ptr_eq(a, b))
        }
        None => false,
    }
}

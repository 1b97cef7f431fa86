//! Subscription nodes: live, memoized, reference-counted selector instances.

use crate::selectors::{CombineFn, ReadStateFn, Selector};
use crate::types::{
    HandleId, Params, ParamsId, Selected, SelectorId, StateVersion, SubscriptionKey,
};
use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::sync::Arc;

/// One consumer's entry in a node's trigger or holder map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HandleEntry {
    pub handle_id: HandleId,
    /// Holders keep the node alive without change notification.
    pub cache_only: bool,
}

/// A compute stage bound to one subscription, with selector references
/// resolved to concrete upstream keys.
#[derive(Clone)]
pub(crate) enum BoundStage {
    ReadState(ReadStateFn),
    /// Upstream subscription resolved during construction.
    Dep {
        selector_id: SelectorId,
        key: SubscriptionKey,
    },
    Combine(CombineFn),
}

impl fmt::Debug for BoundStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundStage::ReadState(_) => write!(f, "ReadState"),
            BoundStage::Dep { selector_id, key } => {
                write!(f, "Dep({}, {:?})", selector_id, key)
            }
            BoundStage::Combine(_) => write!(f, "Combine"),
        }
    }
}

/// Memoization slots of one node.
#[derive(Default)]
pub(crate) struct MemoState {
    /// Value of the last completed computation. Cache hits hand out this
    /// exact `Arc`.
    pub last_selected: Option<Selected>,
    /// Value preceding `last_selected`, for change diffing at the boundary.
    pub prev_selected: Option<Selected>,
    /// Positional terminal arguments of the last computation.
    pub last_args: Option<Vec<Selected>>,
    /// State version the memo is valid for.
    pub last_state_version: Option<StateVersion>,
}

/// A live evaluation of one selector against one resolved parameter set.
///
/// Owned exclusively by the graph's subscription table; handles and other
/// nodes refer to it by key only.
pub(crate) struct Subscription {
    pub key: SubscriptionKey,
    pub selector_id: SelectorId,
    pub params_id: ParamsId,
    pub params: Params,
    pub selector: Arc<Selector>,

    /// Stages bound to this node's parameters. Filled at construction.
    pub stages: Vec<BoundStage>,

    /// Consumers requiring change notification, in subscribe order.
    pub triggers: IndexMap<HandleId, HandleEntry>,

    /// Consumers keeping the value alive without notification, in
    /// attachment order.
    pub holders: IndexMap<HandleId, HandleEntry>,

    /// Every node on the resolution paths this node participates in,
    /// direct and transitive, registered mutually.
    pub associated: IndexSet<SubscriptionKey>,

    /// Transitive upstream closure this node's computation reads through.
    /// Consumers attaching here are registered as holders across it.
    pub upstreams: IndexSet<SubscriptionKey>,

    pub memo: MemoState,
}

impl Subscription {
    pub fn new(
        key: SubscriptionKey,
        selector: Arc<Selector>,
        params_id: ParamsId,
        params: Params,
    ) -> Self {
        Self {
            key,
            selector_id: selector.id.clone(),
            params_id,
            params,
            selector,
            stages: Vec::new(),
            triggers: IndexMap::new(),
            holders: IndexMap::new(),
            associated: IndexSet::new(),
            upstreams: IndexSet::new(),
            memo: MemoState::default(),
        }
    }

    /// Attach a consumer to the trigger or holder map per its mode.
    pub fn attach(&mut self, entry: HandleEntry) {
        if entry.cache_only {
            self.holders.insert(entry.handle_id, entry);
        } else {
            self.triggers.insert(entry.handle_id, entry);
        }
    }

    /// Total attached consumers.
    pub fn consumer_count(&self) -> usize {
        self.triggers.len() + self.holders.len()
    }

    /// Zero consumers and not pinned: eligible for removal.
    pub fn is_orphaned(&self) -> bool {
        self.triggers.is_empty() && self.holders.is_empty() && !self.selector.keep_memo
    }

    /// Zero consumers but retained because `keep_memo` pins the node.
    pub fn is_idle(&self) -> bool {
        self.triggers.is_empty() && self.holders.is_empty() && self.selector.keep_memo
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("selector_id", &self.selector_id)
            .field("params_id", &self.params_id)
            .field("triggers", &self.triggers.len())
            .field("holders", &self.holders.len())
            .field("associated", &self.associated.len())
            .finish()
    }
}

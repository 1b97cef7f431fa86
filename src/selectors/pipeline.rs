//! Selector pipelines: ordered compute stages with memoization flags.

use crate::types::{Params, Selected, SelectorId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Stage function evaluated against the raw state snapshot.
pub type ReadStateFn = Arc<dyn Fn(&serde_json::Value, &Params) -> serde_json::Value + Send + Sync>;

/// Terminal/combinator function receiving all prior stage outputs plus the
/// subscription's own parameters.
pub type CombineFn = Arc<dyn Fn(&[Selected], &Params) -> serde_json::Value + Send + Sync>;

/// Maps a downstream subscription's params to the params of one upstream
/// selector.
pub type ProjectorFn = Arc<dyn Fn(&Params) -> Params + Send + Sync>;

/// One compute stage of a selector pipeline.
#[derive(Clone)]
pub enum Stage {
    /// Projects directly from the raw state snapshot.
    ReadState(ReadStateFn),
    /// Pulls the cached value of another selector's live subscription.
    SelectorRef(SelectorId),
    /// Combines the outputs of all prior stages.
    Combine(CombineFn),
}

impl Stage {
    pub fn read_state<F>(f: F) -> Self
    where
        F: Fn(&serde_json::Value, &Params) -> serde_json::Value + Send + Sync + 'static,
    {
        Stage::ReadState(Arc::new(f))
    }

    pub fn selector_ref(id: impl Into<SelectorId>) -> Self {
        Stage::SelectorRef(id.into())
    }

    pub fn combine<F>(f: F) -> Self
    where
        F: Fn(&[Selected], &Params) -> serde_json::Value + Send + Sync + 'static,
    {
        Stage::Combine(Arc::new(f))
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ReadState(_) => write!(f, "ReadState"),
            Stage::SelectorRef(id) => write!(f, "SelectorRef({})", id),
            Stage::Combine(_) => write!(f, "Combine"),
        }
    }
}

/// A compiled derivation pipeline over store state.
///
/// Immutable once registered. The final stage is the terminal; every prior
/// stage feeds it one positional argument.
#[derive(Clone)]
pub struct Selector {
    /// Registry identity.
    pub id: SelectorId,

    /// Declared parameter-signature name. Downstream selectors key their
    /// projectors by this name.
    pub signature: Option<String>,

    /// Ordered compute stages.
    pub stages: Vec<Stage>,

    /// Parameter projectors keyed by an upstream selector's signature name.
    pub projectors: HashMap<String, ProjectorFn>,

    /// Re-run the terminal stage only when some positional argument differs
    /// by identity from the previous computation. Meaningful for combinator
    /// terminals; single-stage selectors have no positional arguments and
    /// should leave this off.
    pub memo_on_args: bool,

    /// Retain the subscription (and its cached value) when the last
    /// consumer detaches.
    pub keep_memo: bool,
}

impl Selector {
    /// Single-stage selector evaluating one read against the state.
    pub fn reader<F>(id: impl Into<SelectorId>, f: F) -> Self
    where
        F: Fn(&serde_json::Value, &Params) -> serde_json::Value + Send + Sync + 'static,
    {
        Self::pipeline(id, vec![Stage::read_state(f)])
    }

    /// Multi-stage selector from an explicit stage list.
    pub fn pipeline(id: impl Into<SelectorId>, stages: Vec<Stage>) -> Self {
        Self {
            id: id.into(),
            signature: None,
            stages,
            projectors: HashMap::new(),
            memo_on_args: false,
            keep_memo: false,
        }
    }

    /// The identity selector: returns the full state unchanged. Used as the
    /// fallback when a selector id is not registered.
    pub fn identity(id: impl Into<SelectorId>) -> Self {
        Self::reader(id, |state, _| state.clone())
    }

    /// Declare this selector's parameter-signature name.
    pub fn with_signature(mut self, name: impl Into<String>) -> Self {
        self.signature = Some(name.into());
        self
    }

    /// Attach a projector for the upstream selector with the given
    /// signature name.
    pub fn with_projector<F>(mut self, upstream_signature: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Params) -> Params + Send + Sync + 'static,
    {
        self.projectors.insert(upstream_signature.into(), Arc::new(f));
        self
    }

    pub fn with_memo_on_args(mut self) -> Self {
        self.memo_on_args = true;
        self
    }

    pub fn with_keep_memo(mut self) -> Self {
        self.keep_memo = true;
        self
    }

    /// Whether any stage references another selector.
    pub fn is_composed(&self) -> bool {
        self.stages
            .iter()
            .any(|s| matches!(s, Stage::SelectorRef(_)))
    }

    /// Projector for an upstream selector, looked up by its signature name.
    pub fn projector_for(&self, upstream_signature: Option<&str>) -> Option<&ProjectorFn> {
        upstream_signature.and_then(|name| self.projectors.get(name))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("id", &self.id)
            .field("signature", &self.signature)
            .field("stages", &self.stages)
            .field("memo_on_args", &self.memo_on_args)
            .field("keep_memo", &self.keep_memo)
            .finish()
    }
}

//! Selector registry with identity fallback.

use crate::error::{Result, StoreError};
use crate::types::SelectorId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::pipeline::Selector;

/// Holds the compiled selector pipelines for one store.
///
/// Lookup never fails: an unregistered id falls back to the identity
/// selector, which returns the full state unchanged.
pub struct SelectorRegistry {
    selectors: RwLock<HashMap<SelectorId, Arc<Selector>>>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        Self {
            selectors: RwLock::new(HashMap::new()),
        }
    }

    /// Register a compiled selector. Ids are unique per store.
    pub fn register(&self, selector: Selector) -> Result<()> {
        let mut selectors = self.selectors.write();
        if selectors.contains_key(&selector.id) {
            return Err(StoreError::SelectorExists(selector.id));
        }
        selectors.insert(selector.id.clone(), Arc::new(selector));
        Ok(())
    }

    /// Look up a selector, falling back to the identity selector when the
    /// id is unknown.
    pub fn lookup(&self, id: &SelectorId) -> Arc<Selector> {
        if let Some(selector) = self.selectors.read().get(id) {
            return Arc::clone(selector);
        }
        Arc::new(Selector::identity(id.clone()))
    }

    /// Whether a selector is registered under this id.
    pub fn contains(&self, id: &SelectorId) -> bool {
        self.selectors.read().contains_key(id)
    }

    /// Number of registered selectors.
    pub fn len(&self) -> usize {
        self.selectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.read().is_empty()
    }
}

impl Default for SelectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Params;
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let registry = SelectorRegistry::new();
        registry
            .register(Selector::reader("value", |state, _| state["value"].clone()))
            .unwrap();

        assert!(registry.contains(&SelectorId::from("value")));
        let selector = registry.lookup(&SelectorId::from("value"));
        assert_eq!(selector.id, SelectorId::from("value"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = SelectorRegistry::new();
        registry
            .register(Selector::reader("value", |state, _| state.clone()))
            .unwrap();

        let result = registry.register(Selector::reader("value", |state, _| state.clone()));
        assert!(matches!(result, Err(StoreError::SelectorExists(_))));
    }

    #[test]
    fn test_unknown_id_falls_back_to_identity() {
        let registry = SelectorRegistry::new();
        let selector = registry.lookup(&SelectorId::from("missing"));

        let state = json!({"value": 9});
        match &selector.stages[0] {
            super::super::pipeline::Stage::ReadState(f) => {
                assert_eq!(f(&state, &Params::none()), state)
            }
            other => panic!("expected ReadState, got {:?}", other),
        }
    }
}

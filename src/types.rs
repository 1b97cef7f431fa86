//! Core types for the subscription graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name of a registered selector pipeline.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SelectorId(pub String);

impl SelectorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SelectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SelectorId({})", self.0)
    }
}

impl fmt::Display for SelectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SelectorId {
    fn from(s: &str) -> Self {
        SelectorId(s.to_string())
    }
}

impl From<String> for SelectorId {
    fn from(s: String) -> Self {
        SelectorId(s)
    }
}

/// Stable derived key for one concrete parameter list (canonical JSON).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamsId(pub String);

impl fmt::Debug for ParamsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParamsId({})", self.0)
    }
}

impl fmt::Display for ParamsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique key of a live subscription: SHA-256 over (selector id, params id).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey(pub [u8; 32]);

impl SubscriptionKey {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(SubscriptionKey(arr))
    }
}

impl fmt::Debug for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionKey({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Arena-allocated identity of one consumer's hook handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId({})", self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic counter bumped on every state mutation. Sole cache-validity signal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct StateVersion(pub u64);

impl StateVersion {
    pub fn next(self) -> Self {
        StateVersion(self.0 + 1)
    }
}

impl fmt::Debug for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A memoized selected value. Cache hits return the same allocation,
/// so identity comparisons are `Arc::ptr_eq`.
pub type Selected = Arc<serde_json::Value>;

/// Ordered concrete parameter values for one subscription.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Params(pub Vec<serde_json::Value>);

impl Params {
    /// No parameters.
    pub fn none() -> Self {
        Params(Vec::new())
    }

    pub fn new(values: Vec<serde_json::Value>) -> Self {
        Params(values)
    }

    /// Positional parameter accessor.
    pub fn get(&self, index: usize) -> Option<&serde_json::Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.0.iter()
    }
}

impl From<Vec<serde_json::Value>> for Params {
    fn from(values: Vec<serde_json::Value>) -> Self {
        Params(values)
    }
}

/// Status slot on the state holder.
///
/// Flips to `Selecting` for the duration of the outermost subscription
/// construction only; nested recursive resolutions do not re-toggle it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreStatus {
    Ready,
    Selecting,
}

impl Default for StoreStatus {
    fn default() -> Self {
        StoreStatus::Ready
    }
}

/// Snapshot of graph occupancy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live subscription nodes in the table.
    pub subscription_count: usize,
    /// Non-cache-only handles in the trigger registry.
    pub trigger_count: usize,
    /// Holder entries across all nodes.
    pub holder_count: usize,
    /// Nodes retained with zero consumers because `keep_memo` is set.
    pub idle_keep_memo_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_version_advances() {
        let v = StateVersion(5);
        assert_eq!(v.next(), StateVersion(6));
        assert!(v < v.next());
    }

    #[test]
    fn test_params_positional_access() {
        let params = Params::new(vec![json!("alice"), json!(42)]);
        assert_eq!(params.get(0), Some(&json!("alice")));
        assert_eq!(params.get(1), Some(&json!(42)));
        assert_eq!(params.get(2), None);
        assert_eq!(params.len(), 2);
        assert!(Params::none().is_empty());
    }

    #[test]
    fn test_subscription_key_hex_roundtrip() {
        let key = SubscriptionKey([7u8; 32]);
        let parsed = SubscriptionKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, parsed);
    }
}

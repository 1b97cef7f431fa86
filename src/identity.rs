//! Identity derivation for subscriptions.
//!
//! Pure mapping from (selector id, concrete params) to the pair of stable
//! keys the graph is indexed by: the params id (canonical JSON of the
//! ordered parameter list) and the subscription key (SHA-256 over the
//! selector id and the params id). Distinguishable parameter lists produce
//! distinct params ids, so keys never collide across parameters of the same
//! selector.

use crate::error::Result;
use crate::types::{Params, ParamsId, SelectorId, SubscriptionKey};
use sha2::{Digest, Sha256};

/// Derive the (subscription key, params id) pair for a selector invocation.
pub fn derive_ids(selector_id: &SelectorId, params: &Params) -> Result<(SubscriptionKey, ParamsId)> {
    let params_id = derive_params_id(params)?;
    let key = derive_subscription_key(selector_id, &params_id);
    Ok((key, params_id))
}

/// Canonical JSON of the ordered parameter list.
///
/// `serde_json` object maps are sorted, so equal values always serialize to
/// the same string and distinct values to distinct strings.
pub fn derive_params_id(params: &Params) -> Result<ParamsId> {
    let canonical = serde_json::to_string(&params.0)?;
    Ok(ParamsId(canonical))
}

/// SHA-256 over the length-prefixed selector id followed by the params id.
///
/// The length prefix keeps (id, params) pairs with coinciding concatenations
/// apart.
fn derive_subscription_key(selector_id: &SelectorId, params_id: &ParamsId) -> SubscriptionKey {
    let mut hasher = Sha256::new();
    hasher.update((selector_id.0.len() as u64).to_le_bytes());
    hasher.update(selector_id.0.as_bytes());
    hasher.update(params_id.0.as_bytes());
    SubscriptionKey(hasher.finalize().into())
}

//! Error types for the subscription graph.

use crate::types::{ParamsId, SelectorId, SubscriptionKey};
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Selector already registered: {0}")]
    SelectorExists(SelectorId),

    #[error("Subscription rejected by validator: {selector} ({reason})")]
    ValidationRejected { selector: SelectorId, reason: String },

    #[error("Reparameterize produced an unchanged params key for {selector}: {params_id} (parameter serialization defect)")]
    ParamsKeyUnchanged {
        selector: SelectorId,
        params_id: ParamsId,
    },

    #[error("Handle is detached from its store")]
    HandleDetached,

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionKey),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

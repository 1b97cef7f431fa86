//! # Facet
//!
//! A memoized, reference-counted selector subscription graph for in-memory
//! stores.
//!
//! ## Core Concepts
//!
//! - **Selectors**: Named derivation pipelines over store state, optionally
//!   parameterized and composed from other selectors
//! - **Subscriptions**: Live, memoized evaluations of a selector against one
//!   resolved parameter set, shared across consumers and recomputed at most
//!   once per state version
//! - **Triggers and holders**: Consumers needing change notification versus
//!   consumers merely keeping a value alive as a dependency
//! - **Garbage collection**: Cascading, order-independent removal of a node
//!   exactly when its last consumer detaches
//!
//! ## Example
//!
//! ```ignore
//! use facet::{Params, Selector, Store, StoreConfig};
//! use serde_json::json;
//!
//! let store = Store::new(StoreConfig {
//!     name: "app".to_string(),
//!     initial_state: json!({ "value": 0 }),
//! });
//!
//! store.register_selector(Selector::reader("value", |state, _| {
//!     state["value"].clone()
//! }))?;
//!
//! // Subscribe a consumer
//! let mut handle = store.subscribe("value", Params::none())?;
//!
//! // Mutate state; the next read recomputes once against the new version
//! store.mutate(|state| state["value"] = json!(1));
//! let value = store.select(&mut handle)?;
//!
//! handle.unsubscribe();
//! ```

pub mod error;
pub mod graph;
pub mod identity;
pub mod selectors;
pub mod state;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use graph::{HandleTarget, HookHandle, SubscriptionInfo};
pub use identity::{derive_ids, derive_params_id};
pub use selectors::{CombineFn, ProjectorFn, ReadStateFn, Selector, SelectorRegistry, Stage};
pub use state::StateHolder;
pub use store::{Store, StoreConfig, SubscribeOptions, SubscriptionValidator};
pub use types::*;

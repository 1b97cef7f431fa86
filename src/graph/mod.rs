//! The subscription graph: nodes, consumer handles, and the graph manager.
//!
//! Subscriptions are live, memoized, reference-counted evaluations of
//! selectors. The manager maintains the per-store subscription table and
//! trigger registry, resolves composed selectors into upstream dependency
//! nodes, and garbage-collects each node exactly when its last consumer
//! detaches.

mod handle;
pub(crate) mod manager;
pub(crate) mod subscription;

pub use handle::HookHandle;
pub use manager::{HandleTarget, SubscriptionInfo};

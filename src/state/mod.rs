//! Store state holder: snapshot, version counter, status slot.

mod holder;

pub use holder::StateHolder;

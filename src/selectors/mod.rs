//! Selector pipelines and the per-store registry.

mod pipeline;
mod registry;

pub use pipeline::{CombineFn, ProjectorFn, ReadStateFn, Selector, Stage};
pub use registry::SelectorRegistry;

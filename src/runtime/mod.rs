//! Runtime support for reactive primitives.
//!
//! This module provides the infrastructure for dependency tracking,
//! reactive graph management, batching, and execution contexts.

mod context;

pub use context::{ReactiveRuntime, RuntimeInner};

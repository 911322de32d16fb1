//! Fine-grained reactive primitives.
//!
//! This module provides the core building blocks for reactive programming:
//! - Signals: Reactive state containers
//! - Memos: Cached computed values
//! - Effects and watches: Side effects that react to changes

mod effect;
mod memo;
mod signal;

pub use effect::{batch, untrack, Effect, Watch};
pub use memo::Memo;
pub use signal::Signal;

//! Plugins bundled with the crate.
//!
//! - [`PersistPlugin`]: saves opted-in stores to a [`StateStorage`] and
//!   restores them when they are next assembled.

mod persist;

pub use persist::{MemoryStorage, PersistPlugin, StateStorage, PERSIST_KEY_OPTION, PERSIST_OPTION};

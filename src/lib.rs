//! # Larder
//!
//! Named singleton stores on top of a fine-grained reactive runtime.
//!
//! Larder is organised in two layers:
//!
//! ## Signals (Low-level primitives)
//!
//! Fine-grained reactive primitives the stores are built from:
//! - `Signal<T>` - Reactive values that notify dependents when changed
//! - `Memo<T>` - Lazily computed, cached values that track their dependencies
//! - `Effect` / `Watch` - Side effects that run when dependencies change
//! - `batch` - Defer effects until a group of writes is complete
//!
//! ## Stores (High-level state management)
//!
//! - `define_store` - Describe a store: state factory, actions, getters, options
//! - `App` + `Registry` - One assembled instance per store id per application
//! - `Store` - State fields, bound actions, cached getters, `reset`, `subscribe`
//! - `Plugin` - Hooks run once per assembled store (see [`plugins`])
//!
//! ```
//! use larder::{create_registry, define_store, App, RegistryConfig, StoreError};
//! use serde_json::json;
//!
//! let counter = define_store("counter")
//!     .state(|| Ok(json!({ "count": 0 }).as_object().cloned().unwrap_or_default()))
//!     .action("increment", |store, _| {
//!         let count = store.get("count").and_then(|c| c.as_i64()).unwrap_or(0);
//!         store.set("count", count + 1)?;
//!         Ok(json!(count + 1))
//!     })
//!     .getter("double", |store| {
//!         json!(store.get("count").and_then(|c| c.as_i64()).unwrap_or(0) * 2)
//!     })
//!     .build()?;
//!
//! let app = App::new();
//! app.install(create_registry(RegistryConfig::new()))?;
//!
//! app.run(|| -> Result<(), StoreError> {
//!     let store = counter.use_store()?;
//!     store.call("increment", &[])?;
//!     assert_eq!(store.getter("double")?, json!(2));
//!     store.reset();
//!     assert_eq!(store.get("count"), Some(json!(0)));
//!     Ok(())
//! })?;
//! # Ok::<(), StoreError>(())
//! ```

pub mod app;
pub mod error;
pub mod plugins;
pub mod runtime;
pub mod signal;
pub mod store;

// Re-export main types for convenience
pub use app::{use_store, App};
pub use error::{Result, StoreError};
pub use signal::{batch, untrack, Effect, Memo, Signal, Watch};
pub use store::{
    create_registry, define_store, Field, MutationInfo, MutationKind, Plugin, PluginContext,
    Registry, RegistryConfig, StateMap, Store, StoreBuilder, StoreDefinition, Unsubscribe,
};

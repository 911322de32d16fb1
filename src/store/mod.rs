//! Named stores: definition, assembly, subscriptions, plugins and the registry.
//!
//! A [`StoreDefinition`] describes a store. The first time it is used inside
//! an application, the application's [`Registry`] assembles it into a
//! [`Store`] by running the state factory, wrapping the state field by field
//! in signals, binding actions, wiring getters as memos and finally running
//! every registered [`Plugin`]. Later lookups return the same instance.

mod definition;
mod field;
mod plugin;
mod registry;
mod state;
mod store;
mod subscription;

pub use definition::{define_store, StoreBuilder, StoreDefinition};
pub use field::Field;
pub use plugin::{Plugin, PluginContext};
pub use registry::{create_registry, Registry, RegistryConfig};
pub use state::StateMap;
pub use store::Store;
pub use subscription::{MutationInfo, MutationKind, Unsubscribe};

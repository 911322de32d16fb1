use super::definition::StoreDefinition;
use super::plugin::{Plugin, PluginContext};
use super::store::{assemble, Store};
use crate::app::App;
use crate::error::{Result, StoreError};
use crate::runtime::ReactiveRuntime;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Options applied to every store a registry assembles.
#[derive(Clone, Default)]
pub struct RegistryConfig {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin. Plugins run in the order they were added.
    pub fn plugin<P>(mut self, plugin: P) -> Self
    where
        P: Plugin + 'static,
    {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Append a closure plugin.
    pub fn plugin_fn<F>(self, plugin: F) -> Self
    where
        F: Fn(&PluginContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.plugin(plugin)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

/// Create a registry with the given configuration.
pub fn create_registry(config: RegistryConfig) -> Registry {
    Registry::new(config)
}

/// Per-application map from store id to its single assembled instance.
///
/// Stores are assembled lazily on first lookup and cached for the lifetime
/// of the registry. A failed assembly caches nothing.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    stores: Mutex<HashMap<String, Store>>,
    plugins: Vec<Arc<dyn Plugin>>,
    // Set once the registry is installed on an application
    bound: AtomicBool,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                stores: Mutex::new(HashMap::new()),
                plugins: config.plugins,
                bound: AtomicBool::new(false),
            }),
        }
    }

    /// Return the store for `definition`, assembling it on first use.
    ///
    /// Assembly runs in `app`'s reactive runtime. The registry lock is not
    /// held while assembling, so actions, getters and plugins may look up
    /// other stores.
    pub fn use_store(&self, app: &App, definition: &StoreDefinition) -> Result<Store> {
        let id = definition.id();
        if let Some(store) = self.get(id) {
            trace!(store = %id, "registry hit");
            return Ok(store);
        }

        let store = ReactiveRuntime::with_runtime(app.runtime(), || {
            assemble(definition, app, &self.inner.plugins)
        })
        .map_err(|err| {
            debug!(store = %id, error = %err, "store assembly failed");
            err
        })?;

        // Keep the first instance if a nested lookup already registered one
        let mut stores = self.inner.stores.lock();
        Ok(stores.entry(id.to_string()).or_insert(store).clone())
    }

    /// Claim the registry for one application. Fails if it was claimed before.
    pub(crate) fn bind(&self) -> Result<()> {
        if self.inner.bound.swap(true, Ordering::SeqCst) {
            return Err(StoreError::RegistryInUse);
        }
        Ok(())
    }

    pub(crate) fn unbind(&self) {
        self.inner.bound.store(false, Ordering::SeqCst);
    }

    /// Whether the registry has been installed on an application.
    pub fn is_installed(&self) -> bool {
        self.inner.bound.load(Ordering::SeqCst)
    }

    /// The already assembled store with this id, if any.
    pub fn get(&self, id: &str) -> Option<Store> {
        self.inner.stores.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.stores.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all assembled stores, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.stores.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn plugin_count(&self) -> usize {
        self.inner.plugins.len()
    }

    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("stores", &self.ids())
            .field("plugins", &self.inner.plugins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{define_store, StateMap};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn lookup_assembles_once() {
        let app = App::new();
        let registry = create_registry(RegistryConfig::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let definition = define_store("once")
            .state({
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"n": 0}).as_object().cloned().unwrap_or_default())
                }
            })
            .build()
            .expect("definition");

        let first = registry.use_store(&app, &definition).expect("first");
        let second = registry.use_store(&app, &definition).expect("second");
        assert!(first.ptr_eq(&second));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(registry.ids(), vec!["once".to_string()]);
    }

    #[test]
    fn failed_assembly_is_not_cached() {
        let app = App::new();
        let registry = Registry::new(RegistryConfig::new().plugin_fn(|ctx| {
            if ctx.options.option("reject").is_some() {
                return Err(StoreError::application("rejected"));
            }
            Ok(())
        }));
        let definition = define_store("guarded")
            .option("reject", true)
            .build()
            .expect("definition");

        assert!(matches!(
            registry.use_store(&app, &definition),
            Err(StoreError::Plugin { index: 0, .. })
        ));
        assert!(registry.is_empty());
        assert!(!registry.contains("guarded"));
    }

    #[test]
    fn stores_can_use_other_stores_during_assembly() {
        let app = App::new();
        let registry = Registry::new(RegistryConfig::new());
        let inner = define_store("inner")
            .state(|| Ok(json!({"v": 1}).as_object().cloned().unwrap_or_default()))
            .build()
            .expect("definition");
        let outer = define_store("outer")
            .state({
                let registry = registry.clone();
                let app = app.clone();
                let inner = inner.clone();
                move || {
                    let dep = registry.use_store(&app, &inner)?;
                    let mut state = StateMap::new();
                    state.insert("copied".to_string(), dep.peek("v").unwrap_or_default());
                    Ok(state)
                }
            })
            .build()
            .expect("definition");

        let store = registry.use_store(&app, &outer).expect("outer");
        assert_eq!(store.get("copied"), Some(json!(1)));
        assert_eq!(registry.ids(), vec!["inner".to_string(), "outer".to_string()]);
    }
}

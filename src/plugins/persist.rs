use crate::error::{Result, StoreError};
use crate::store::{Plugin, PluginContext};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Store option that opts a store into persistence.
pub const PERSIST_OPTION: &str = "persist";

/// Store option overriding the storage key (defaults to the store id).
pub const PERSIST_KEY_OPTION: &str = "persist_key";

/// Backing storage for persisted state snapshots, as serialized JSON text.
pub trait StateStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, data: &str) -> Result<()>;
}

/// In-memory [`StateStorage`]. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed snapshot stored under `key`.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        let raw = self.entries.lock().get(key).cloned()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn save(&self, key: &str, data: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), data.to_string());
        Ok(())
    }
}

/// Restores a store's state from storage when it is assembled and saves it
/// after every change.
///
/// Only stores defined with `.option("persist", true)` are touched.
///
/// # Example
///
/// ```
/// use larder::plugins::{MemoryStorage, PersistPlugin};
/// use larder::{create_registry, define_store, App, RegistryConfig, StoreError};
///
/// let storage = MemoryStorage::new();
/// let app = App::new();
/// app.install(create_registry(
///     RegistryConfig::new().plugin(PersistPlugin::new(storage.clone())),
/// ))?;
///
/// let prefs = define_store("prefs").option("persist", true).build()?;
/// let store = app.use_store(&prefs)?;
/// store.set("theme", "dark")?;
///
/// assert_eq!(storage.snapshot("prefs"), Some(serde_json::json!({"theme": "dark"})));
/// # Ok::<(), StoreError>(())
/// ```
pub struct PersistPlugin<S> {
    storage: Arc<S>,
}

impl<S: StateStorage> PersistPlugin<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }
}

impl<S: StateStorage + 'static> Plugin for PersistPlugin<S> {
    fn apply(&self, ctx: &PluginContext<'_>) -> Result<()> {
        let enabled = ctx
            .options
            .option(PERSIST_OPTION)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !enabled {
            return Ok(());
        }

        let key = ctx
            .options
            .option(PERSIST_KEY_OPTION)
            .and_then(Value::as_str)
            .unwrap_or(ctx.id)
            .to_string();

        if let Some(raw) = self.storage.load(&key)? {
            match serde_json::from_str::<Value>(&raw)? {
                Value::Object(saved) => {
                    debug!(store = %ctx.id, key = %key, fields = saved.len(), "restoring persisted state");
                    ctx.store.patch(|state| state.extend(saved))?;
                }
                other => {
                    return Err(StoreError::Storage(format!(
                        "persisted state for `{key}` is not an object: {other}"
                    )));
                }
            }
        }

        let storage = Arc::clone(&self.storage);
        ctx.store.subscribe(move |mutation, state| {
            let saved = serde_json::to_string(state)
                .map_err(StoreError::from)
                .and_then(|data| storage.save(&key, &data));
            if let Err(err) = saved {
                warn!(store = %mutation.store_id, key = %key, error = %err, "failed to persist state");
            }
        });
        Ok(())
    }
}

use super::state::StateMap;
use super::store::Store;
use crate::error::{Result, StoreError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub(crate) type StateFactory = Arc<dyn Fn() -> Result<StateMap> + Send + Sync>;
pub(crate) type ActionFn = Arc<dyn Fn(&Store, &[Value]) -> Result<Value> + Send + Sync>;
pub(crate) type GetterFn = Arc<dyn Fn(&Store) -> Value + Send + Sync>;

/// Immutable description of a store: how to build its state, its actions,
/// its getters, and free-form options for plugins.
///
/// Definitions are cheap to clone. The store itself is only assembled on
/// the first [`use_store`](Self::use_store) inside an application.
#[derive(Clone)]
pub struct StoreDefinition {
    inner: Arc<DefinitionInner>,
}

struct DefinitionInner {
    id: String,
    state: StateFactory,
    actions: BTreeMap<String, ActionFn>,
    getters: BTreeMap<String, GetterFn>,
    options: StateMap,
}

impl StoreDefinition {
    /// The store identifier, unique within a registry.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// A free-form option set on the definition.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.inner.options.get(key)
    }

    /// All free-form options.
    pub fn options(&self) -> &StateMap {
        &self.inner.options
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.inner.actions.keys().map(String::as_str)
    }

    pub fn getter_names(&self) -> impl Iterator<Item = &str> {
        self.inner.getters.keys().map(String::as_str)
    }

    /// Look up (or assemble) this store in the current application context.
    pub fn use_store(&self) -> Result<Store> {
        crate::app::use_store(self)
    }

    pub(crate) fn create_state(&self) -> Result<StateMap> {
        (self.inner.state)()
    }

    pub(crate) fn actions(&self) -> &BTreeMap<String, ActionFn> {
        &self.inner.actions
    }

    pub(crate) fn getters(&self) -> &BTreeMap<String, GetterFn> {
        &self.inner.getters
    }

    pub(crate) fn has_action(&self, name: &str) -> bool {
        self.inner.actions.contains_key(name)
    }

    pub(crate) fn has_getter(&self, name: &str) -> bool {
        self.inner.getters.contains_key(name)
    }
}

impl fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("id", &self.inner.id)
            .field("actions", &self.inner.actions.keys().collect::<Vec<_>>())
            .field("getters", &self.inner.getters.keys().collect::<Vec<_>>())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Start defining a store with the given identifier.
///
/// # Example
///
/// ```
/// use larder::{define_store, StoreError};
/// use serde_json::json;
///
/// let counter = define_store("counter")
///     .state(|| Ok(json!({ "count": 0 }).as_object().cloned().unwrap_or_default()))
///     .action("increment", |store, _args| {
///         let count = store.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
///         store.set("count", json!(count + 1))?;
///         Ok(json!(null))
///     })
///     .getter("double", |store| {
///         json!(store.get("count").and_then(|v| v.as_i64()).unwrap_or(0) * 2)
///     })
///     .build()?;
///
/// assert_eq!(counter.id(), "counter");
/// # Ok::<(), StoreError>(())
/// ```
pub fn define_store(id: impl Into<String>) -> StoreBuilder {
    StoreBuilder::new(id)
}

/// Builder for [`StoreDefinition`].
pub struct StoreBuilder {
    id: String,
    state: Option<StateFactory>,
    actions: Vec<(String, ActionFn)>,
    getters: Vec<(String, GetterFn)>,
    options: StateMap,
}

impl StoreBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: None,
            actions: Vec::new(),
            getters: Vec::new(),
            options: StateMap::new(),
        }
    }

    /// Factory producing a fresh initial state. Runs once per assembled store.
    ///
    /// Without a factory the store starts with an empty state.
    pub fn state<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<StateMap> + Send + Sync + 'static,
    {
        self.state = Some(Arc::new(factory));
        self
    }

    /// Add an action. The store it is called on is passed as the first argument.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Store, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.actions.push((name.into(), Arc::new(action)));
        self
    }

    /// Add a getter: a cached value derived from whatever it reads on the store.
    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Store) -> Value + Send + Sync + 'static,
    {
        self.getters.push((name.into(), Arc::new(getter)));
        self
    }

    /// Attach a free-form option, read only by plugins.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Validate names and freeze the definition.
    pub fn build(self) -> Result<StoreDefinition> {
        let StoreBuilder {
            id,
            state,
            actions: declared_actions,
            getters: declared_getters,
            options,
        } = self;

        if id.is_empty() {
            return Err(StoreError::InvalidDefinition(
                "store identifier must not be empty".to_string(),
            ));
        }

        let mut actions = BTreeMap::new();
        for (name, action) in declared_actions {
            if actions.contains_key(&name) {
                return Err(collision(&id, name, "an action", "an action"));
            }
            actions.insert(name, action);
        }

        let mut getters = BTreeMap::new();
        for (name, getter) in declared_getters {
            if actions.contains_key(&name) {
                return Err(collision(&id, name, "an action", "a getter"));
            }
            if getters.contains_key(&name) {
                return Err(collision(&id, name, "a getter", "a getter"));
            }
            getters.insert(name, getter);
        }

        let state: StateFactory = match state {
            Some(factory) => factory,
            None => Arc::new(|| Ok::<_, StoreError>(StateMap::new())),
        };

        Ok(StoreDefinition {
            inner: Arc::new(DefinitionInner {
                id,
                state,
                actions,
                getters,
                options,
            }),
        })
    }
}

fn collision(store: &str, name: String, first: &'static str, second: &'static str) -> StoreError {
    StoreError::NameCollision {
        store: store.to_string(),
        name,
        first,
        second,
    }
}

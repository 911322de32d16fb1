use super::definition::{ActionFn, StoreDefinition};
use super::field::Field;
use super::plugin::{run_plugins, Plugin, PluginContext};
use super::state::{DefaultSnapshot, ReactiveState, StateMap};
use super::subscription::{MutationInfo, Subscriptions, Unsubscribe};
use crate::app::App;
use crate::error::{Result, StoreError};
use crate::runtime::ReactiveRuntime;
use crate::signal::Memo;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// An assembled store: reactive state, bound actions, cached getters, and
/// the built-in `reset` / `subscribe` controls.
///
/// `Store` is a cheap handle; clones refer to the same instance. A registry
/// hands out exactly one instance per store id.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    id: String,
    state: ReactiveState,
    default_state: DefaultSnapshot,
    actions: BTreeMap<String, ActionFn>,
    getters: BTreeMap<String, Memo<Value>>,
    subscriptions: Arc<Subscriptions>,
}

/// Build the store instance for `definition` and run `plugins` against it.
///
/// Must be called with the application's runtime current. Nothing is
/// registered here; on error the partially built store is simply dropped.
pub(crate) fn assemble(
    definition: &StoreDefinition,
    app: &App,
    plugins: &[Arc<dyn Plugin>],
) -> Result<Store> {
    let id = definition.id().to_string();
    debug!(store = %id, "assembling store");

    let initial = definition
        .create_state()
        .map_err(|source| StoreError::StateFactory {
            store: id.clone(),
            source: Box::new(source),
        })?;
    let default_state = DefaultSnapshot::capture(&initial);

    for name in initial.keys() {
        check_field_name(definition, name)?;
    }

    let runtime = ReactiveRuntime::current();
    let state = ReactiveState::new_in(&runtime, initial);
    let subscriptions = Subscriptions::new(id.clone(), state.clone());

    // Getters capture a weak handle to the instance they are being assembled into
    let inner = Arc::new_cyclic(|this: &Weak<StoreInner>| {
        let getters = definition
            .getters()
            .iter()
            .map(|(name, getter)| {
                let this = this.clone();
                let getter = Arc::clone(getter);
                let memo = Memo::new_in(&runtime, move || match this.upgrade() {
                    Some(inner) => getter(&Store { inner }),
                    None => Value::Null,
                });
                (name.clone(), memo)
            })
            .collect();

        StoreInner {
            id: id.clone(),
            state,
            default_state,
            actions: definition.actions().clone(),
            getters,
            subscriptions,
        }
    });
    let store = Store { inner };

    let ctx = PluginContext {
        store: &store,
        id: &id,
        options: definition,
        app,
    };
    run_plugins(plugins, &ctx)?;

    debug!(
        store = %id,
        actions = store.inner.actions.len(),
        getters = store.inner.getters.len(),
        plugins = plugins.len(),
        "store assembled"
    );
    Ok(store)
}

fn check_field_name(definition: &StoreDefinition, name: &str) -> Result<()> {
    let other = if definition.has_action(name) {
        "an action"
    } else if definition.has_getter(name) {
        "a getter"
    } else {
        return Ok(());
    };
    Err(StoreError::NameCollision {
        store: definition.id().to_string(),
        name: name.to_string(),
        first: "a state field",
        second: other,
    })
}

impl Store {
    /// The identifier this store was defined with.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether two handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- State ---

    /// Read a state field. The read is tracked by getters, effects and watches.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.inner.state.get(field)
    }

    /// Read a state field without registering a dependency.
    pub fn peek(&self, field: &str) -> Option<Value> {
        self.inner.state.get_untracked(field)
    }

    /// Whether the state currently has `field`.
    pub fn contains(&self, field: &str) -> bool {
        self.inner.state.contains(field)
    }

    /// Write a state field, adding it if it does not exist yet.
    ///
    /// Writing a value equal to the current one notifies nobody.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<()> {
        self.check_field_name(field)?;
        self.inner.state.set(field, value.into());
        Ok(())
    }

    /// Modify a state field in place. A missing field starts out as `null`.
    pub fn update(&self, field: &str, f: impl FnOnce(&mut Value)) -> Result<()> {
        self.check_field_name(field)?;
        let mut value = self.inner.state.get_untracked(field).unwrap_or(Value::Null);
        f(&mut value);
        self.inner.state.set(field, value);
        Ok(())
    }

    /// Delete a state field, returning its last value.
    pub fn remove(&self, field: &str) -> Option<Value> {
        self.inner.state.remove(field)
    }

    /// Copy of the full state as a JSON object. The read is tracked.
    pub fn state(&self) -> Value {
        Value::Object(self.inner.state.snapshot())
    }

    /// Untracked copy of the full state.
    pub fn state_map(&self) -> StateMap {
        self.inner.state.snapshot_untracked()
    }

    /// Observable handle for one existing field.
    ///
    /// The handle stays attached across `reset`, `patch` and `replace_state`,
    /// including when the field is removed and later created again.
    pub fn field(&self, name: &str) -> Option<Field> {
        self.inner.state.field(name)
    }

    /// Observable handles for every field.
    pub fn fields(&self) -> BTreeMap<String, Field> {
        self.inner.state.fields()
    }

    /// Apply several changes at once; subscribers hear about them once.
    pub fn patch(&self, f: impl FnOnce(&mut StateMap)) -> Result<()> {
        let mut next = self.inner.state.snapshot_untracked();
        f(&mut next);
        self.replace_state(next)
    }

    /// Make the state equal to `state`, dropping fields it does not contain.
    pub fn replace_state(&self, state: StateMap) -> Result<()> {
        for name in state.keys() {
            self.check_field_name(name)?;
        }
        self.inner.state.replace(state);
        Ok(())
    }

    /// Restore the initial state: snapshot fields get their initial values
    /// back and fields added since assembly are removed.
    pub fn reset(&self) {
        debug!(store = %self.inner.id, "resetting store");
        self.inner.state.replace(self.inner.default_state.to_state());
    }

    fn check_field_name(&self, name: &str) -> Result<()> {
        let other = if self.inner.actions.contains_key(name) {
            "an action"
        } else if self.inner.getters.contains_key(name) {
            "a getter"
        } else {
            return Ok(());
        };
        Err(StoreError::NameCollision {
            store: self.inner.id.clone(),
            name: name.to_string(),
            first: "a state field",
            second: other,
        })
    }

    // --- Actions ---

    /// Invoke an action with this store bound as its receiver.
    ///
    /// Errors returned by the action reach the caller unchanged.
    pub fn call(&self, action: &str, args: &[Value]) -> Result<Value> {
        let action_fn = self
            .inner
            .actions
            .get(action)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAction {
                store: self.inner.id.clone(),
                name: action.to_string(),
            })?;
        action_fn(self, args)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.inner.actions.contains_key(name)
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.inner.actions.keys().map(String::as_str)
    }

    // --- Getters ---

    /// Read a getter, recomputing it only if something it read has changed.
    pub fn getter(&self, name: &str) -> Result<Value> {
        self.inner
            .getters
            .get(name)
            .map(Memo::get)
            .ok_or_else(|| StoreError::UnknownGetter {
                store: self.inner.id.clone(),
                name: name.to_string(),
            })
    }

    pub fn has_getter(&self, name: &str) -> bool {
        self.inner.getters.contains_key(name)
    }

    pub fn getter_names(&self) -> impl Iterator<Item = &str> {
        self.inner.getters.keys().map(String::as_str)
    }

    // --- Subscriptions ---

    /// Call `callback` after every future state change with the mutation and
    /// the new full state.
    ///
    /// Callbacks run synchronously, in registration order. The returned handle
    /// removes the callback; dropping it does not.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&MutationInfo, &Value) + Send + Sync + 'static,
    {
        self.inner.subscriptions.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Whether the state watch behind subscriptions is currently installed.
    pub fn is_watching(&self) -> bool {
        self.inner.subscriptions.is_watching()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.snapshot_untracked())
            .field("actions", &self.inner.actions.keys().collect::<Vec<_>>())
            .field("getters", &self.inner.getters.keys().collect::<Vec<_>>())
            .finish()
    }
}

use super::field::Field;
use crate::runtime::ReactiveRuntime;
use crate::signal::Signal;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Plain data backing a store: field name to JSON value.
pub type StateMap = Map<String, Value>;

/// Field-level reactive wrapper over a [`StateMap`].
///
/// Every field lives in its own [`Signal`], so reads are tracked per field.
/// Adding or removing a field notifies a separate shape signal, which every
/// field read also depends on.
#[derive(Clone)]
pub(crate) struct ReactiveState {
    inner: Arc<StateInner>,
}

struct StateInner {
    runtime: Arc<ReactiveRuntime>,
    fields: RwLock<BTreeMap<String, Signal<Value>>>,
    shape: Signal<u64>,
}

impl ReactiveState {
    pub(crate) fn new_in(runtime: &Arc<ReactiveRuntime>, initial: StateMap) -> Self {
        let fields = initial
            .into_iter()
            .map(|(name, value)| (name, Signal::new_in(runtime, value)))
            .collect();

        Self {
            inner: Arc::new(StateInner {
                runtime: Arc::clone(runtime),
                fields: RwLock::new(fields),
                shape: Signal::new_in(runtime, 0),
            }),
        }
    }

    pub(crate) fn runtime(&self) -> &Arc<ReactiveRuntime> {
        &self.inner.runtime
    }

    fn cell(&self, name: &str) -> Option<Signal<Value>> {
        self.inner.fields.read().get(name).cloned()
    }

    fn track_shape(&self) {
        self.inner.shape.get();
    }

    fn touch_shape(&self) {
        self.inner.shape.update(|version| *version = version.wrapping_add(1));
    }

    pub(crate) fn get(&self, name: &str) -> Option<Value> {
        self.track_shape();
        self.cell(name).map(|cell| cell.get())
    }

    pub(crate) fn get_untracked(&self, name: &str) -> Option<Value> {
        self.cell(name).map(|cell| cell.get_untracked())
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.inner.fields.read().contains_key(name)
    }

    /// Handle for `name`, if the field currently exists.
    pub(crate) fn field(&self, name: &str) -> Option<Field> {
        self.track_shape();
        self.contains(name).then(|| Field::new(self.clone(), name))
    }

    pub(crate) fn fields(&self) -> BTreeMap<String, Field> {
        self.track_shape();
        let names: Vec<String> = self.inner.fields.read().keys().cloned().collect();
        names
            .into_iter()
            .map(|name| {
                let field = Field::new(self.clone(), &name);
                (name, field)
            })
            .collect()
    }

    pub(crate) fn ptr_eq(&self, other: &ReactiveState) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Write a field, creating it if absent. Returns whether anything changed.
    pub(crate) fn set(&self, name: &str, value: Value) -> bool {
        if let Some(cell) = self.cell(name) {
            if cell.get_untracked() == value {
                return false;
            }
            cell.set(value);
            return true;
        }

        let cell = Signal::new_in(&self.inner.runtime, value);
        self.inner.fields.write().insert(name.to_string(), cell);
        self.touch_shape();
        true
    }

    pub(crate) fn remove(&self, name: &str) -> Option<Value> {
        let removed = self.inner.fields.write().remove(name);
        removed.map(|cell| {
            self.touch_shape();
            cell.get_untracked()
        })
    }

    /// Tracked copy of the whole state.
    pub(crate) fn snapshot(&self) -> StateMap {
        self.track_shape();
        let cells = self.inner.fields.read().clone();
        cells
            .into_iter()
            .map(|(name, cell)| (name, cell.get()))
            .collect()
    }

    pub(crate) fn snapshot_untracked(&self) -> StateMap {
        self.inner
            .fields
            .read()
            .iter()
            .map(|(name, cell)| (name.clone(), cell.get_untracked()))
            .collect()
    }

    /// Make the live state equal to `target` in place, as one batched change.
    ///
    /// Fields of `target` are written, fields absent from `target` are
    /// removed. Existing cells are reused, so field handles stay attached.
    pub(crate) fn replace(&self, target: StateMap) {
        let runtime = Arc::clone(&self.inner.runtime);
        runtime.batch(|| {
            let stale: Vec<String> = self
                .inner
                .fields
                .read()
                .keys()
                .filter(|name| !target.contains_key(name.as_str()))
                .cloned()
                .collect();
            for name in stale {
                self.remove(&name);
            }
            for (name, value) in target {
                self.set(&name, value);
            }
        });
    }
}

/// Deep, value-isolated copy of a store's initial state.
///
/// Captured once at assembly and only ever read afterwards. `serde_json::Value`
/// owns its nested arrays and objects, so cloning recursively copies the tree
/// and nothing here aliases the live state.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DefaultSnapshot(StateMap);

impl DefaultSnapshot {
    pub(crate) fn capture(state: &StateMap) -> Self {
        Self(state.clone())
    }

    pub(crate) fn to_state(&self) -> StateMap {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Watch;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state(value: Value) -> StateMap {
        match value {
            Value::Object(map) => map,
            _ => StateMap::new(),
        }
    }

    #[test]
    fn equal_writes_are_ignored() {
        let runtime = ReactiveRuntime::new();
        let reactive = ReactiveState::new_in(&runtime, state(json!({"a": 1})));
        assert!(!reactive.set("a", json!(1)));
        assert!(reactive.set("a", json!(2)));
        assert!(reactive.set("b", json!("new")));
        assert_eq!(reactive.snapshot_untracked(), state(json!({"a": 2, "b": "new"})));
    }

    #[test]
    fn replace_keeps_cells_and_drops_extra_fields() {
        let runtime = ReactiveRuntime::new();
        let reactive = ReactiveState::new_in(&runtime, state(json!({"a": 1, "b": 2})));
        let handle = reactive.field("a").expect("field a");
        assert!(reactive.field("missing").is_none());

        reactive.set("a", json!(99));
        reactive.set("extra", json!(true));
        reactive.replace(state(json!({"a": 1, "b": 2})));

        assert_eq!(reactive.snapshot_untracked(), state(json!({"a": 1, "b": 2})));
        assert_eq!(handle.get_untracked(), Some(json!(1)));
        assert!(!reactive.contains("extra"));
    }

    #[test]
    fn replace_notifies_watchers_once() {
        let runtime = ReactiveRuntime::new();
        let reactive = ReactiveState::new_in(&runtime, state(json!({"a": 1, "b": 2})));
        let calls = Arc::new(AtomicUsize::new(0));
        let _watch = Watch::new_in(
            &runtime,
            {
                let reactive = reactive.clone();
                move || reactive.snapshot()
            },
            {
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        reactive.replace(state(json!({"a": 5, "c": 3})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_is_isolated_from_nested_mutation() {
        let initial = state(json!({"items": [1, 2], "meta": {"tag": "x"}}));
        let snapshot = DefaultSnapshot::capture(&initial);

        let runtime = ReactiveRuntime::new();
        let reactive = ReactiveState::new_in(&runtime, initial);
        reactive.set("items", json!([1, 2, 3]));
        reactive.set("meta", json!({"tag": "y"}));

        assert_eq!(
            snapshot.to_state(),
            state(json!({"items": [1, 2], "meta": {"tag": "x"}}))
        );
    }
}

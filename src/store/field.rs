use super::state::ReactiveState;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Observable handle for one state field, addressed by name.
///
/// The handle follows the field rather than a particular cell: it stays
/// attached across `reset`, `patch` and `replace_state`, and writing through
/// it after the field was removed adds the field back.
#[derive(Clone)]
pub struct Field {
    state: ReactiveState,
    name: Arc<str>,
}

impl Field {
    pub(crate) fn new(state: ReactiveState, name: &str) -> Self {
        Self {
            state,
            name: Arc::from(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, `None` while the field is absent. The read is tracked.
    pub fn get(&self) -> Option<Value> {
        self.state.get(&self.name)
    }

    pub fn get_untracked(&self) -> Option<Value> {
        self.state.get_untracked(&self.name)
    }

    /// Write the field. Returns whether the value changed; equal writes
    /// notify nobody.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        self.state.set(&self.name, value.into())
    }

    /// Modify the field in place. A missing field starts out as `null`.
    pub fn update(&self, f: impl FnOnce(&mut Value)) -> bool {
        let mut value = self.get_untracked().unwrap_or(Value::Null);
        f(&mut value);
        self.state.set(&self.name, value)
    }

    /// Whether the field currently exists.
    pub fn is_present(&self) -> bool {
        self.state.contains(&self.name)
    }

    /// Whether two handles address the same field of the same store.
    pub fn ptr_eq(&self, other: &Field) -> bool {
        self.state.ptr_eq(&other.state) && self.name == other.name
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("value", &self.get_untracked())
            .finish()
    }
}

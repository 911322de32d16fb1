use crate::runtime::ReactiveRuntime;
use parking_lot::RwLock;
use std::sync::Arc;

/// A memoized computed value that automatically tracks dependencies.
///
/// Memos are lazy: nothing is computed until the first read, and a cached
/// value is reused until one of the sources read during the last
/// computation changes.
#[derive(Clone)]
pub struct Memo<T> {
    compute: Arc<dyn Fn() -> T + Send + Sync>,
    cached: Arc<RwLock<Option<T>>>,
    id: usize,
    runtime: Arc<ReactiveRuntime>,
}

impl<T: Clone + Send + Sync + 'static> Memo<T> {
    /// Create a new memo in the current runtime.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new_in(&ReactiveRuntime::current(), compute)
    }

    /// Create a new memo in a specific runtime.
    pub fn new_in<F>(runtime: &Arc<ReactiveRuntime>, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = runtime.next_id();

        // Register this as a memo with the runtime
        runtime.register_memo(id);

        Self {
            compute: Arc::new(compute),
            cached: Arc::new(RwLock::new(None)),
            id,
            runtime: Arc::clone(runtime),
        }
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        // Track this read in the reactive context
        self.runtime.track_read(self.id);

        if !self.runtime.is_memo_dirty(self.id) {
            if let Some(value) = self.cached.read().as_ref() {
                return value.clone();
            }
        }
        self.recompute()
    }

    /// Read the memoized value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.runtime.track_read(self.id);

        if !self.runtime.is_memo_dirty(self.id) {
            if let Some(value) = self.cached.read().as_ref() {
                return f(value);
            }
        }
        f(&self.recompute())
    }

    /// Whether the next read will run the computation.
    pub fn is_dirty(&self) -> bool {
        self.runtime.is_memo_dirty(self.id)
    }

    fn recompute(&self) -> T {
        // Dependencies are re-collected on every run
        self.runtime.clear_dependencies(self.id);
        let value = self.runtime.with_observer(self.id, || (self.compute)());
        *self.cached.write() = Some(value.clone());
        self.runtime.mark_memo_clean(self.id);
        value
    }
}

impl<T> Drop for Memo<T> {
    fn drop(&mut self) {
        if Arc::strong_count(&self.cached) == 1 {
            self.runtime.forget_memo(self.id);
        }
    }
}

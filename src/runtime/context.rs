use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Observer = Arc<dyn Fn() + Send + Sync>;

/// Reactive context for tracking dependencies.
struct ReactiveContext {
    current_observer: Option<usize>,
    // Map from source ID (signal or memo) to set of observer IDs that depend on it
    dependencies: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to set of source IDs it depends on
    observer_deps: HashMap<usize, HashSet<usize>>,
    // Map from observer ID to the effect function
    observers: HashMap<usize, Observer>,
    // Map from memo ID to dirty state
    memo_dirty: HashMap<usize, bool>,
    // Nesting depth of `batch` calls
    batch_depth: usize,
    // Effects triggered while batching, in first-trigger order
    pending: Vec<usize>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            current_observer: None,
            dependencies: HashMap::new(),
            observer_deps: HashMap::new(),
            observers: HashMap::new(),
            memo_dirty: HashMap::new(),
            batch_depth: 0,
            pending: Vec::new(),
        }
    }

    fn clear(&mut self) {
        self.current_observer = None;
        self.dependencies.clear();
        self.observer_deps.clear();
        self.observers.clear();
        self.memo_dirty.clear();
        self.batch_depth = 0;
        self.pending.clear();
    }

    /// Mark memos depending on `source_id` dirty, recursively, and collect
    /// the effects that have to re-run.
    fn collect_stale(&mut self, source_id: usize, effects: &mut Vec<usize>) {
        let mut dependents = match self.dependencies.get(&source_id) {
            Some(deps) => deps.iter().copied().collect::<Vec<_>>(),
            None => return,
        };
        // Observers are created in id order; keep notification deterministic
        dependents.sort_unstable();

        for observer_id in dependents {
            if let Some(dirty) = self.memo_dirty.get_mut(&observer_id) {
                if !*dirty {
                    *dirty = true;
                    self.collect_stale(observer_id, effects);
                }
            } else if self.observers.contains_key(&observer_id) && !effects.contains(&observer_id) {
                effects.push(observer_id);
            }
        }
    }

    fn clear_dependencies(&mut self, observer_id: usize) {
        if let Some(old_deps) = self.observer_deps.remove(&observer_id) {
            for source_id in old_deps {
                if let Some(deps) = self.dependencies.get_mut(&source_id) {
                    deps.remove(&observer_id);
                    if deps.is_empty() {
                        self.dependencies.remove(&source_id);
                    }
                }
            }
        }
    }

    /// Drop every edge leading out of a source that no longer exists.
    fn forget_source(&mut self, source_id: usize) {
        if let Some(observers) = self.dependencies.remove(&source_id) {
            for observer_id in observers {
                if let Some(deps) = self.observer_deps.get_mut(&observer_id) {
                    deps.remove(&source_id);
                    if deps.is_empty() {
                        self.observer_deps.remove(&observer_id);
                    }
                }
            }
        }
    }
}

/// Inner runtime state that can be shared.
///
/// Effects and watches keep a weak reference to this so that dropping them
/// can unregister their observer without keeping the runtime alive.
pub struct RuntimeInner {
    context: Mutex<ReactiveContext>,
}

impl RuntimeInner {
    fn new() -> Self {
        Self {
            context: Mutex::new(ReactiveContext::new()),
        }
    }

    /// Unregister an observer and forget everything it depended on.
    pub fn remove_observer(&self, observer_id: usize) {
        let observer = {
            let mut ctx = self.context.lock();
            ctx.pending.retain(|id| *id != observer_id);
            ctx.clear_dependencies(observer_id);
            ctx.observers.remove(&observer_id)
        };
        // Observer closures may own signals, whose drop locks the context
        drop(observer);
    }

    fn clear(&self) {
        let observers = {
            let mut ctx = self.context.lock();
            let observers = std::mem::take(&mut ctx.observers);
            ctx.clear();
            observers
        };
        drop(observers);
    }
}

/// Hybrid reactive runtime for managing reactive primitives.
///
/// Supports both global runtime (default) and scoped runtimes for isolation.
/// The runtime tracks dependencies between signals, effects, and memos,
/// and manages the reactive graph.
///
/// # Examples
///
/// Using the default global runtime:
///
/// ```
/// use larder::Signal;
///
/// let signal = Signal::new(42);
/// assert_eq!(signal.get(), 42);
/// ```
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use larder::runtime::ReactiveRuntime;
/// use larder::Signal;
///
/// ReactiveRuntime::scope(|| {
///     let signal = Signal::new(0);
///     assert_eq!(signal.get(), 0);
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct ReactiveRuntime {
    next_id: AtomicUsize,
    inner: Arc<RuntimeInner>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
}

/// Restores the previous observer when a tracked computation finishes or unwinds.
struct ObserverReset<'a> {
    runtime: &'a ReactiveRuntime,
    prev: Option<usize>,
}

impl Drop for ObserverReset<'_> {
    fn drop(&mut self) {
        self.runtime.inner.context.lock().current_observer = self.prev;
    }
}

/// Closes a batch, even if the batched closure panics.
struct BatchGuard<'a> {
    runtime: &'a ReactiveRuntime,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let pending = {
            let mut ctx = self.runtime.inner.context.lock();
            ctx.batch_depth = ctx.batch_depth.saturating_sub(1);
            if ctx.batch_depth > 0 {
                return;
            }
            std::mem::take(&mut ctx.pending)
        };
        if std::thread::panicking() {
            return;
        }
        for observer_id in pending {
            self.runtime.run_observer(observer_id);
        }
    }
}

impl ReactiveRuntime {
    /// Create a new isolated runtime.
    ///
    /// This creates a completely independent reactive runtime with its own
    /// dependency graph. Every application handle owns one.
    pub fn new() -> Arc<Self> {
        Arc::new(ReactiveRuntime {
            next_id: AtomicUsize::new(0),
            inner: Arc::new(RuntimeInner::new()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// Useful for testing or creating isolated reactive contexts.
    /// The runtime is popped from the stack when the function returns; it
    /// lives on only as long as primitives created inside still refer to it.
    ///
    /// # Examples
    ///
    /// ```
    /// use larder::runtime::ReactiveRuntime;
    /// use larder::Signal;
    ///
    /// ReactiveRuntime::scope(|| {
    ///     let signal = Signal::new(0);
    ///     assert_eq!(signal.get(), 0);
    /// });
    /// ```
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        Self::with_runtime(runtime, f)
    }

    /// Get or create the global runtime (fallback).
    ///
    /// This is used as the default runtime when no scoped runtime is active.
    pub fn global() -> Arc<Self> {
        use std::sync::OnceLock;
        static RUNTIME: OnceLock<Arc<ReactiveRuntime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current reactive runtime (scoped or global fallback).
    ///
    /// Returns the runtime from the top of the thread-local stack,
    /// or the global runtime if no scoped runtime is active.
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// This pushes the runtime onto the thread-local stack for the duration
    /// of the function execution.
    ///
    /// # Examples
    ///
    /// ```
    /// use larder::runtime::ReactiveRuntime;
    /// use larder::Signal;
    ///
    /// let runtime = ReactiveRuntime::new();
    /// ReactiveRuntime::with_runtime(runtime, || {
    ///     let signal = Signal::new(42);
    ///     assert_eq!(signal.get(), 42);
    /// });
    /// ```
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Clear all observers, dependencies, and state from this runtime.
    ///
    /// Useful for resetting between tests. This removes all tracked
    /// dependencies, observers, and resets the ID counter.
    pub fn clear(&self) {
        self.inner.clear();
        self.next_id.store(0, Ordering::SeqCst);
    }

    /// Get a reference to the inner runtime state.
    pub fn inner(&self) -> Arc<RuntimeInner> {
        Arc::clone(&self.inner)
    }

    /// Generate the next unique ID for a reactive primitive.
    pub fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Track a read of a signal or memo by the current observer.
    pub fn track_read(&self, source_id: usize) {
        let mut ctx = self.inner.context.lock();
        if let Some(current_observer) = ctx.current_observer {
            // Add dependency: source -> observer
            ctx.dependencies
                .entry(source_id)
                .or_default()
                .insert(current_observer);
            // Track that this observer depends on this source
            ctx.observer_deps
                .entry(current_observer)
                .or_default()
                .insert(source_id);
        }
    }

    /// Notify all observers that depend on a signal.
    ///
    /// Dependent memos (transitively) are marked dirty before any effect
    /// runs, so effects never observe a stale memo.
    pub fn notify_observers(&self, source_id: usize) {
        let effects = {
            let mut ctx = self.inner.context.lock();
            let mut effects = Vec::new();
            ctx.collect_stale(source_id, &mut effects);

            if ctx.batch_depth > 0 {
                for observer_id in effects {
                    if !ctx.pending.contains(&observer_id) {
                        ctx.pending.push(observer_id);
                    }
                }
                return;
            }
            effects
        };

        for observer_id in effects {
            self.run_observer(observer_id);
        }
    }

    /// Register an observer function under the given id.
    ///
    /// Any dependencies recorded for a previous observer with the same id are
    /// discarded. The function is not run; see [`run_observer`](Self::run_observer).
    pub fn create_observer<F>(&self, observer_id: usize, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let previous = {
            let mut ctx = self.inner.context.lock();
            ctx.clear_dependencies(observer_id);
            ctx.observers.insert(observer_id, Arc::new(f))
        };
        drop(previous);
    }

    /// Run a registered observer, re-collecting its dependencies.
    pub fn run_observer(&self, observer_id: usize) {
        let observer = {
            let mut ctx = self.inner.context.lock();
            let observer = ctx.observers.get(&observer_id).cloned();
            if observer.is_some() {
                ctx.clear_dependencies(observer_id);
            }
            observer
        };

        if let Some(observer) = observer {
            self.with_observer(observer_id, || observer());
        }
    }

    /// Run a function with a specific observer as the current context.
    pub fn with_observer<F, R>(&self, observer_id: usize, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = self
            .inner
            .context
            .lock()
            .current_observer
            .replace(observer_id);
        let _reset = ObserverReset {
            runtime: self,
            prev,
        };
        f()
    }

    /// Run a function with no current observer, so nothing it reads is tracked.
    pub fn untracked<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = self.inner.context.lock().current_observer.take();
        let _reset = ObserverReset {
            runtime: self,
            prev,
        };
        f()
    }

    /// Run a function with effect execution deferred until it returns.
    ///
    /// Effects triggered inside run once each, in the order they were first
    /// triggered, when the outermost batch ends. Memos are still marked dirty
    /// immediately.
    pub fn batch<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.inner.context.lock().batch_depth += 1;
        let _guard = BatchGuard { runtime: self };
        f()
    }

    /// Whether a batch is currently open on this runtime.
    pub fn is_batching(&self) -> bool {
        self.inner.context.lock().batch_depth > 0
    }

    /// Forget the dependencies an observer collected on its last run.
    pub(crate) fn clear_dependencies(&self, observer_id: usize) {
        self.inner.context.lock().clear_dependencies(observer_id);
    }

    /// Register a memo and mark it as dirty initially.
    pub fn register_memo(&self, memo_id: usize) {
        self.inner.context.lock().memo_dirty.insert(memo_id, true);
    }

    /// Check if a memo is dirty (needs recomputation).
    pub fn is_memo_dirty(&self, memo_id: usize) -> bool {
        self.inner
            .context
            .lock()
            .memo_dirty
            .get(&memo_id)
            .copied()
            .unwrap_or(true)
    }

    /// Mark a memo as clean (after recomputation).
    pub fn mark_memo_clean(&self, memo_id: usize) {
        self.inner.context.lock().memo_dirty.insert(memo_id, false);
    }

    /// Forget a signal or memo whose last handle is gone.
    pub(crate) fn forget_source(&self, source_id: usize) {
        self.inner.context.lock().forget_source(source_id);
    }

    /// Unregister a memo: its dirty flag, what it read and who read it.
    pub(crate) fn forget_memo(&self, memo_id: usize) {
        let mut ctx = self.inner.context.lock();
        ctx.memo_dirty.remove(&memo_id);
        ctx.clear_dependencies(memo_id);
        ctx.forget_source(memo_id);
    }

    /// Number of registered observers (effects and watches).
    pub fn observer_count(&self) -> usize {
        self.inner.context.lock().observers.len()
    }

    /// Number of registered memos.
    pub fn memo_count(&self) -> usize {
        self.inner.context.lock().memo_dirty.len()
    }

    /// Number of sources that currently have at least one dependent.
    pub fn tracked_source_count(&self) -> usize {
        self.inner.context.lock().dependencies.len()
    }
}

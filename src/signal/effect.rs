use crate::runtime::{ReactiveRuntime, RuntimeInner};
use std::sync::{Arc, Weak};

/// A side effect that runs when its dependencies change.
///
/// Effects automatically track signal reads and re-run when those signals change.
/// The effect runs immediately on creation to establish initial dependencies,
/// and dependencies are re-collected on every run.
///
/// # Examples
///
/// ```
/// use larder::{Effect, Signal};
/// use std::sync::{Arc, atomic::{AtomicI32, Ordering}};
///
/// let signal = Signal::new(5);
/// let last_value = Arc::new(AtomicI32::new(0));
/// let last_value_clone = last_value.clone();
///
/// let _effect = Effect::new({
///     let signal = signal.clone();
///     move || {
///         let val = signal.get();
///         last_value_clone.store(val, Ordering::SeqCst);
///     }
/// });
///
/// assert_eq!(last_value.load(Ordering::SeqCst), 5);
///
/// signal.set(10);
/// assert_eq!(last_value.load(Ordering::SeqCst), 10);
/// ```
pub struct Effect {
    id: usize,
    runtime: Weak<RuntimeInner>,
}

impl Effect {
    /// Create a new effect in the current runtime.
    pub fn new<F>(effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new_in(&ReactiveRuntime::current(), effect)
    }

    /// Create a new effect in a specific runtime.
    pub fn new_in<F>(runtime: &Arc<ReactiveRuntime>, effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = runtime.next_id();

        runtime.create_observer(id, effect);
        runtime.run_observer(id);

        Self {
            id,
            runtime: Arc::downgrade(&runtime.inner()),
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.id);
        }
    }
}

/// Observes a tracked source and invokes a callback whenever it changes.
///
/// Unlike [`Effect`], the callback is not invoked on creation, and nothing the
/// callback reads becomes a dependency. Dropping the watch stops observation.
///
/// # Examples
///
/// ```
/// use larder::{Signal, Watch};
/// use std::sync::{Arc, Mutex};
///
/// let count = Signal::new(1);
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let watch = Watch::new(
///     {
///         let count = count.clone();
///         move || count.get()
///     },
///     {
///         let seen = seen.clone();
///         move |value| seen.lock().unwrap().push(value)
///     },
/// );
///
/// count.set(2);
/// drop(watch);
/// count.set(3);
/// assert_eq!(*seen.lock().unwrap(), vec![2]);
/// ```
pub struct Watch {
    id: usize,
    runtime: Weak<RuntimeInner>,
}

impl Watch {
    /// Create a new watch in the current runtime.
    pub fn new<S, T, C>(source: S, callback: C) -> Self
    where
        S: Fn() -> T + Send + Sync + 'static,
        C: Fn(T) + Send + Sync + 'static,
        T: 'static,
    {
        Self::new_in(&ReactiveRuntime::current(), source, callback)
    }

    /// Create a new watch in a specific runtime.
    pub fn new_in<S, T, C>(runtime: &Arc<ReactiveRuntime>, source: S, callback: C) -> Self
    where
        S: Fn() -> T + Send + Sync + 'static,
        C: Fn(T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = runtime.next_id();
        let source = Arc::new(source);
        let tracked = Arc::clone(&source);
        let owner = Arc::downgrade(runtime);

        runtime.create_observer(id, move || {
            let value = tracked();
            match owner.upgrade() {
                Some(runtime) => runtime.untracked(|| callback(value)),
                None => callback(value),
            }
        });

        // Collect the initial dependencies without firing the callback
        runtime.with_observer(id, || {
            source();
        });

        Self {
            id,
            runtime: Arc::downgrade(&runtime.inner()),
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.id);
        }
    }
}

/// Run `f` in the current runtime with effects deferred until it returns.
///
/// # Example
///
/// ```
/// use larder::{batch, Effect, Signal};
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
///
/// let a = Signal::new(0);
/// let b = Signal::new(0);
/// let runs = Arc::new(AtomicUsize::new(0));
/// let _effect = Effect::new({
///     let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
///     move || {
///         let _ = a.get() + b.get();
///         runs.fetch_add(1, Ordering::SeqCst);
///     }
/// });
///
/// batch(|| {
///     a.set(1);
///     b.set(2);
/// });
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    ReactiveRuntime::current().batch(f)
}

/// Run `f` in the current runtime without tracking any reads.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    ReactiveRuntime::current().untracked(f)
}

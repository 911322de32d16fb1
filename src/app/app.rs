use crate::error::{Result, StoreError};
use crate::runtime::ReactiveRuntime;
use crate::store::{Registry, Store, StoreDefinition};
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// An application instance: one reactive runtime plus, once installed, one
/// store registry.
///
/// Two applications never share stores, even for the same definition.
///
/// # Examples
///
/// ```
/// use larder::{create_registry, define_store, App, RegistryConfig, StoreError};
///
/// let app = App::new();
/// app.install(create_registry(RegistryConfig::new()))?;
///
/// let settings = define_store("settings").build()?;
/// let store = app.run(|| settings.use_store())?;
/// assert!(store.ptr_eq(&app.use_store(&settings)?));
/// # Ok::<(), StoreError>(())
/// ```
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    runtime: Arc<ReactiveRuntime>,
    registry: OnceLock<Registry>,
}

// Thread-local stack of applications entered with `App::run`
thread_local! {
    static APP_STACK: RefCell<Vec<App>> = const { RefCell::new(Vec::new()) };
}

impl App {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppInner {
                runtime: ReactiveRuntime::new(),
                registry: OnceLock::new(),
            }),
        }
    }

    /// The reactive runtime every store of this application lives in.
    pub fn runtime(&self) -> Arc<ReactiveRuntime> {
        Arc::clone(&self.inner.runtime)
    }

    /// Install the store registry. An application takes exactly one, and a
    /// registry serves exactly one application.
    pub fn install(&self, registry: Registry) -> Result<()> {
        if self.inner.registry.get().is_some() {
            return Err(StoreError::RegistryAlreadyInstalled);
        }
        registry.bind()?;
        self.inner.registry.set(registry).map_err(|registry| {
            registry.unbind();
            StoreError::RegistryAlreadyInstalled
        })
    }

    /// The installed registry, if any.
    pub fn registry(&self) -> Option<Registry> {
        self.inner.registry.get().cloned()
    }

    /// Run `f` inside this application.
    ///
    /// While `f` runs, [`use_store`] resolves against this application (or a
    /// nested one) and new reactive primitives are created in its runtime.
    pub fn run<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        APP_STACK.with(|stack| {
            stack.borrow_mut().push(self.clone());
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ReactiveRuntime::with_runtime(self.runtime(), f)
        }));

        APP_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// The innermost application entered with [`run`](Self::run) that has a
    /// registry installed.
    pub fn current() -> Option<App> {
        APP_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|app| app.inner.registry.get().is_some())
                .cloned()
        })
    }

    /// Look up (or assemble) a store in this application's registry.
    pub fn use_store(&self, definition: &StoreDefinition) -> Result<Store> {
        let registry = self.registry().ok_or(StoreError::RegistryNotInstalled)?;
        registry.use_store(self, definition)
    }

    pub fn ptr_eq(&self, other: &App) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("registry", &self.inner.registry.get())
            .finish()
    }
}

/// Look up (or assemble) a store in the current application.
///
/// Fails with [`StoreError::RegistryNotInstalled`] outside of [`App::run`],
/// or when no enclosing application has a registry installed.
pub fn use_store(definition: &StoreDefinition) -> Result<Store> {
    App::current()
        .ok_or(StoreError::RegistryNotInstalled)?
        .use_store(definition)
}

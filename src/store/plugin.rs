use super::definition::StoreDefinition;
use super::store::Store;
use crate::app::App;
use crate::error::{Result, StoreError};
use std::sync::Arc;
use tracing::trace;

/// Everything a plugin gets to see about a freshly assembled store.
///
/// A new context is built for every assembly; plugins that need the store
/// later (for example to keep a subscription) clone the handle.
pub struct PluginContext<'a> {
    pub store: &'a Store,
    pub id: &'a str,
    pub options: &'a StoreDefinition,
    pub app: &'a App,
}

/// Extension run once for every store assembled by a registry.
///
/// Closures of the form `Fn(&PluginContext<'_>) -> Result<()>` are plugins too.
pub trait Plugin: Send + Sync {
    fn apply(&self, ctx: &PluginContext<'_>) -> Result<()>;
}

impl<F> Plugin for F
where
    F: Fn(&PluginContext<'_>) -> Result<()> + Send + Sync,
{
    fn apply(&self, ctx: &PluginContext<'_>) -> Result<()> {
        self(ctx)
    }
}

/// Run plugins in order against the same context, stopping at the first error.
pub(crate) fn run_plugins(plugins: &[Arc<dyn Plugin>], ctx: &PluginContext<'_>) -> Result<()> {
    for (index, plugin) in plugins.iter().enumerate() {
        trace!(store = %ctx.id, index, "running plugin");
        plugin.apply(ctx).map_err(|source| StoreError::Plugin {
            store: ctx.id.to_string(),
            index,
            source: Box::new(source),
        })?;
    }
    Ok(())
}

//! Dependency manager capability.
//!
//! A dependency manager loads (and later tears down) the third-party runtime
//! a viewer needs: script bundles, stylesheets, rendering engines. It is the
//! typed replacement for "call method X on export Y".

use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Loads and cleans up one viewer's third-party runtime.
pub trait DependencyManager: Send + Sync {
    /// Fetch and initialise the runtime.
    ///
    /// Resolves once every resource the runtime needs is ready. An error here
    /// is non-fatal to the host; the viewer proceeds without the runtime.
    fn load(&self) -> BoxFuture<'_, Result<(), String>>;

    /// Release everything `load` set up.
    ///
    /// Runs to completion before returning: the host calls it from both the
    /// awaited unload path and the synchronous teardown path.
    fn cleanup(&self) -> Result<(), String>;
}

/// A loaded dependency-manager module.
///
/// A module may export several managers under namespaces, and may offer a
/// conventional fallback used when a catalog entry names no entry point.
pub trait DependencyModule: Send + Sync {
    /// Look up the manager exported under `namespace`.
    fn entry_point(&self, namespace: &str) -> Option<Arc<dyn DependencyManager>>;

    /// Manager used when the catalog entry names no entry point.
    fn fallback(&self) -> Option<Arc<dyn DependencyManager>> {
        None
    }
}

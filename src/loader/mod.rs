//! Dependency loader.
//!
//! Catalog entries name their implementation and dependency manager by opaque
//! string refs. The module table maps every ref to a factory registered at
//! build time, so the full set of loadable modules is known statically while
//! selection still happens at runtime.

pub mod fetch;
pub mod resources;

pub use fetch::{HttpFetcher, OfflineFetcher, ResourceError, ResourceErrorKind, ResourceFetcher};
pub use resources::{PollBudget, ResourceLoader};

use anyhow::{anyhow, Context, Result};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use viewer_plugin_interface::{DependencyModule, ViewerImplementation};

use crate::catalog::ViewerDescriptor;

pub type ImplementationFactory =
    Arc<dyn Fn(ModuleContext) -> BoxFuture<'static, Result<Arc<dyn ViewerImplementation>>> + Send + Sync>;

pub type DependencyFactory =
    Arc<dyn Fn(ModuleContext) -> BoxFuture<'static, Result<Arc<dyn DependencyModule>>> + Send + Sync>;

/// What a factory gets when the registry asks it for a module.
#[derive(Clone)]
pub struct ModuleContext {
    /// Catalog id of the viewer being loaded. Resources injected on its
    /// behalf must be tagged with this id.
    pub plugin_id: String,
    pub resources: Arc<ResourceLoader>,
    pub custom_parameters: Map<String, Value>,
}

/// Static lookup table from refs to module factories.
#[derive(Clone, Default)]
pub struct ModuleTable {
    implementations: HashMap<String, ImplementationFactory>,
    dependencies: HashMap<String, DependencyFactory>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_implementation<F, Fut>(&mut self, reference: impl Into<String>, factory: F)
    where
        F: Fn(ModuleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn ViewerImplementation>>> + Send + 'static,
    {
        self.implementations
            .insert(reference.into(), Arc::new(move |ctx| factory(ctx).boxed()));
    }

    pub fn register_dependency<F, Fut>(&mut self, reference: impl Into<String>, factory: F)
    where
        F: Fn(ModuleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn DependencyModule>>> + Send + 'static,
    {
        self.dependencies
            .insert(reference.into(), Arc::new(move |ctx| factory(ctx).boxed()));
    }

    pub fn has_implementation(&self, reference: &str) -> bool {
        self.implementations.contains_key(reference)
    }

    pub fn has_dependency(&self, reference: &str) -> bool {
        self.dependencies.contains_key(reference)
    }

    /// Registered implementation refs, sorted.
    pub fn implementation_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self.implementations.keys().map(String::as_str).collect();
        refs.sort_unstable();
        refs
    }
}

/// Resolves refs to loaded modules.
#[derive(Clone)]
pub struct DependencyLoader {
    table: Arc<ModuleTable>,
    resources: Arc<ResourceLoader>,
}

impl DependencyLoader {
    pub fn new(table: ModuleTable, resources: Arc<ResourceLoader>) -> Self {
        Self {
            table: Arc::new(table),
            resources,
        }
    }

    pub fn table(&self) -> &ModuleTable {
        &self.table
    }

    pub fn resources(&self) -> &Arc<ResourceLoader> {
        &self.resources
    }

    pub fn context_for(&self, descriptor: &ViewerDescriptor) -> ModuleContext {
        ModuleContext {
            plugin_id: descriptor.id.clone(),
            resources: self.resources.clone(),
            custom_parameters: descriptor.custom_parameters.clone(),
        }
    }

    /// Load a viewer implementation. Any failure is fatal to the caller.
    pub async fn load_implementation(
        &self,
        reference: &str,
        ctx: ModuleContext,
    ) -> Result<Arc<dyn ViewerImplementation>> {
        let factory = self
            .table
            .implementations
            .get(reference)
            .cloned()
            .ok_or_else(|| anyhow!("no implementation module registered for '{}'", reference))?;

        factory(ctx)
            .await
            .with_context(|| format!("implementation module '{}' failed to load", reference))
    }

    /// Load a dependency-manager module.
    ///
    /// A ref missing from the table resolves to `None` with a warning, since
    /// most viewers need no dependency manager. A factory failure is an error.
    pub async fn load_dependency_manager(
        &self,
        reference: &str,
        ctx: ModuleContext,
    ) -> Result<Option<Arc<dyn DependencyModule>>> {
        let Some(factory) = self.table.dependencies.get(reference).cloned() else {
            tracing::warn!(
                plugin = %ctx.plugin_id,
                "No dependency manager registered for '{}'",
                reference
            );
            return Ok(None);
        };

        factory(ctx)
            .await
            .map(Some)
            .with_context(|| format!("dependency manager '{}' failed to load", reference))
    }
}

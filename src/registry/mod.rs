//! Viewer plugin registry.
//!
//! The registry owns the eligible catalog and drives every viewer through
//! `Unloaded → Loading → Loaded → Unloaded`. At most one viewer is active at a
//! time, and switching always finishes tearing down the previous viewer
//! (dependency cleanup, then resource removal) before the next one starts
//! loading.
//!
//! Loads that are already in flight are shared: a second caller for the same
//! id awaits the first request instead of fetching again. Each load runs as
//! its own Tokio task, so it finishes even if every caller stops waiting; if
//! its viewer was unloaded meanwhile, the result is discarded when it arrives.
//! A switch that is dropped mid-load leaves its viewer to be unloaded as soon
//! as that load settles.

pub mod error;

pub use error::{PluginErrorKind, PluginLoadError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;
use viewer_plugin_interface::{
    is_version_compatible, DependencyManager, DependencyModule, ViewerImplementation, INTERFACE_VERSION,
};

use crate::catalog::{CatalogSource, ViewerDescriptor};
use crate::features::{self, FeatureSet};
use crate::loader::DependencyLoader;
use crate::resolver::{self, FileDescriptor};
use crate::tracker::ResourceTracker;

type SharedLoad = Shared<BoxFuture<'static, Result<LoadedViewerHandle, PluginLoadError>>>;

/// Public view of a viewer's load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Unloaded,
    Loading,
    Loaded,
}

/// A load in progress.
#[derive(Clone)]
struct InFlight {
    /// Identifies this attempt; a settled result only applies to its own attempt.
    token: Uuid,
    pending: SharedLoad,
    /// The switch that wanted this viewer went away before activating it.
    abandoned: bool,
}

enum LoadState {
    Unloaded,
    Loading(InFlight),
    Loaded(LoadedViewerHandle),
}

impl LoadState {
    fn status(&self) -> LoadStatus {
        match self {
            LoadState::Unloaded => LoadStatus::Unloaded,
            LoadState::Loading(_) => LoadStatus::Loading,
            LoadState::Loaded(_) => LoadStatus::Loaded,
        }
    }
}

/// A loaded viewer: its implementation plus its optional dependency module.
#[derive(Clone)]
pub struct LoadedViewerHandle {
    pub plugin_id: String,
    /// Distinguishes successive loads of the same viewer.
    pub instance_id: Uuid,
    pub descriptor: Arc<ViewerDescriptor>,
    pub implementation: Arc<dyn ViewerImplementation>,
    pub dependency_module: Option<Arc<dyn DependencyModule>>,
    /// Non-fatal problems hit while loading.
    pub warnings: Vec<PluginLoadError>,
}

impl std::fmt::Debug for LoadedViewerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedViewerHandle")
            .field("plugin_id", &self.plugin_id)
            .field("instance_id", &self.instance_id)
            .field("implementation", &self.implementation)
            .field("has_dependency_module", &self.dependency_module.is_some())
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl LoadedViewerHandle {
    /// The dependency manager this viewer dispatches to.
    ///
    /// The catalog's entry point namespace wins; without one, the module's
    /// fallback manager is used.
    pub fn dependency_manager(&self) -> Option<Arc<dyn DependencyManager>> {
        let module = self.dependency_module.as_ref()?;
        match &self.descriptor.dependency_entry_point {
            Some(entry) => {
                let manager = module.entry_point(&entry.namespace);
                if manager.is_none() {
                    tracing::warn!(
                        plugin = %self.plugin_id,
                        "Dependency module does not export '{}'",
                        entry.namespace
                    );
                }
                manager
            }
            None => module.fallback(),
        }
    }
}

/// Result of `load_plugin_dependencies`.
#[derive(Debug, Clone)]
pub enum DependencyOutcome {
    /// The dependency manager loaded its runtime.
    Loaded,
    /// The viewer has no dependency step.
    NotRequired,
    /// The dependency step failed; the viewer proceeds without it.
    Failed(PluginLoadError),
}

/// A catalog entry left out of the registry, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedViewer {
    pub id: String,
    pub reason: String,
}

struct RegisteredPlugin {
    descriptor: Arc<ViewerDescriptor>,
    state: LoadState,
}

#[derive(Default)]
struct RegistryState {
    initialized: bool,
    /// Eligible ids in catalog order.
    order: Vec<String>,
    plugins: HashMap<String, RegisteredPlugin>,
    excluded: Vec<ExcludedViewer>,
    active_id: Option<String>,
}

impl RegistryState {
    fn ensure_initialized(&self) -> Result<(), PluginLoadError> {
        if self.initialized {
            Ok(())
        } else {
            Err(PluginLoadError::not_initialized())
        }
    }

    fn plugin(&self, id: &str) -> Result<&RegisteredPlugin, PluginLoadError> {
        self.ensure_initialized()?;
        self.plugins.get(id).ok_or_else(|| PluginLoadError::unknown(id))
    }

    fn plugin_mut(&mut self, id: &str) -> Result<&mut RegisteredPlugin, PluginLoadError> {
        self.ensure_initialized()?;
        self.plugins.get_mut(id).ok_or_else(|| PluginLoadError::unknown(id))
    }
}

/// Process-lifetime viewer registry. Construct one per host.
pub struct PluginRegistry {
    source: CatalogSource,
    /// `None` means the host has no feature configuration.
    features: Option<FeatureSet>,
    loader: DependencyLoader,
    state: Arc<Mutex<RegistryState>>,
    switch_gate: tokio::sync::Mutex<()>,
}

impl PluginRegistry {
    pub fn new(source: CatalogSource, features: Option<FeatureSet>, loader: DependencyLoader) -> Self {
        Self {
            source,
            features,
            loader,
            state: Arc::new(Mutex::new(RegistryState::default())),
            switch_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        lock_state(&self.state)
    }

    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        self.loader.resources().tracker()
    }

    pub fn loader(&self) -> &DependencyLoader {
        &self.loader
    }

    /// Read the catalog and register every eligible viewer.
    ///
    /// Idempotent. Fails only if the catalog itself is unreadable or
    /// malformed; ineligible entries are logged and left out.
    pub async fn initialize(&self) -> Result<(), PluginLoadError> {
        if self.lock().initialized {
            return Ok(());
        }

        let catalog = self.source.read().await.map_err(|e| {
            tracing::error!("Failed to read viewer catalog: {}", e);
            PluginLoadError::catalog(e)
        })?;

        let mut state = self.lock();
        if state.initialized {
            return Ok(());
        }

        for descriptor in catalog.descriptors() {
            if let Err(reason) = self.check_eligible(descriptor) {
                tracing::info!(plugin = %descriptor.id, "Viewer not registered: {}", reason);
                state.excluded.push(ExcludedViewer {
                    id: descriptor.id.clone(),
                    reason,
                });
                continue;
            }

            state.order.push(descriptor.id.clone());
            state.plugins.insert(
                descriptor.id.clone(),
                RegisteredPlugin {
                    descriptor: descriptor.clone(),
                    state: LoadState::Unloaded,
                },
            );
        }

        state.initialized = true;
        tracing::info!(
            registered = state.order.len(),
            excluded = state.excluded.len(),
            "Viewer registry initialized"
        );
        Ok(())
    }

    fn check_eligible(&self, descriptor: &ViewerDescriptor) -> Result<(), String> {
        if !features::is_eligible(descriptor, self.features.as_ref()) {
            return Err(format!(
                "missing feature flags: {}",
                features::missing_flags(descriptor, self.features.as_ref()).join(", ")
            ));
        }

        if let Some(min_ver) = &descriptor.min_interface_version {
            match is_version_compatible(min_ver, INTERFACE_VERSION) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(format!(
                        "requires interface version {}, host provides {}",
                        min_ver, INTERFACE_VERSION
                    ));
                }
                Err(e) => return Err(format!("version check failed: {}", e)),
            }
        }

        if !self.loader.table().has_implementation(&descriptor.implementation_ref) {
            return Err(format!(
                "no implementation module registered for '{}'",
                descriptor.implementation_ref
            ));
        }

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Eligible descriptors in catalog order.
    pub fn descriptors(&self) -> Result<Vec<Arc<ViewerDescriptor>>, PluginLoadError> {
        let state = self.lock();
        state.ensure_initialized()?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.plugins.get(id))
            .map(|p| p.descriptor.clone())
            .collect())
    }

    pub fn descriptor(&self, id: &str) -> Result<Arc<ViewerDescriptor>, PluginLoadError> {
        Ok(self.lock().plugin(id)?.descriptor.clone())
    }

    /// Catalog entries that were left out at initialisation.
    pub fn excluded(&self) -> Vec<ExcludedViewer> {
        self.lock().excluded.clone()
    }

    /// Ordered compatible viewers for a file set. No I/O, nothing loaded.
    pub fn get_compatible_viewers(
        &self,
        extensions: &HashSet<String>,
        is_multi_file: bool,
        is_preview: bool,
    ) -> Result<Vec<Arc<ViewerDescriptor>>, PluginLoadError> {
        let state = self.lock();
        state.ensure_initialized()?;
        let eligible = state
            .order
            .iter()
            .filter_map(|id| state.plugins.get(id))
            .map(|p| &p.descriptor);
        Ok(resolver::resolve(eligible, extensions, is_multi_file, is_preview))
    }

    /// `get_compatible_viewers` for a list of files.
    pub fn compatible_for_files(
        &self,
        files: &[FileDescriptor],
        is_preview: bool,
    ) -> Result<Vec<Arc<ViewerDescriptor>>, PluginLoadError> {
        self.get_compatible_viewers(
            &resolver::file_extensions(files),
            resolver::is_multi_file(files),
            is_preview,
        )
    }

    pub fn status(&self, id: &str) -> Result<LoadStatus, PluginLoadError> {
        Ok(self.lock().plugin(id)?.state.status())
    }

    pub fn active_plugin(&self) -> Option<String> {
        self.lock().active_id.clone()
    }

    /// Ids of every viewer currently loaded, in catalog order.
    pub fn loaded_plugins(&self) -> Vec<String> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter(|id| {
                state
                    .plugins
                    .get(*id)
                    .is_some_and(|p| p.state.status() == LoadStatus::Loaded)
            })
            .cloned()
            .collect()
    }

    /// Load a viewer's implementation and dependency module.
    ///
    /// Returns the cached handle if already loaded, and joins the in-flight
    /// request if one is running. A failed implementation load returns the
    /// viewer to `Unloaded`. Must be called from within a Tokio runtime.
    pub async fn load_plugin(&self, id: &str) -> Result<LoadedViewerHandle, PluginLoadError> {
        let in_flight = {
            let mut state = self.lock();
            let plugin = state.plugin_mut(id)?;

            match &mut plugin.state {
                LoadState::Loaded(handle) => return Ok(handle.clone()),
                LoadState::Loading(in_flight) => {
                    tracing::debug!(plugin = %id, "Joining in-flight viewer load");
                    in_flight.abandoned = false;
                    in_flight.clone()
                }
                LoadState::Unloaded => {
                    tracing::debug!(plugin = %id, "Loading viewer");
                    let in_flight = self.spawn_load(plugin.descriptor.clone());
                    plugin.state = LoadState::Loading(in_flight.clone());
                    in_flight
                }
            }
        };

        let result = in_flight.pending.clone().await;
        self.settle(id, in_flight.token, &result);
        result
    }

    fn spawn_load(&self, descriptor: Arc<ViewerDescriptor>) -> InFlight {
        let token = Uuid::new_v4();
        let id = descriptor.id.clone();
        let loader = self.loader.clone();
        let state = Arc::clone(&self.state);
        let tracker = Arc::clone(self.tracker());

        let task = tokio::spawn({
            let id = id.clone();
            async move {
                let result = Self::fetch(loader, descriptor).await;
                Self::settle_in(&state, &tracker, &id, token, &result);
                result
            }
        });

        let pending = async move {
            task.await.unwrap_or_else(|e| {
                Err(PluginLoadError::implementation(
                    &id,
                    anyhow::anyhow!("load task failed: {}", e),
                ))
            })
        }
        .boxed()
        .shared();

        InFlight {
            token,
            pending,
            abandoned: false,
        }
    }

    async fn fetch(
        loader: DependencyLoader,
        descriptor: Arc<ViewerDescriptor>,
    ) -> Result<LoadedViewerHandle, PluginLoadError> {
        let id = descriptor.id.clone();
        let ctx = loader.context_for(&descriptor);

        let implementation = loader
            .load_implementation(&descriptor.implementation_ref, ctx.clone())
            .await
            .map_err(|e| PluginLoadError::implementation(&id, e))?;

        let mut warnings = Vec::new();
        let dependency_module = match &descriptor.dependency_ref {
            Some(reference) => match loader.load_dependency_manager(reference, ctx).await {
                Ok(module) => module,
                Err(e) => {
                    let warning = PluginLoadError::dependency(&id, format!("{:#}", e));
                    tracing::warn!(plugin = %id, "{}", warning);
                    warnings.push(warning);
                    None
                }
            },
            None => None,
        };

        Ok(LoadedViewerHandle {
            plugin_id: id,
            instance_id: Uuid::new_v4(),
            descriptor,
            implementation,
            dependency_module,
            warnings,
        })
    }

    fn settle(&self, id: &str, token: Uuid, result: &Result<LoadedViewerHandle, PluginLoadError>) {
        Self::settle_in(&self.state, self.tracker(), id, token, result);
    }

    /// Record the outcome of a load attempt, unless the viewer moved on
    /// meanwhile. An abandoned attempt that succeeded is unloaded at once.
    fn settle_in(
        state: &Mutex<RegistryState>,
        tracker: &ResourceTracker,
        id: &str,
        token: Uuid,
        result: &Result<LoadedViewerHandle, PluginLoadError>,
    ) {
        let orphan = {
            let mut state = lock_state(state);
            let Some(plugin) = state.plugins.get_mut(id) else {
                return;
            };

            let abandoned = match &plugin.state {
                LoadState::Loading(in_flight) if in_flight.token == token => in_flight.abandoned,
                _ => return,
            };

            match result {
                Ok(handle) if abandoned => {
                    plugin.state = LoadState::Unloaded;
                    Some(handle.clone())
                }
                Ok(handle) => {
                    tracing::info!(plugin = %id, instance = %handle.instance_id, "Loaded viewer");
                    plugin.state = LoadState::Loaded(handle.clone());
                    None
                }
                Err(e) => {
                    tracing::warn!(plugin = %id, "{}", e);
                    plugin.state = LoadState::Unloaded;
                    None
                }
            }
        };

        if let Some(handle) = orphan {
            Self::run_cleanup(&handle);
            tracker.remove_all_for(id);
            tracing::info!(plugin = %id, "Unloaded viewer nobody switched to");
        }
    }

    /// True while `handle` is the viewer's current loaded instance.
    fn is_current(&self, id: &str, handle: &LoadedViewerHandle) -> bool {
        matches!(
            self.lock().plugins.get(id).map(|p| &p.state),
            Some(LoadState::Loaded(current)) if current.instance_id == handle.instance_id
        )
    }

    /// Unload a viewer: dependency cleanup, resource removal, handle dropped.
    ///
    /// A load still in flight is allowed to finish first. Cleanup failures
    /// are logged and never returned.
    pub async fn unload_plugin(&self, id: &str) -> Result<(), PluginLoadError> {
        let in_flight = match &self.lock().plugin(id)?.state {
            LoadState::Loading(in_flight) => Some(in_flight.clone()),
            _ => None,
        };

        if let Some(in_flight) = in_flight {
            tracing::debug!(plugin = %id, "Waiting for in-flight load before unloading");
            let result = in_flight.pending.clone().await;
            self.settle(id, in_flight.token, &result);
        }

        self.unload_now(id);
        Ok(())
    }

    /// Synchronous unload. A load still in flight is detached: it runs to
    /// completion but its result is discarded.
    fn unload_now(&self, id: &str) {
        let handle = {
            let mut state = self.lock();
            if state.active_id.as_deref() == Some(id) {
                state.active_id = None;
            }
            let Some(plugin) = state.plugins.get_mut(id) else {
                return;
            };
            match std::mem::replace(&mut plugin.state, LoadState::Unloaded) {
                LoadState::Unloaded => return,
                LoadState::Loading(_) => None,
                LoadState::Loaded(handle) => Some(handle),
            }
        };

        if let Some(handle) = &handle {
            Self::run_cleanup(handle);
        }
        self.tracker().remove_all_for(id);
        tracing::info!(plugin = %id, "Unloaded viewer");
    }

    fn run_cleanup(handle: &LoadedViewerHandle) -> Option<PluginLoadError> {
        let manager = handle.dependency_manager()?;
        let error = match std::panic::catch_unwind(AssertUnwindSafe(|| manager.cleanup())) {
            Ok(Ok(())) => return None,
            Ok(Err(message)) => PluginLoadError::cleanup(&handle.plugin_id, message),
            Err(panic) => PluginLoadError::cleanup(
                &handle.plugin_id,
                format!("panicked: {}", panic_message(&*panic)),
            ),
        };
        tracing::warn!(plugin = %handle.plugin_id, "{}", error);
        Some(error)
    }

    /// Make `id` the active viewer.
    ///
    /// The previous active viewer, and any viewer whose switch was abandoned
    /// mid-load, is fully unloaded before `id` starts loading. Concurrent
    /// switches run one after another in call order.
    pub async fn switch_to_plugin(&self, id: &str) -> Result<LoadedViewerHandle, PluginLoadError> {
        let _gate = self.switch_gate.lock().await;

        let previous: Vec<String> = {
            let state = self.lock();
            state.plugin(id)?;
            state
                .order
                .iter()
                .filter(|other| other.as_str() != id)
                .filter(|other| {
                    state.active_id.as_deref() == Some(other.as_str())
                        || matches!(
                            state.plugins.get(*other).map(|p| &p.state),
                            Some(LoadState::Loading(in_flight)) if in_flight.abandoned
                        )
                })
                .cloned()
                .collect()
        };

        for previous in previous {
            tracing::info!(from = %previous, to = %id, "Switching viewer");
            if let Err(e) = self.unload_plugin(&previous).await {
                tracing::warn!(plugin = %previous, "Unload before switch failed: {}", e);
            }
        }

        let mut activation = PendingActivation {
            registry: self,
            id,
            armed: true,
        };
        let loaded = self.load_plugin(id).await;
        activation.armed = false;
        let handle = loaded?;

        if !self.is_current(id, &handle) {
            return Err(PluginLoadError::new(
                id,
                PluginErrorKind::ImplementationLoadFailed,
                format!("Viewer {} was unloaded before it could be activated", id),
            ));
        }
        self.lock().active_id = Some(id.to_string());
        Ok(handle)
    }

    /// A switch to `id` was dropped before activating it.
    fn abandon(&self, id: &str) {
        let handle = {
            let mut state = self.lock();
            if state.active_id.as_deref() == Some(id) {
                return;
            }
            let Some(plugin) = state.plugins.get_mut(id) else {
                return;
            };

            if let LoadState::Loading(in_flight) = &mut plugin.state {
                tracing::debug!(plugin = %id, "Switch abandoned; viewer unloads once its load settles");
                in_flight.abandoned = true;
                return;
            }
            match std::mem::replace(&mut plugin.state, LoadState::Unloaded) {
                LoadState::Loaded(handle) => handle,
                other => {
                    plugin.state = other;
                    return;
                }
            }
        };

        Self::run_cleanup(&handle);
        self.tracker().remove_all_for(id);
        tracing::info!(plugin = %id, "Unloaded viewer nobody switched to");
    }

    /// The current handle of a loaded viewer, waiting out an in-flight load.
    async fn loaded_handle(&self, id: &str) -> Result<LoadedViewerHandle, PluginLoadError> {
        let in_flight = match &self.lock().plugin(id)?.state {
            LoadState::Loaded(handle) => return Ok(handle.clone()),
            LoadState::Loading(in_flight) => in_flight.clone(),
            LoadState::Unloaded => return Err(PluginLoadError::not_loaded(id)),
        };

        let result = in_flight.pending.clone().await;
        self.settle(id, in_flight.token, &result);
        let handle = result?;
        if self.is_current(id, &handle) {
            Ok(handle)
        } else {
            Err(PluginLoadError::not_loaded(id))
        }
    }

    /// Run the dependency step of a loaded viewer.
    ///
    /// Dispatches to the entry point named in the catalog, or to the module's
    /// fallback manager. A failing step is reported as
    /// `DependencyOutcome::Failed`, never as an error. A viewer that is not
    /// loaded, or is unloaded while the step runs, gives `NotLoaded`; anything
    /// the step injected for it is rolled back.
    pub async fn load_plugin_dependencies(&self, id: &str) -> Result<DependencyOutcome, PluginLoadError> {
        let handle = self.loaded_handle(id).await?;

        let Some(manager) = handle.dependency_manager() else {
            tracing::debug!(plugin = %id, "Viewer has no dependency step");
            return Ok(DependencyOutcome::NotRequired);
        };

        if let Some(entry) = &handle.descriptor.dependency_entry_point {
            tracing::debug!(
                plugin = %id,
                namespace = %entry.namespace,
                method = entry.load_method.as_deref().unwrap_or("load"),
                "Loading viewer dependencies"
            );
        }

        let outcome = AssertUnwindSafe(manager.load()).catch_unwind().await;

        if !self.is_current(id, &handle) {
            tracing::info!(plugin = %id, "Viewer unloaded while its dependencies loaded; rolling back");
            Self::run_cleanup(&handle);
            let reloaded = matches!(
                self.lock().plugins.get(id).map(|p| &p.state),
                Some(LoadState::Loaded(_))
            );
            // A newer instance keeps the resources; they go when it unloads.
            if !reloaded {
                self.tracker().remove_all_for(id);
            }
            return Err(PluginLoadError::not_loaded(id));
        }

        let failure = match outcome {
            Ok(Ok(())) => {
                tracing::info!(plugin = %id, "Viewer dependencies loaded");
                return Ok(DependencyOutcome::Loaded);
            }
            Ok(Err(message)) => PluginLoadError::dependency(id, message),
            Err(panic) => PluginLoadError::dependency(id, format!("panicked: {}", panic_message(&*panic))),
        };

        tracing::warn!(plugin = %id, "{}", failure);
        Ok(DependencyOutcome::Failed(failure))
    }

    /// Tear down every viewer synchronously, best effort, for host shutdown.
    pub fn cleanup_all(&self) {
        let handles: Vec<LoadedViewerHandle> = {
            let mut state = self.lock();
            state
                .plugins
                .values_mut()
                .filter_map(|plugin| match std::mem::replace(&mut plugin.state, LoadState::Unloaded) {
                    LoadState::Loaded(handle) => Some(handle),
                    _ => None,
                })
                .collect()
        };

        let failures = handles
            .iter()
            .filter_map(Self::run_cleanup)
            .count();

        self.tracker().remove_all();
        self.lock().active_id = None;

        tracing::info!(unloaded = handles.len(), failures, "Cleaned up all viewers");
    }
}

/// Abandons the switch's load if the switch is dropped before activation.
struct PendingActivation<'a> {
    registry: &'a PluginRegistry,
    id: &'a str,
    armed: bool,
}

impl Drop for PendingActivation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.abandon(self.id);
        }
    }
}

fn lock_state(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

//! Host controller: picks a viewer for a file set and mounts it.

use std::sync::{Arc, Mutex, MutexGuard};
use viewer_plugin_interface::{MountedView, ViewerCallbacks, ViewerContext, ViewerMode, ViewerProps};

use crate::catalog::ViewerDescriptor;
use crate::registry::{DependencyOutcome, LoadedViewerHandle, PluginErrorKind, PluginLoadError, PluginRegistry};
use crate::resolver::FileDescriptor;

/// What the host wants to show.
#[derive(Debug, Clone, Default)]
pub struct ShowRequest {
    pub asset_id: String,
    pub database_id: String,
    pub files: Vec<FileDescriptor>,
    pub is_preview: bool,
    /// Explicit viewer choice; must be one of the compatible viewers.
    pub viewer: Option<String>,
    pub viewer_mode: ViewerMode,
}

/// Outcome of `HostController::show`.
#[derive(Debug)]
pub enum HostView {
    /// No viewer can open the file set.
    Empty,
    /// The selected viewer could not be loaded or mounted.
    Failed {
        viewer_id: String,
        message: String,
        /// Other compatible viewers the user may pick instead.
        alternatives: Vec<String>,
    },
    Mounted {
        viewer_id: String,
        view: MountedView,
        handle: LoadedViewerHandle,
        warnings: Vec<PluginLoadError>,
    },
}

/// Callbacks that log viewer requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallbacks;

impl ViewerCallbacks for LoggingCallbacks {
    fn on_viewer_mode_change(&self, mode: ViewerMode) {
        tracing::info!(%mode, "Viewer requested mode change");
    }

    fn on_delete_preview(&self) {
        tracing::info!("Viewer requested preview deletion");
    }
}

pub struct HostController {
    registry: Arc<PluginRegistry>,
    callbacks: Arc<dyn ViewerCallbacks>,
    mounted: Mutex<Option<LoadedViewerHandle>>,
}

impl HostController {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self::with_callbacks(registry, Arc::new(LoggingCallbacks))
    }

    pub fn with_callbacks(registry: Arc<PluginRegistry>, callbacks: Arc<dyn ViewerCallbacks>) -> Self {
        Self {
            registry,
            callbacks,
            mounted: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    fn mounted(&self) -> MutexGuard<'_, Option<LoadedViewerHandle>> {
        self.mounted.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Id of the viewer currently mounted.
    pub fn mounted_viewer(&self) -> Option<String> {
        self.mounted().as_ref().map(|handle| handle.plugin_id.clone())
    }

    /// Resolve, switch, load dependencies and mount.
    ///
    /// Only registry-level failures (catalog, unknown viewer) are errors. A
    /// viewer that fails to load or mount yields `HostView::Failed`.
    pub async fn show(&self, request: &ShowRequest) -> Result<HostView, PluginLoadError> {
        self.registry.initialize().await?;

        let compatible = self
            .registry
            .compatible_for_files(&request.files, request.is_preview)?;
        let keys = storage_keys(&request.files);
        if compatible.is_empty() || keys.is_empty() {
            tracing::info!(files = request.files.len(), "No compatible viewer");
            self.unmount_current();
            return Ok(HostView::Empty);
        }

        let selected = match &request.viewer {
            Some(id) => compatible
                .iter()
                .find(|d| &d.id == id)
                .cloned()
                .ok_or_else(|| {
                    PluginLoadError::new(
                        id,
                        PluginErrorKind::UnknownPlugin,
                        format!("Viewer {} cannot open these files", id),
                    )
                })?,
            None => compatible[0].clone(),
        };
        let alternatives: Vec<String> = compatible
            .iter()
            .filter(|d| d.id != selected.id)
            .map(|d| d.id.clone())
            .collect();

        if self.mounted_viewer().is_some_and(|id| id != selected.id) {
            self.unmount_current();
        }

        let handle = match self.registry.switch_to_plugin(&selected.id).await {
            Ok(handle) => handle,
            Err(e) if e.error_kind == PluginErrorKind::ImplementationLoadFailed => {
                return Ok(HostView::Failed {
                    viewer_id: selected.id.clone(),
                    message: e.message,
                    alternatives,
                });
            }
            Err(e) => return Err(e),
        };

        let mut warnings = handle.warnings.clone();
        let dependencies = match self.registry.load_plugin_dependencies(&selected.id).await? {
            DependencyOutcome::Loaded => handle.dependency_manager(),
            DependencyOutcome::NotRequired => None,
            DependencyOutcome::Failed(warning) => {
                warnings.push(warning);
                None
            }
        };

        let props = build_props(request, &selected, keys);
        let ctx = ViewerContext {
            dependencies,
            callbacks: self.callbacks.clone(),
        };

        match handle.implementation.mount(&props, ctx) {
            Ok(view) => {
                tracing::info!(viewer = %selected.id, "Mounted viewer");
                *self.mounted() = Some(handle.clone());
                Ok(HostView::Mounted {
                    viewer_id: selected.id.clone(),
                    view,
                    handle,
                    warnings,
                })
            }
            Err(message) => {
                tracing::warn!(viewer = %selected.id, "Mount failed: {}", message);
                Ok(HostView::Failed {
                    viewer_id: selected.id.clone(),
                    message,
                    alternatives,
                })
            }
        }
    }

    fn unmount_current(&self) {
        if let Some(handle) = self.mounted().take() {
            handle.implementation.unmount();
        }
    }

    /// Unmount and tear down every viewer. Safe to call more than once.
    pub fn teardown(&self) {
        self.unmount_current();
        self.registry.cleanup_all();
    }
}

fn storage_keys(files: &[FileDescriptor]) -> Vec<String> {
    files
        .iter()
        .filter(|f| !f.is_directory)
        .map(|f| f.storage_key.clone())
        .collect()
}

/// Props carry `asset_key` for one file and `multi_file_keys` for several.
fn build_props(request: &ShowRequest, descriptor: &ViewerDescriptor, mut keys: Vec<String>) -> ViewerProps {
    let mut props = if keys.len() == 1 {
        let mut props = ViewerProps::single(&request.asset_id, &request.database_id, keys.remove(0));
        props.version_id = request
            .files
            .iter()
            .find(|f| !f.is_directory)
            .and_then(|f| f.version_id.clone());
        props
    } else {
        ViewerProps::multi(&request.asset_id, &request.database_id, keys)
    };

    props.viewer_mode = request.viewer_mode;
    if request.is_preview {
        props.is_preview_file = Some(true);
    }
    if !descriptor.custom_parameters.is_empty() {
        props.custom_parameters = Some(descriptor.custom_parameters.clone());
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin;
    use crate::catalog::CatalogSource;
    use crate::document::{Document, ResourceKind};
    use crate::features::FeatureSet;
    use crate::loader::{DependencyLoader, OfflineFetcher, PollBudget, ResourceLoader};
    use crate::tracker::ResourceTracker;
    use std::time::Duration;

    fn controller(features: &str) -> HostController {
        let tracker = Arc::new(ResourceTracker::new(Arc::new(Document::new())));
        let resources = Arc::new(
            ResourceLoader::new(Arc::new(OfflineFetcher), tracker).with_poll_budget(PollBudget {
                attempts: 3,
                interval: Duration::from_millis(1),
            }),
        );
        let registry = PluginRegistry::new(
            CatalogSource::Builtin,
            Some(FeatureSet::from_csv(features)),
            DependencyLoader::new(builtin::module_table(), resources),
        );
        HostController::new(Arc::new(registry))
    }

    fn request(files: &[&str]) -> ShowRequest {
        ShowRequest {
            asset_id: "asset-1".into(),
            database_id: "db-1".into(),
            files: files.iter().map(|f| FileDescriptor::file(*f)).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_show_picks_highest_priority() {
        let host = controller("");
        let view = host.show(&request(&["scan.ply"])).await.unwrap();

        match view {
            HostView::Mounted { viewer_id, view, .. } => {
                assert_eq!(viewer_id, "online3d");
                assert!(view.summary.contains("scan.ply"));
                assert!(view.summary.contains("runtime attached"));
            }
            other => panic!("expected mounted view, got {other:?}"),
        }
        assert_eq!(host.mounted_viewer().as_deref(), Some("online3d"));
    }

    #[tokio::test]
    async fn test_show_explicit_selection() {
        let host = controller("");
        let mut req = request(&["scan.ply"]);
        req.viewer = Some("potree".into());

        let view = host.show(&req).await.unwrap();
        assert!(matches!(view, HostView::Mounted { ref viewer_id, .. } if viewer_id == "potree"));
        assert!(host
            .registry()
            .tracker()
            .document()
            .contains(ResourceKind::Stylesheet, "viewers/potree/potree.css"));
    }

    #[tokio::test]
    async fn test_show_incompatible_selection_is_error() {
        let host = controller("");
        let mut req = request(&["photo.png"]);
        req.viewer = Some("potree".into());

        let err = host.show(&req).await.unwrap_err();
        assert_eq!(err.error_kind, PluginErrorKind::UnknownPlugin);
    }

    #[tokio::test]
    async fn test_show_nothing_compatible() {
        let host = controller("");
        let view = host.show(&request(&["archive.zip"])).await.unwrap();
        assert!(matches!(view, HostView::Empty));
    }

    #[tokio::test]
    async fn test_show_preview_uses_preview_viewer() {
        let host = controller("");
        let mut req = request(&["photo.png"]);
        req.is_preview = true;

        match host.show(&req).await.unwrap() {
            HostView::Mounted { viewer_id, handle, .. } => {
                assert_eq!(viewer_id, "preview");
                assert!(handle.descriptor.is_preview_mode);
            }
            other => panic!("expected preview, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_switching_files_releases_previous_runtime() {
        let host = controller("");
        let mut req = request(&["scan.e57"]);
        req.viewer = Some("potree".into());
        host.show(&req).await.unwrap();

        host.show(&request(&["photo.png"])).await.unwrap();

        let document = host.registry().tracker().document();
        assert!(!document.contains(ResourceKind::Stylesheet, "viewers/potree/potree.css"));
        assert_eq!(host.registry().active_plugin().as_deref(), Some("image"));
    }

    #[tokio::test]
    async fn test_feature_gated_viewer_needs_flag() {
        let host = controller("");
        let view = host.show(&request(&["tileset.json"])).await.unwrap();
        assert!(matches!(view, HostView::Mounted { ref viewer_id, .. } if viewer_id == "text"));

        let host = controller("LOCATIONSERVICES");
        let view = host.show(&request(&["tileset.json"])).await.unwrap();
        assert!(matches!(view, HostView::Mounted { ref viewer_id, .. } if viewer_id == "cesium"));
    }

    #[test]
    fn test_build_props_single_and_multi() {
        let descriptor = ViewerDescriptor::new("online3d", "Online3dViewer");
        let mut req = request(&["a.glb"]);
        req.files[0].version_id = Some("v3".into());

        let props = build_props(&req, &descriptor, storage_keys(&req.files));
        assert_eq!(props.asset_key.as_deref(), Some("a.glb"));
        assert_eq!(props.multi_file_keys, None);
        assert_eq!(props.version_id.as_deref(), Some("v3"));

        let req = request(&["a.glb", "b.glb"]);
        let props = build_props(&req, &descriptor, storage_keys(&req.files));
        assert_eq!(props.asset_key, None);
        assert_eq!(props.multi_file_keys, Some(vec!["a.glb".to_string(), "b.glb".to_string()]));
        assert!(props.validate().is_ok());
    }

    #[tokio::test]
    async fn test_teardown_clears_everything() {
        let host = controller("");
        let mut req = request(&["scan.e57"]);
        req.viewer = Some("potree".into());
        host.show(&req).await.unwrap();

        host.teardown();
        host.teardown();

        assert_eq!(host.mounted_viewer(), None);
        assert_eq!(host.registry().active_plugin(), None);
        assert!(host.registry().tracker().document().is_empty());
    }
}

//! Viewer implementation trait.

use std::fmt::Debug;
use std::sync::Arc;

use crate::dependency::DependencyManager;
use crate::props::{ViewerMode, ViewerProps};

/// Host callbacks a mounted viewer may invoke.
pub trait ViewerCallbacks: Send + Sync {
    /// The viewer asks the host to change its display mode.
    fn on_viewer_mode_change(&self, mode: ViewerMode);

    /// The viewer asks the host to delete the preview file it is showing.
    fn on_delete_preview(&self) {}
}

/// Callbacks that ignore every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl ViewerCallbacks for NoopCallbacks {
    fn on_viewer_mode_change(&self, _mode: ViewerMode) {}
}

/// Everything a viewer gets at mount time besides its props.
///
/// The dependency runtime is handed over explicitly; viewers never look it up
/// through process-wide state.
#[derive(Clone)]
pub struct ViewerContext {
    pub dependencies: Option<Arc<dyn DependencyManager>>,
    pub callbacks: Arc<dyn ViewerCallbacks>,
}

impl Default for ViewerContext {
    fn default() -> Self {
        Self {
            dependencies: None,
            callbacks: Arc::new(NoopCallbacks),
        }
    }
}

/// Result of a successful mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedView {
    /// Id of the viewer that mounted.
    pub viewer_id: String,
    /// Short human-readable description of what is on screen.
    pub summary: String,
}

/// A viewer implementation, produced by the host's module table.
///
/// # Example (for viewer implementors)
///
/// ```
/// use viewer_plugin_interface::{MountedView, ViewerContext, ViewerImplementation, ViewerProps};
///
/// #[derive(Debug)]
/// struct TextViewer;
///
/// impl ViewerImplementation for TextViewer {
///     fn id(&self) -> &str {
///         "text"
///     }
///
///     fn mount(&self, props: &ViewerProps, _ctx: ViewerContext) -> Result<MountedView, String> {
///         Ok(MountedView {
///             viewer_id: self.id().to_string(),
///             summary: format!("{} file(s)", props.keys().len()),
///         })
///     }
/// }
/// ```
pub trait ViewerImplementation: Send + Sync + Debug {
    /// Catalog id this implementation was built for.
    fn id(&self) -> &str;

    /// Attach the viewer to the host surface.
    fn mount(&self, props: &ViewerProps, ctx: ViewerContext) -> Result<MountedView, String>;

    /// Detach from the host surface. Called before the host switches away.
    fn unmount(&self) {}
}

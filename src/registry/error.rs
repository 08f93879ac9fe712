//! Registry error taxonomy.

use std::sync::Arc;

use crate::catalog::CatalogError;

/// Kinds of registry errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginErrorKind {
    /// An operation ran before `initialize`.
    NotInitialized,
    /// The id is not in the eligible catalog.
    UnknownPlugin,
    /// The catalog document is unreadable or malformed.
    Catalog,
    /// The viewer is not loaded, or was unloaded while an operation ran.
    NotLoaded,
    /// The viewer implementation could not be loaded. Fatal to that load.
    ImplementationLoadFailed,
    /// The dependency manager could not be loaded or run. Non-fatal.
    DependencyLoadFailed,
    /// A dependency manager's cleanup failed or panicked. Non-fatal.
    CleanupFailed,
}

impl PluginErrorKind {
    /// Fatal errors propagate to the host; the rest are warnings.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PluginErrorKind::NotInitialized
                | PluginErrorKind::UnknownPlugin
                | PluginErrorKind::Catalog
                | PluginErrorKind::NotLoaded
                | PluginErrorKind::ImplementationLoadFailed
        )
    }
}

/// Error when loading, switching or cleaning up a viewer.
///
/// Cloneable so that every caller awaiting the same in-flight load receives
/// the same error; the cause is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PluginLoadError {
    /// Id of the viewer involved (empty for registry-wide errors).
    pub plugin_id: String,
    /// Category of the error.
    pub error_kind: PluginErrorKind,
    /// Human-readable error message.
    pub message: String,
    source: Option<Arc<anyhow::Error>>,
}

impl PluginLoadError {
    pub fn new(plugin_id: &str, error_kind: PluginErrorKind, message: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            error_kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn not_initialized() -> Self {
        Self::new("", PluginErrorKind::NotInitialized, "Viewer registry is not initialized")
    }

    pub fn unknown(plugin_id: &str) -> Self {
        Self::new(
            plugin_id,
            PluginErrorKind::UnknownPlugin,
            format!("Viewer {} is not registered", plugin_id),
        )
    }

    pub fn not_loaded(plugin_id: &str) -> Self {
        Self::new(
            plugin_id,
            PluginErrorKind::NotLoaded,
            format!("Viewer {} is not loaded", plugin_id),
        )
    }

    pub fn catalog(err: CatalogError) -> Self {
        Self::new("", PluginErrorKind::Catalog, err.to_string()).with_source(err.into())
    }

    pub fn implementation(plugin_id: &str, cause: anyhow::Error) -> Self {
        Self::new(
            plugin_id,
            PluginErrorKind::ImplementationLoadFailed,
            format!("Viewer {} failed to load: {:#}", plugin_id, cause),
        )
        .with_source(cause)
    }

    pub fn dependency(plugin_id: &str, message: impl std::fmt::Display) -> Self {
        Self::new(
            plugin_id,
            PluginErrorKind::DependencyLoadFailed,
            format!("Viewer {} dependencies failed to load: {}", plugin_id, message),
        )
    }

    pub fn cleanup(plugin_id: &str, message: impl std::fmt::Display) -> Self {
        Self::new(
            plugin_id,
            PluginErrorKind::CleanupFailed,
            format!("Viewer {} cleanup failed: {}", plugin_id, message),
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.error_kind.is_fatal()
    }
}

impl std::fmt::Display for PluginLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PluginLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|cause| -> &(dyn std::error::Error + 'static) { cause.as_ref() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_is_message() {
        let err = PluginLoadError::unknown("potree");
        assert_eq!(err.to_string(), "Viewer potree is not registered");
        assert_eq!(err.error_kind, PluginErrorKind::UnknownPlugin);
    }

    #[test]
    fn test_implementation_error_keeps_cause_chain() {
        let cause = anyhow::anyhow!("chunk 404").context("module 'PotreeViewer' failed to load");
        let err = PluginLoadError::implementation("potree", cause);

        assert_eq!(err.plugin_id, "potree");
        assert!(err.message.contains("module 'PotreeViewer' failed to load"));
        assert!(err.message.contains("chunk 404"));
        assert!(err.source().is_some());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fatality_by_kind() {
        assert!(PluginErrorKind::NotInitialized.is_fatal());
        assert!(PluginErrorKind::Catalog.is_fatal());
        assert!(PluginLoadError::not_loaded("potree").is_fatal());
        assert!(!PluginErrorKind::DependencyLoadFailed.is_fatal());
        assert!(!PluginErrorKind::CleanupFailed.is_fatal());
    }

    #[test]
    fn test_catalog_error_conversion() {
        let err = PluginLoadError::catalog(CatalogError {
            origin: "inline".into(),
            message: "invalid JSON".into(),
        });
        assert_eq!(err.error_kind, PluginErrorKind::Catalog);
        assert_eq!(err.to_string(), "catalog inline: invalid JSON");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_clone_shares_cause() {
        let err = PluginLoadError::implementation("image", anyhow::anyhow!("boom"));
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
        assert!(cloned.source().is_some());
    }

    #[test]
    fn test_is_error() {
        let err = PluginLoadError::cleanup("cesium", "viewer already destroyed");
        let _: &dyn std::error::Error = &err;
        assert!(!err.is_fatal());
    }
}

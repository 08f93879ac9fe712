//! Viewer descriptor parsing and validation.
//!
//! A descriptor is the immutable catalog record for one viewer: what it can
//! open, how it is loaded, and which feature flags gate it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};

/// Extension value that matches every file.
pub const WILDCARD_EXTENSION: &str = "*";

/// Names the dependency-manager export a viewer uses.
///
/// `load_method` and `cleanup_method` are descriptive labels kept for
/// diagnostics; dispatch goes through the typed `DependencyManager` found
/// under `namespace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEntryPoint {
    pub namespace: String,
    #[serde(default)]
    pub load_method: Option<String>,
    #[serde(default)]
    pub cleanup_method: Option<String>,
}

/// Catalog record for one viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerDescriptor {
    /// Unique catalog key (required, must not be empty)
    pub id: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub description: String,

    /// Key into the implementation module table (required)
    pub implementation_ref: String,

    /// Key into the dependency-manager module table
    #[serde(default)]
    pub dependency_ref: Option<String>,

    #[serde(default)]
    pub dependency_entry_point: Option<DependencyEntryPoint>,

    /// Lowercase extensions with a leading dot, or the wildcard
    #[serde(default)]
    pub supported_extensions: BTreeSet<String>,

    #[serde(default)]
    pub supports_multi_file: bool,

    #[serde(default)]
    pub can_fullscreen: bool,

    /// Lower is preferred
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default)]
    pub category: String,

    /// Reserved for preview file sets; never offered otherwise
    #[serde(default)]
    pub is_preview_mode: bool,

    #[serde(default)]
    pub required_feature_flags: BTreeSet<String>,

    /// Passed through to the mounted viewer untouched
    #[serde(default)]
    pub custom_parameters: Map<String, Value>,

    /// Minimum viewer interface version the implementation needs
    #[serde(default)]
    pub min_interface_version: Option<String>,
}

fn default_priority() -> i32 {
    100
}

/// Normalise one extension: trimmed, lowercase, with a leading dot.
pub fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed == WILDCARD_EXTENSION || trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

impl ViewerDescriptor {
    /// Minimal descriptor, used by tests and programmatic catalogs.
    pub fn new(id: impl Into<String>, implementation_ref: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            description: String::new(),
            implementation_ref: implementation_ref.into(),
            dependency_ref: None,
            dependency_entry_point: None,
            supported_extensions: BTreeSet::new(),
            supports_multi_file: false,
            can_fullscreen: false,
            priority: default_priority(),
            category: String::new(),
            is_preview_mode: false,
            required_feature_flags: BTreeSet::new(),
            custom_parameters: Map::new(),
            min_interface_version: None,
        }
    }

    /// Rewrite extensions into their canonical form.
    pub fn normalize(&mut self) {
        self.supported_extensions = self
            .supported_extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| ext != ".")
            .collect();
    }

    /// Validate the descriptor fields.
    ///
    /// Checks:
    /// - id is not empty
    /// - implementation_ref is not empty
    /// - a dependency entry point comes with a dependency_ref
    /// - min_interface_version is valid semver if present
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Viewer id cannot be empty".to_string());
        }

        if self.implementation_ref.trim().is_empty() {
            return Err(format!("Viewer '{}' has an empty implementationRef", self.id));
        }

        if self.dependency_entry_point.is_some() && self.dependency_ref.is_none() {
            return Err(format!(
                "Viewer '{}' names a dependencyEntryPoint but no dependencyRef",
                self.id
            ));
        }

        if let Some(entry) = &self.dependency_entry_point
            && entry.namespace.trim().is_empty()
        {
            return Err(format!("Viewer '{}' has an empty dependency namespace", self.id));
        }

        if let Some(ref min_ver) = self.min_interface_version
            && semver::Version::parse(min_ver).is_err()
        {
            return Err(format!(
                "Viewer '{}' has invalid minInterfaceVersion '{}'",
                self.id, min_ver
            ));
        }

        Ok(())
    }

    /// True if the wildcard is listed or any extension overlaps.
    pub fn matches_extensions(&self, extensions: &HashSet<String>) -> bool {
        self.supported_extensions.contains(WILDCARD_EXTENSION)
            || extensions
                .iter()
                .any(|ext| self.supported_extensions.contains(ext))
    }

    pub fn display_label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_descriptor() {
        let json = r#"{
            "id": "potree",
            "displayName": "Point Cloud",
            "description": "Potree point cloud viewer",
            "implementationRef": "PotreeViewer",
            "dependencyRef": "potree",
            "dependencyEntryPoint": {
                "namespace": "PotreeDependencyManager",
                "loadMethod": "loadPotree",
                "cleanupMethod": "cleanup"
            },
            "supportedExtensions": [".E57", "laz", ".las"],
            "supportsMultiFile": false,
            "canFullscreen": true,
            "priority": 1,
            "category": "3d",
            "requiredFeatureFlags": ["ALLOWUNSAFEEVAL"],
            "customParameters": {"pointBudget": 1000000},
            "minInterfaceVersion": "0.1.0"
        }"#;
        let mut descriptor: ViewerDescriptor = serde_json::from_str(json).unwrap();
        descriptor.normalize();

        assert_eq!(descriptor.id, "potree");
        assert_eq!(descriptor.dependency_ref.as_deref(), Some("potree"));
        assert_eq!(
            descriptor.dependency_entry_point.as_ref().unwrap().namespace,
            "PotreeDependencyManager"
        );
        assert!(descriptor.supported_extensions.contains(".e57"));
        assert!(descriptor.supported_extensions.contains(".laz"));
        assert!(descriptor.can_fullscreen);
        assert_eq!(descriptor.custom_parameters["pointBudget"], 1000000);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_descriptor_defaults() {
        let json = r#"{"id": "pdf", "implementationRef": "PdfViewer"}"#;
        let descriptor: ViewerDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.priority, 100);
        assert!(!descriptor.is_preview_mode);
        assert!(!descriptor.supports_multi_file);
        assert!(descriptor.required_feature_flags.is_empty());
        assert!(descriptor.custom_parameters.is_empty());
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let json = r#"{"id": "pdf", "implementationRef": "PdfViewer", "futureField": 3}"#;
        let descriptor: ViewerDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.id, "pdf");
    }

    #[test]
    fn test_validate_empty_id() {
        let descriptor = ViewerDescriptor::new("", "ImageViewer");
        assert!(descriptor.validate().unwrap_err().contains("id cannot be empty"));
    }

    #[test]
    fn test_validate_empty_implementation_ref() {
        let descriptor = ViewerDescriptor::new("image", " ");
        assert!(descriptor.validate().unwrap_err().contains("implementationRef"));
    }

    #[test]
    fn test_validate_entry_point_without_dependency_ref() {
        let mut descriptor = ViewerDescriptor::new("cesium", "CesiumViewer");
        descriptor.dependency_entry_point = Some(DependencyEntryPoint {
            namespace: "CesiumDependencyManager".into(),
            load_method: None,
            cleanup_method: None,
        });
        assert!(descriptor.validate().unwrap_err().contains("no dependencyRef"));
    }

    #[test]
    fn test_validate_bad_interface_version() {
        let mut descriptor = ViewerDescriptor::new("image", "ImageViewer");
        descriptor.min_interface_version = Some("one".into());
        assert!(descriptor.validate().unwrap_err().contains("minInterfaceVersion"));
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("PNG"), ".png");
        assert_eq!(normalize_extension(".Glb"), ".glb");
        assert_eq!(normalize_extension(" * "), "*");
    }

    #[test]
    fn test_matches_wildcard() {
        let mut descriptor = ViewerDescriptor::new("preview", "PreviewViewer");
        descriptor.supported_extensions.insert(WILDCARD_EXTENSION.into());
        let exts: HashSet<String> = [".xyz".to_string()].into_iter().collect();
        assert!(descriptor.matches_extensions(&exts));
        assert!(descriptor.matches_extensions(&HashSet::new()));
    }

    #[test]
    fn test_matches_requires_overlap() {
        let mut descriptor = ViewerDescriptor::new("image", "ImageViewer");
        descriptor.supported_extensions.insert(".png".into());
        let png: HashSet<String> = [".png".to_string()].into_iter().collect();
        let pdf: HashSet<String> = [".pdf".to_string()].into_iter().collect();
        assert!(descriptor.matches_extensions(&png));
        assert!(!descriptor.matches_extensions(&pdf));
    }
}

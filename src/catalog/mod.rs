//! Viewer catalog: the declarative, ordered table of viewer descriptors.
//!
//! The catalog is read once when the registry initialises. A malformed
//! document is fatal; everything else about individual entries is decided
//! later by the registry.

pub mod descriptor;

pub use descriptor::{normalize_extension, DependencyEntryPoint, ViewerDescriptor, WILDCARD_EXTENSION};

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Catalog shipped with the crate.
pub const BUILTIN_CATALOG: &str = include_str!("../../config/viewers.json");

/// Error when the catalog document cannot be read or is malformed.
#[derive(Debug, Clone)]
pub struct CatalogError {
    /// Where the catalog came from ("builtin", a path, or "inline").
    pub origin: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "catalog {}: {}", self.origin, self.message)
    }
}

impl std::error::Error for CatalogError {}

#[derive(Deserialize)]
struct WrappedCatalog {
    viewers: Vec<ViewerDescriptor>,
}

/// Ordered, validated list of descriptors.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    descriptors: Vec<Arc<ViewerDescriptor>>,
}

impl Catalog {
    /// Parse a JSON catalog: a bare array, or `{ "viewers": [...] }`.
    pub fn from_json(origin: &str, content: &str) -> Result<Self, CatalogError> {
        let invalid = |e: serde_json::Error| CatalogError {
            origin: origin.to_string(),
            message: format!("invalid JSON: {}", e),
        };

        // Pick the shape up front so field errors keep their line and column.
        let descriptors = if content.trim_start().starts_with('[') {
            serde_json::from_str::<Vec<ViewerDescriptor>>(content).map_err(invalid)?
        } else {
            serde_json::from_str::<WrappedCatalog>(content)
                .map_err(invalid)?
                .viewers
        };

        Self::from_descriptors(origin, descriptors)
    }

    /// Build a catalog from descriptors, normalising and validating each one.
    pub fn from_descriptors(
        origin: &str,
        descriptors: Vec<ViewerDescriptor>,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(descriptors.len());

        for mut descriptor in descriptors {
            descriptor.normalize();
            descriptor.validate().map_err(|message| CatalogError {
                origin: origin.to_string(),
                message,
            })?;

            if !seen.insert(descriptor.id.clone()) {
                return Err(CatalogError {
                    origin: origin.to_string(),
                    message: format!("duplicate viewer id '{}'", descriptor.id),
                });
            }

            validated.push(Arc::new(descriptor));
        }

        Ok(Self {
            descriptors: validated,
        })
    }

    /// The catalog embedded in the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json("builtin", BUILTIN_CATALOG)
    }

    /// Descriptors in catalog order.
    pub fn descriptors(&self) -> &[Arc<ViewerDescriptor>] {
        &self.descriptors
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ViewerDescriptor>> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Where the registry reads its catalog from.
#[derive(Debug, Clone, Default)]
pub enum CatalogSource {
    /// The embedded catalog.
    #[default]
    Builtin,
    /// A JSON file on disk.
    File(PathBuf),
    /// A JSON document held in memory.
    Inline(String),
    /// Descriptors constructed in code.
    Descriptors(Vec<ViewerDescriptor>),
}

impl CatalogSource {
    /// Read and validate the catalog.
    pub async fn read(&self) -> Result<Catalog, CatalogError> {
        match self {
            CatalogSource::Builtin => Catalog::builtin(),
            CatalogSource::File(path) => {
                let origin = path.display().to_string();
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| CatalogError {
                        origin: origin.clone(),
                        message: format!("failed to read: {}", e),
                    })?;
                Catalog::from_json(&origin, &content)
            }
            CatalogSource::Inline(content) => Catalog::from_json("inline", content),
            CatalogSource::Descriptors(descriptors) => {
                Catalog::from_descriptors("inline", descriptors.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.is_empty());
        assert!(catalog.descriptors().iter().any(|d| d.is_preview_mode));
        assert!(catalog.descriptors().iter().any(|d| !d.is_preview_mode));
    }

    #[test]
    fn test_parse_bare_array() {
        let catalog = Catalog::from_json(
            "test",
            r#"[{"id": "a", "implementationRef": "A"}, {"id": "b", "implementationRef": "B"}]"#,
        )
        .unwrap();
        let ids: Vec<&str> = catalog.descriptors().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_wrapped_document() {
        let catalog = Catalog::from_json(
            "test",
            r#"{"viewers": [{"id": "a", "implementationRef": "A", "supportedExtensions": ["PNG"]}]}"#,
        )
        .unwrap();
        assert!(catalog.get("a").unwrap().supported_extensions.contains(".png"));
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        let err = Catalog::from_json("test", "{not json").unwrap_err();
        assert!(err.message.contains("invalid JSON"));
        assert_eq!(err.origin, "test");
    }

    #[test]
    fn test_malformed_entry_reports_field() {
        let err = Catalog::from_json("test", "[\n  {\"id\": \"a\", \"implementationRef\": \"A\"},\n  {\"id\": \"b\"}\n]")
            .unwrap_err();
        assert!(err.message.contains("missing field `implementationRef`"), "{}", err.message);
        assert!(err.message.contains("line 3"), "{}", err.message);

        let err = Catalog::from_json("test", r#"{"viewers": [{"id": "a", "priority": "high"}]}"#).unwrap_err();
        assert!(err.message.contains("invalid type"), "{}", err.message);
    }

    #[test]
    fn test_object_without_viewers_is_fatal() {
        let err = Catalog::from_json("test", r#"{"plugins": []}"#).unwrap_err();
        assert!(err.message.contains("missing field `viewers`"), "{}", err.message);
    }

    #[test]
    fn test_duplicate_id_is_fatal() {
        let err = Catalog::from_json(
            "test",
            r#"[{"id": "a", "implementationRef": "A"}, {"id": "a", "implementationRef": "B"}]"#,
        )
        .unwrap_err();
        assert!(err.message.contains("duplicate viewer id 'a'"));
    }

    #[test]
    fn test_invalid_descriptor_is_fatal() {
        let err = Catalog::from_json("test", r#"[{"id": "a", "implementationRef": ""}]"#).unwrap_err();
        assert!(err.message.contains("implementationRef"));
    }

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError {
            origin: "viewers.json".into(),
            message: "duplicate viewer id 'a'".into(),
        };
        assert_eq!(err.to_string(), "catalog viewers.json: duplicate viewer id 'a'");
    }

    #[tokio::test]
    async fn test_read_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"[{"id": "pdf", "implementationRef": "PdfViewer"}]"#)
            .unwrap();

        let catalog = CatalogSource::File(file.path().to_path_buf())
            .read()
            .await
            .unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = CatalogSource::File(PathBuf::from("/definitely/not/here.json"))
            .read()
            .await
            .unwrap_err();
        assert!(err.message.contains("failed to read"));
    }
}

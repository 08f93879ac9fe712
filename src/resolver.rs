//! Compatibility resolver.
//!
//! Pure functions that turn a file set into an ordered list of candidate
//! viewers. Preview and non-preview viewers form disjoint partitions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::{normalize_extension, ViewerDescriptor};

/// One entry of the file set handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub name: String,
    pub storage_key: String,
    #[serde(default)]
    pub is_directory: bool,
    #[serde(default)]
    pub version_id: Option<String>,
}

impl FileDescriptor {
    /// A plain file whose storage key is its name.
    pub fn file(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            storage_key: name.clone(),
            name,
            is_directory: false,
            version_id: None,
        }
    }

    /// Lowercase extension with a leading dot, if the name has one.
    pub fn extension(&self) -> Option<String> {
        let base = self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name);
        match base.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(normalize_extension(ext)),
            _ => None,
        }
    }
}

/// Extensions of every non-directory entry.
pub fn file_extensions(files: &[FileDescriptor]) -> HashSet<String> {
    files
        .iter()
        .filter(|f| !f.is_directory)
        .filter_map(FileDescriptor::extension)
        .collect()
}

/// True when the set holds more than one file (directories do not count).
pub fn is_multi_file(files: &[FileDescriptor]) -> bool {
    files.iter().filter(|f| !f.is_directory).count() > 1
}

/// Filter and order the descriptors that can show a file set.
///
/// The sort is stable, so equal priorities keep catalog order. Nothing
/// matching yields an empty list.
pub fn resolve<'a, I>(
    descriptors: I,
    extensions: &HashSet<String>,
    is_multi_file: bool,
    is_preview: bool,
) -> Vec<Arc<ViewerDescriptor>>
where
    I: IntoIterator<Item = &'a Arc<ViewerDescriptor>>,
{
    let mut matches: Vec<Arc<ViewerDescriptor>> = descriptors
        .into_iter()
        .filter(|d| {
            if is_preview {
                d.is_preview_mode
            } else {
                !d.is_preview_mode
                    && (d.supports_multi_file || !is_multi_file)
                    && d.matches_extensions(extensions)
            }
        })
        .cloned()
        .collect();

    matches.sort_by_key(|d| d.priority);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn viewer(id: &str, exts: &[&str], priority: i32) -> Arc<ViewerDescriptor> {
        let mut d = ViewerDescriptor::new(id, id);
        d.supported_extensions = exts.iter().map(|e| e.to_string()).collect();
        d.priority = priority;
        Arc::new(d)
    }

    fn ids(list: &[Arc<ViewerDescriptor>]) -> Vec<&str> {
        list.iter().map(|d| d.id.as_str()).collect()
    }

    fn exts(list: &[&str]) -> HashSet<String> {
        list.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_image_and_preview_scenario() {
        let image = viewer("Image", &[".png"], 1);
        let mut preview = ViewerDescriptor::new("Preview", "Preview");
        preview.supported_extensions.insert("*".into());
        preview.priority = 1;
        preview.is_preview_mode = true;
        let catalog = vec![image, Arc::new(preview)];

        let files = vec![FileDescriptor::file("a.png")];
        let found = file_extensions(&files);

        assert_eq!(ids(&resolve(&catalog, &found, false, false)), vec!["Image"]);
        assert_eq!(ids(&resolve(&catalog, &found, false, true)), vec!["Preview"]);
    }

    #[test]
    fn test_multi_file_scenario() {
        let mut multi = ViewerDescriptor::new("Multi", "Multi");
        multi.supported_extensions.insert(".glb".into());
        multi.supports_multi_file = true;
        let single = viewer("Single", &[".glb"], 100);
        let catalog = vec![Arc::new(multi), single];

        let files = vec![FileDescriptor::file("a.glb"), FileDescriptor::file("b.glb")];
        let result = resolve(&catalog, &file_extensions(&files), is_multi_file(&files), false);
        assert_eq!(ids(&result), vec!["Multi"]);

        let one = vec![FileDescriptor::file("a.glb")];
        let result = resolve(&catalog, &file_extensions(&one), is_multi_file(&one), false);
        assert_eq!(ids(&result), vec!["Multi", "Single"]);
    }

    #[test]
    fn test_priority_order() {
        let catalog = vec![
            viewer("three", &[".ply"], 3),
            viewer("one", &[".ply"], 1),
            viewer("two", &[".ply"], 2),
        ];
        let result = resolve(&catalog, &exts(&[".ply"]), false, false);
        assert_eq!(ids(&result), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_equal_priority_keeps_catalog_order() {
        let catalog = vec![
            viewer("first", &[".ply"], 2),
            viewer("top", &[".ply"], 1),
            viewer("second", &[".ply"], 2),
            viewer("third", &[".ply"], 2),
        ];
        let result = resolve(&catalog, &exts(&[".ply"]), false, false);
        assert_eq!(ids(&result), vec!["top", "first", "second", "third"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        let catalog = vec![viewer("image", &[".png"], 1)];
        assert!(resolve(&catalog, &exts(&[".xyz"]), false, false).is_empty());
        assert!(resolve(&catalog, &HashSet::new(), false, false).is_empty());
    }

    #[test]
    fn test_preview_viewers_never_offered_for_normal_sets() {
        let mut preview = ViewerDescriptor::new("preview", "preview");
        preview.supported_extensions.insert(".png".into());
        preview.is_preview_mode = true;
        let catalog = vec![Arc::new(preview), viewer("image", &[".png"], 5)];

        assert_eq!(ids(&resolve(&catalog, &exts(&[".png"]), false, false)), vec!["image"]);
        assert_eq!(ids(&resolve(&catalog, &exts(&[".png"]), false, true)), vec!["preview"]);
    }

    #[test]
    fn test_preview_ignores_extensions_and_multiplicity() {
        let mut preview = ViewerDescriptor::new("preview", "preview");
        preview.supported_extensions.insert(".jpg".into());
        preview.is_preview_mode = true;
        let catalog = vec![Arc::new(preview)];
        assert_eq!(ids(&resolve(&catalog, &exts(&[".e57"]), true, true)), vec!["preview"]);
    }

    #[test]
    fn test_extension_derivation() {
        assert_eq!(FileDescriptor::file("scan.E57").extension().as_deref(), Some(".e57"));
        assert_eq!(FileDescriptor::file("dir/model.v2.glb").extension().as_deref(), Some(".glb"));
        assert_eq!(FileDescriptor::file("README").extension(), None);
        assert_eq!(FileDescriptor::file(".hidden").extension(), None);
        assert_eq!(FileDescriptor::file("a.dir/README").extension(), None);
    }

    #[test]
    fn test_directories_are_ignored() {
        let mut folder = FileDescriptor::file("textures.png");
        folder.is_directory = true;
        let files = vec![folder, FileDescriptor::file("model.glb")];
        assert_eq!(file_extensions(&files), exts(&[".glb"]));
        assert!(!is_multi_file(&files));
    }
}

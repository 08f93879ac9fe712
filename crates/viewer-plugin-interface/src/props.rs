//! The fixed parameter contract every mounted viewer receives.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Display mode requested by the host or by the viewer itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerMode {
    #[default]
    Wide,
    Fullscreen,
    Collapsed,
}

impl fmt::Display for ViewerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerMode::Wide => write!(f, "wide"),
            ViewerMode::Fullscreen => write!(f, "fullscreen"),
            ViewerMode::Collapsed => write!(f, "collapsed"),
        }
    }
}

/// Parameters passed to a viewer at mount time.
///
/// Exactly one of `asset_key` (single file) or `multi_file_keys` (several
/// files) is populated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerProps {
    pub asset_id: String,
    pub database_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_file_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default)]
    pub viewer_mode: ViewerMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_preview_file: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_parameters: Option<Map<String, Value>>,
}

/// Props that violate the single-file / multi-file contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropsError {
    /// Both `asset_key` and `multi_file_keys` were populated.
    BothKeys,
    /// Neither `asset_key` nor a non-empty `multi_file_keys` was given.
    NoKeys,
}

impl fmt::Display for PropsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropsError::BothKeys => write!(f, "viewer props carry both assetKey and multiFileKeys"),
            PropsError::NoKeys => write!(f, "viewer props carry neither assetKey nor multiFileKeys"),
        }
    }
}

impl std::error::Error for PropsError {}

impl ViewerProps {
    /// Props for a single file.
    pub fn single(asset_id: impl Into<String>, database_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            database_id: database_id.into(),
            asset_key: Some(key.into()),
            ..Default::default()
        }
    }

    /// Props for several files shown together.
    pub fn multi(asset_id: impl Into<String>, database_id: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            database_id: database_id.into(),
            multi_file_keys: Some(keys),
            ..Default::default()
        }
    }

    /// Check the single-file / multi-file exclusivity.
    pub fn validate(&self) -> Result<(), PropsError> {
        let has_multi = self.multi_file_keys.as_ref().is_some_and(|keys| !keys.is_empty());
        match (self.asset_key.is_some(), has_multi) {
            (true, true) => Err(PropsError::BothKeys),
            (false, false) => Err(PropsError::NoKeys),
            _ => Ok(()),
        }
    }

    /// Every storage key this viewer is asked to show.
    pub fn keys(&self) -> Vec<&str> {
        match (&self.asset_key, &self.multi_file_keys) {
            (Some(key), _) => vec![key.as_str()],
            (None, Some(keys)) => keys.iter().map(String::as_str).collect(),
            (None, None) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_props_validate() {
        let props = ViewerProps::single("asset-1", "db-1", "models/a.glb");
        assert!(props.validate().is_ok());
        assert_eq!(props.keys(), vec!["models/a.glb"]);
    }

    #[test]
    fn test_multi_props_validate() {
        let props = ViewerProps::multi("asset-1", "db-1", vec!["a.glb".into(), "b.glb".into()]);
        assert!(props.validate().is_ok());
        assert_eq!(props.keys().len(), 2);
    }

    #[test]
    fn test_both_keys_rejected() {
        let mut props = ViewerProps::single("asset-1", "db-1", "a.glb");
        props.multi_file_keys = Some(vec!["b.glb".into()]);
        assert_eq!(props.validate(), Err(PropsError::BothKeys));
    }

    #[test]
    fn test_no_keys_rejected() {
        let props = ViewerProps {
            asset_id: "asset-1".into(),
            database_id: "db-1".into(),
            multi_file_keys: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(props.validate(), Err(PropsError::NoKeys));
    }

    #[test]
    fn test_serializes_camel_case_without_empty_fields() {
        let props = ViewerProps::single("asset-1", "db-1", "a.png");
        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["assetKey"], "a.png");
        assert_eq!(json["viewerMode"], "wide");
        assert!(json.get("multiFileKeys").is_none());
    }
}

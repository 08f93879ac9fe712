//! Feature-gate filter.
//!
//! A viewer is eligible only when every flag it requires is enabled on the
//! host. A host with no feature configuration has nothing enabled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::catalog::ViewerDescriptor;

/// Feature flags enabled on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeSet<String>);

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list such as `"GOVCLOUD,LOCATIONSERVICES"`.
    pub fn from_csv(raw: &str) -> Self {
        raw.split(',')
            .map(str::trim)
            .filter(|flag| !flag.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn enable(&mut self, flag: impl Into<String>) {
        self.0.insert(flag.into());
    }

    pub fn is_enabled(&self, flag: &str) -> bool {
        self.0.contains(flag)
    }

    pub fn extend(&mut self, other: &FeatureSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// True iff every flag the descriptor requires is enabled.
///
/// `None` means the host has no feature configuration, which fails closed.
pub fn is_eligible(descriptor: &ViewerDescriptor, enabled: Option<&FeatureSet>) -> bool {
    if descriptor.required_feature_flags.is_empty() {
        return true;
    }
    match enabled {
        Some(features) => descriptor
            .required_feature_flags
            .iter()
            .all(|flag| features.is_enabled(flag)),
        None => false,
    }
}

/// Flags the descriptor requires that are not enabled.
pub fn missing_flags<'a>(descriptor: &'a ViewerDescriptor, enabled: Option<&FeatureSet>) -> Vec<&'a str> {
    descriptor
        .required_feature_flags
        .iter()
        .filter(|flag| !enabled.is_some_and(|features| features.is_enabled(flag)))
        .map(String::as_str)
        .collect()
}

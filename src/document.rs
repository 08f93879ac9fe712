//! In-memory model of the host document's injected resources.
//!
//! Every script or stylesheet the loader adds is recorded here with its owner
//! and a provenance marker, so that unloading a viewer can remove exactly what
//! it added.

use std::sync::{Mutex, MutexGuard};

/// Provenance marker placed on every injected element.
pub const RESOURCE_MARKER: &str = "data-viewer-resource";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Script,
    Stylesheet,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Script => write!(f, "script"),
            ResourceKind::Stylesheet => write!(f, "stylesheet"),
        }
    }
}

/// An injected `<script>` or `<link rel="stylesheet">`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceElement {
    pub url: String,
    pub kind: ResourceKind,
    /// Viewer that first caused the injection.
    pub owner: String,
    pub marker: &'static str,
}

/// The host document. Elements keep insertion order.
#[derive(Debug, Default)]
pub struct Document {
    elements: Mutex<Vec<ResourceElement>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    fn elements(&self) -> MutexGuard<'_, Vec<ResourceElement>> {
        self.elements.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an element unless one with the same url and kind exists.
    ///
    /// Returns true if the element was added.
    pub fn insert(&self, kind: ResourceKind, url: &str, owner: &str) -> bool {
        let mut elements = self.elements();
        if elements.iter().any(|e| e.kind == kind && e.url == url) {
            return false;
        }
        elements.push(ResourceElement {
            url: url.to_string(),
            kind,
            owner: owner.to_string(),
            marker: RESOURCE_MARKER,
        });
        true
    }

    pub fn contains(&self, kind: ResourceKind, url: &str) -> bool {
        self.elements().iter().any(|e| e.kind == kind && e.url == url)
    }

    /// Remove every element with this url. Returns the number removed.
    pub fn remove(&self, url: &str) -> usize {
        let mut elements = self.elements();
        let before = elements.len();
        elements.retain(|e| e.url != url);
        before - elements.len()
    }

    /// Remove every element carrying the provenance marker.
    pub fn remove_marked(&self) -> usize {
        let mut elements = self.elements();
        let before = elements.len();
        elements.retain(|e| e.marker != RESOURCE_MARKER);
        before - elements.len()
    }

    pub fn snapshot(&self) -> Vec<ResourceElement> {
        self.elements().clone()
    }

    pub fn len(&self) -> usize {
        self.elements().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements().is_empty()
    }
}

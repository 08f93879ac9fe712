//! Resource tracker: which viewer caused which resource to be injected.
//!
//! A resource may be shared by several owners. It is removed from the document
//! only when its last owner lets go of it. All operations complete
//! synchronously so they can run on both the awaited unload path and the
//! synchronous teardown path.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::document::Document;

#[derive(Debug, Default)]
struct TrackerState {
    urls_by_owner: HashMap<String, BTreeSet<String>>,
    owners_by_url: HashMap<String, BTreeSet<String>>,
}

/// Bidirectional owner ↔ resource map.
#[derive(Debug)]
pub struct ResourceTracker {
    document: Arc<Document>,
    state: Mutex<TrackerState>,
}

impl ResourceTracker {
    pub fn new(document: Arc<Document>) -> Self {
        Self {
            document,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// Record that `owner` uses `url`.
    pub fn track(&self, owner: &str, url: &str) {
        let mut state = self.state();
        state
            .urls_by_owner
            .entry(owner.to_string())
            .or_default()
            .insert(url.to_string());
        state
            .owners_by_url
            .entry(url.to_string())
            .or_default()
            .insert(owner.to_string());
    }

    /// Drop every resource `owner` holds, removing orphans from the document.
    ///
    /// Returns the urls that were physically removed.
    pub fn remove_all_for(&self, owner: &str) -> Vec<String> {
        let mut removed = Vec::new();
        {
            let mut state = self.state();
            let Some(urls) = state.urls_by_owner.remove(owner) else {
                return removed;
            };

            for url in urls {
                let orphaned = match state.owners_by_url.get_mut(&url) {
                    Some(owners) => {
                        owners.remove(owner);
                        owners.is_empty()
                    }
                    None => true,
                };
                if orphaned {
                    state.owners_by_url.remove(&url);
                    removed.push(url);
                }
            }
        }

        for url in &removed {
            self.document.remove(url);
        }

        if !removed.is_empty() {
            tracing::debug!(owner = %owner, removed = ?removed, "Removed viewer resources");
        }
        removed
    }

    /// Forget everything and remove every marked element from the document.
    pub fn remove_all(&self) {
        {
            let mut state = self.state();
            state.urls_by_owner.clear();
            state.owners_by_url.clear();
        }
        let removed = self.document.remove_marked();
        tracing::debug!(removed, "Removed all tracked resources");
    }

    pub fn is_tracked(&self, url: &str) -> bool {
        self.state().owners_by_url.contains_key(url)
    }

    /// Urls currently held by `owner`.
    pub fn owned_by(&self, owner: &str) -> Vec<String> {
        self.state()
            .urls_by_owner
            .get(owner)
            .map(|urls| urls.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn owners_of(&self, url: &str) -> Vec<String> {
        self.state()
            .owners_by_url
            .get(url)
            .map(|owners| owners.iter().cloned().collect())
            .unwrap_or_default()
    }
}

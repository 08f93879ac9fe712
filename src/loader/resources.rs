//! Script and stylesheet injection.
//!
//! Dependency managers use this to pull in third-party runtimes. Every call is
//! idempotent: a resource already in the document is only re-tracked, and a
//! second request for a url that is still loading waits on the first request
//! instead of fetching again. Waiting for the load event is bounded by the
//! loader's budget.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::document::{Document, ResourceKind};
use crate::loader::fetch::{ResourceError, ResourceErrorKind, ResourceFetcher};
use crate::tracker::ResourceTracker;

type SharedFetch = Shared<BoxFuture<'static, Result<(), ResourceError>>>;

/// How long an injected element may take to report its load event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            attempts: 50,
            interval: Duration::from_millis(100),
        }
    }
}

impl PollBudget {
    pub fn deadline(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

/// Injects scripts and stylesheets into the document on behalf of viewers.
pub struct ResourceLoader {
    fetcher: Arc<dyn ResourceFetcher>,
    tracker: Arc<ResourceTracker>,
    in_flight: Mutex<HashMap<(ResourceKind, String), SharedFetch>>,
    poll: PollBudget,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, tracker: Arc<ResourceTracker>) -> Self {
        Self {
            fetcher,
            tracker,
            in_flight: Mutex::new(HashMap::new()),
            poll: PollBudget::default(),
        }
    }

    pub fn with_poll_budget(mut self, poll: PollBudget) -> Self {
        self.poll = poll;
        self
    }

    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }

    pub fn document(&self) -> &Arc<Document> {
        self.tracker.document()
    }

    pub fn poll_budget(&self) -> PollBudget {
        self.poll
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<(ResourceKind, String), SharedFetch>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inject a script tagged with `owner`. Resolves on load, fails on error.
    pub async fn load_script(&self, owner: &str, url: &str) -> Result<(), ResourceError> {
        self.load(ResourceKind::Script, owner, url).await
    }

    /// Inject a stylesheet tagged with `owner`. Resolves on load, fails on error.
    pub async fn load_stylesheet(&self, owner: &str, url: &str) -> Result<(), ResourceError> {
        self.load(ResourceKind::Stylesheet, owner, url).await
    }

    async fn load(&self, kind: ResourceKind, owner: &str, url: &str) -> Result<(), ResourceError> {
        if self.document().contains(kind, url) {
            self.tracker.track(owner, url);
            return Ok(());
        }

        let key = (kind, url.to_string());
        let fetch = {
            let mut in_flight = self.in_flight();
            match in_flight.get(&key) {
                Some(pending) => {
                    tracing::debug!(%kind, url, owner, "Joining in-flight resource load");
                    pending.clone()
                }
                None => {
                    let pending = self.fetcher.fetch(url).shared();
                    in_flight.insert(key.clone(), pending.clone());
                    pending
                }
            }
        };

        let result = match tokio::time::timeout(self.poll.deadline(), fetch.clone()).await {
            Ok(result) => result,
            Err(_) => Err(ResourceError::new(
                url,
                ResourceErrorKind::TimedOut {
                    attempts: self.poll.attempts,
                },
                format!("no load event after {:?}", self.poll.deadline()),
            )),
        };

        {
            let mut in_flight = self.in_flight();
            if in_flight
                .get(&key)
                .is_some_and(|pending| pending.ptr_eq(&fetch))
            {
                in_flight.remove(&key);
            }
        }

        match result {
            Ok(()) => {
                if self.document().insert(kind, url, owner) {
                    tracing::debug!(%kind, url, owner, "Injected resource");
                }
                self.tracker.track(owner, url);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%kind, url, owner, "Resource failed to load: {}", e.message);
                Err(e)
            }
        }
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Views older than this are reloaded even without an invalidation, so
/// pages fed by another portal's actions catch up.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Upper bound on cached (path, viewer) views.
const MAX_VIEWS: u64 = 10_000;

/// Rendered page views keyed by request path (including query) and viewer.
///
/// Actions call [`PageCache::invalidate`] with the path whose view they
/// changed; the next render of that path (or any sub-path or query variant)
/// reloads from the database. Every invalidation bumps an epoch so a view
/// loaded before it is never stored after it.
pub struct PageCache {
    views: Cache<(String, Uuid), Value>,
    epoch: AtomicU64,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        let views = Cache::builder()
            .max_capacity(MAX_VIEWS)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self {
            views,
            epoch: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str, viewer: Uuid) -> Option<Value> {
        self.views.get(&(key.to_string(), viewer)).await
    }

    /// Current invalidation epoch. Read it before loading a view.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Store `view` unless an invalidation ran since `seen` was read.
    /// Returns whether the view stayed cached.
    pub async fn put_if_current(&self, key: &str, viewer: Uuid, view: Value, seen: u64) -> bool {
        if self.epoch() != seen {
            return false;
        }

        let entry = (key.to_string(), viewer);
        self.views.insert(entry.clone(), view).await;

        // An invalidation that started between the check and the insert.
        if self.epoch() != seen {
            self.views.invalidate(&entry).await;
            return false;
        }
        true
    }

    /// Drop every cached view under `path` for all viewers.
    pub fn invalidate(&self, path: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let prefix = path.to_string();
        match self.views.invalidate_entries_if(move |(key, _): &(String, Uuid), _: &Value| {
            covers(&prefix, key)
        }) {
            Ok(_) => debug!("Invalidated cached pages under {}", path),
            Err(e) => {
                warn!("Selective invalidation of {} failed, dropping all views: {}", path, e);
                self.views.invalidate_all();
            }
        }
    }
}

/// Whether `key` is `path` itself, a query variant of it, or a sub-path.
fn covers(path: &str, key: &str) -> bool {
    match key.strip_prefix(path) {
        Some(rest) => rest.is_empty() || rest.starts_with('?') || rest.starts_with('/'),
        None => false,
    }
}

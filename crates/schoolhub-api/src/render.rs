//! Shared plumbing for page fetchers: blocking DB access, cached rendering
//! and portal role checks.

use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use schoolhub_db::Database;
use schoolhub_types::models::{Profile, Role};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;

/// Run blocking SQLite work off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("database task failed"))
        })?
        .map_err(ApiError::from)
}

/// Failed reads render as empty.
pub fn or_empty<T: Default>(result: anyhow::Result<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!("Query for {} failed, rendering empty: {}", what, e);
        T::default()
    })
}

/// Serve the cached view of `key` for `viewer`, or await `load`, cache and
/// serve it. `load` is not polled on a cache hit, and its result is not
/// cached when an invalidation lands while it runs.
pub async fn render<T>(
    state: &AppState,
    key: &str,
    viewer: Uuid,
    load: impl Future<Output = Result<T, ApiError>>,
) -> Result<Json<Value>, ApiError>
where
    T: Serialize,
{
    if let Some(view) = state.cache.get(key, viewer).await {
        return Ok(Json(view));
    }

    let seen = state.cache.epoch();
    let view = serde_json::to_value(load.await?).map_err(anyhow::Error::from)?;
    if !state.cache.put_if_current(key, viewer, view.clone(), seen).await {
        debug!("View of {} for {} outdated by an invalidation, not cached", key, viewer);
    }
    Ok(Json(view))
}

/// Profile of the caller, required to hold `role`.
///
/// Callers without a profile go to `/`; callers of another role go to
/// their own portal.
pub async fn portal_profile(state: &AppState, identity: &Identity, role: Role) -> Result<Profile, ApiError> {
    let profile = caller_profile(state, identity).await?;
    if profile.role != role {
        return Err(ApiError::Redirect(profile.role.portal_path().to_string()));
    }
    Ok(profile)
}

/// Profile of the caller in any role.
pub async fn caller_profile(state: &AppState, identity: &Identity) -> Result<Profile, ApiError> {
    let id = identity.id;
    run_db(state, move |db| db.get_profile(id))
        .await?
        .ok_or_else(|| ApiError::Redirect("/".to_string()))
}

/// Reject blank required text fields.
pub fn required(value: &str, field: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::auth::AppStateInner;

    fn state() -> AppState {
        AppStateInner::new(Database::open_in_memory().unwrap(), None, false)
    }

    #[tokio::test]
    async fn cached_view_skips_load() {
        let state = state();
        let viewer = Uuid::new_v4();

        render(&state, "/notifications", viewer, async { Ok(json!({"n": 1})) })
            .await
            .unwrap();
        let Json(view) = render(&state, "/notifications", viewer, async {
            Err::<Value, _>(ApiError::Forbidden)
        })
        .await
        .unwrap();
        assert_eq!(view, json!({"n": 1}));
    }

    #[tokio::test]
    async fn invalidation_during_load_is_not_overwritten() {
        let state = state();
        let viewer = Uuid::new_v4();

        let Json(view) = render(&state, "/messages", viewer, async {
            let view = json!({"unread": 0});
            state.cache.invalidate("/messages");
            Ok(view)
        })
        .await
        .unwrap();

        assert_eq!(view, json!({"unread": 0}));
        assert!(state.cache.get("/messages", viewer).await.is_none());
    }
}

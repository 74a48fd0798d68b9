use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use schoolhub_db::models::NewNotification;
use schoolhub_types::api::{NotificationsPage, SendNotificationRequest};
use schoolhub_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::render::{or_empty, portal_profile, render, required, run_db};

pub const NOTIFICATIONS_PATH: &str = "/notifications";

const NOTIFICATION_LIMIT: u32 = 100;

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = identity.id;
    render(&state, NOTIFICATIONS_PATH, viewer, async {
        run_db(&state, move |db| {
            let notifications = or_empty(db.notifications_for(viewer, NOTIFICATION_LIMIT), "notifications");
            Ok(NotificationsPage { notifications })
        })
        .await
    })
    .await
}

/// POST /notifications/{id}/read: only the recipient's row matches.
pub async fn read_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient_id = identity.id;
    let updated = run_db(&state, move |db| db.mark_notification_read(id, recipient_id)).await?;
    debug!("read_notification {} by {}: {} row(s)", id, recipient_id, updated);

    state.cache.invalidate(NOTIFICATIONS_PATH);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /admin/notifications: notify one member of the admin's school.
pub async fn send_notification(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let title = required(&req.title, "title")?;
    let body = required(&req.body, "body")?;
    let recipient_id = req.recipient_id;
    let school_id = admin.school_id;

    let notification = run_db(&state, move |db| {
        match db.get_profile(recipient_id)? {
            Some(p) if p.school_id == school_id => {}
            _ => return Ok(None),
        }
        db.insert_notification(&NewNotification {
            school_id,
            recipient_id,
            title: &title,
            body: &body,
            created_at: Utc::now(),
        })
        .map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("recipient is not a member of this school"))?;

    state.cache.invalidate(NOTIFICATIONS_PATH);
    info!("Admin {} notified {}", admin.id, recipient_id);
    Ok((StatusCode::CREATED, Json(notification)))
}

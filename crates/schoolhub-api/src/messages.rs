use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use schoolhub_db::Database;
use schoolhub_db::models::NewMessage;
use schoolhub_types::api::{MessagesPage, SendMessageRequest, ThreadPage};
use schoolhub_types::models::Message;

use crate::auth::AppState;
use crate::conversations::{attach_profiles, build_conversations, peer_ids};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::render::{or_empty, render, required, run_db};

/// Cache path of the messages pages; threads live under it.
pub const MESSAGES_PATH: &str = "/messages";

const INBOX_LIMIT: u32 = 200;
const THREAD_LIMIT: u32 = 100;

// -- Actions --

/// Insert one unread message from the caller to `req.recipient_id`, a
/// member of the caller's school.
pub async fn send_message(
    state: &AppState,
    identity: Option<&Identity>,
    req: SendMessageRequest,
) -> Result<Message, ApiError> {
    let sender_id = identity.ok_or(ApiError::Unauthorized)?.id;
    let subject = required(&req.subject, "subject")?;
    let body = required(&req.body, "body")?;
    let recipient_id = req.recipient_id;

    let message = run_db(state, move |db| {
        if !same_school(db, sender_id, recipient_id)? {
            anyhow::bail!("recipient {} is outside the sender's school", recipient_id);
        }
        db.insert_message(&NewMessage {
            sender_id,
            recipient_id,
            subject: &subject,
            body: &body,
            created_at: Utc::now(),
        })
    })
    .await
    .map_err(|e| {
        warn!("Failed to send message from {} to {}: {}", sender_id, recipient_id, e);
        ApiError::Internal(anyhow::anyhow!("failed to send message"))
    })?;

    state.cache.invalidate(MESSAGES_PATH);
    info!("Message {} sent from {} to {}", message.id, sender_id, recipient_id);
    Ok(message)
}

/// Flag `message_id` read. Without an identity this does nothing; the
/// update only matches rows whose recipient is the caller.
pub async fn mark_as_read(
    state: &AppState,
    identity: Option<&Identity>,
    message_id: Uuid,
) -> Result<(), ApiError> {
    let Some(identity) = identity else {
        return Ok(());
    };

    let recipient_id = identity.id;
    let updated =
        run_db(state, move |db| db.mark_message_read(message_id, recipient_id, Utc::now())).await?;
    debug!("mark_as_read {} by {}: {} row(s)", message_id, recipient_id, updated);

    state.cache.invalidate(MESSAGES_PATH);
    Ok(())
}

/// Both profiles exist and belong to the same school.
fn same_school(db: &Database, a: Uuid, b: Uuid) -> anyhow::Result<bool> {
    let (Some(a), Some(b)) = (db.get_profile(a)?, db.get_profile(b)?) else {
        return Ok(false);
    };
    Ok(a.school_id == b.school_id)
}

// -- Handlers --

/// GET /messages: one conversation per counterparty, newest first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = identity.id;
    render(&state, MESSAGES_PATH, viewer, async {
        run_db(&state, move |db| {
            let messages = or_empty(db.messages_for_user(viewer, INBOX_LIMIT), "inbox");
            let unread = or_empty(db.unread_message_count(viewer), "unread count");

            let mut conversations = build_conversations(viewer, &messages);
            let school_id = or_empty(db.get_profile(viewer), "caller profile").map(|p| p.school_id);
            let profiles: Vec<_> = or_empty(db.get_profiles(&peer_ids(&conversations)), "peer profiles")
                .into_iter()
                .filter(|p| Some(p.school_id) == school_id)
                .collect();
            attach_profiles(&mut conversations, &profiles);

            Ok(MessagesPage { conversations, unread })
        })
        .await
    })
    .await
}

/// GET /messages/{id}: messages exchanged with one counterparty, oldest first.
/// The peer's profile is shown only when they belong to the caller's school.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = identity.id;
    let key = format!("{}/{}", MESSAGES_PATH, peer_id);
    render(&state, &key, viewer, async {
        run_db(&state, move |db| {
            let mut messages = or_empty(db.thread(viewer, peer_id, THREAD_LIMIT), "thread");
            messages.reverse();
            let school_id = or_empty(db.get_profile(viewer), "caller profile").map(|p| p.school_id);
            let peer = or_empty(db.get_profile(peer_id), "peer profile")
                .filter(|p| Some(p.school_id) == school_id);
            Ok(ThreadPage { peer, messages })
        })
        .await
    })
    .await
}

/// POST /messages
pub async fn create_message(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = identity.map(|Extension(i)| i);
    let message = send_message(&state, identity.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /messages/{id}/read
pub async fn read_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    identity: Option<Extension<Identity>>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = identity.map(|Extension(i)| i);
    mark_as_read(&state, identity.as_ref(), message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

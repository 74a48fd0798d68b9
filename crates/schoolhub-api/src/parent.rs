use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use schoolhub_types::api::{AttendancePage, FeesPage, ParentDashboard};
use schoolhub_types::models::{Role, Student};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::render::{or_empty, portal_profile, render, run_db};

pub const PARENT_PATH: &str = "/parent";
pub const PARENT_FEES_PATH: &str = "/parent/fees";

const RECENT_ATTENDANCE: u32 = 20;
const CHILD_ATTENDANCE_LIMIT: u32 = 180;

fn ids(children: &[Student]) -> Vec<Uuid> {
    children.iter().map(|c| c.id).collect()
}

/// GET /parent: children, their recent attendance and unpaid invoices.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = portal_profile(&state, &identity, Role::Parent).await?;
    let parent_id = parent.id;
    render(&state, PARENT_PATH, parent_id, async {
        run_db(&state, move |db| {
            let children = or_empty(db.children_of(parent_id), "children");
            let child_ids = ids(&children);
            Ok(ParentDashboard {
                recent_attendance: or_empty(
                    db.attendance_for_students(&child_ids, RECENT_ATTENDANCE),
                    "attendance",
                ),
                outstanding_invoices: or_empty(db.invoices_for_students(&child_ids, true), "invoices"),
                children,
            })
        })
        .await
    })
    .await
}

/// GET /parent/fees: every invoice billed to the caller's children.
pub async fn fees(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = portal_profile(&state, &identity, Role::Parent).await?;
    let parent_id = parent.id;
    render(&state, PARENT_FEES_PATH, parent_id, async {
        run_db(&state, move |db| {
            let children = or_empty(db.children_of(parent_id), "children");
            Ok(FeesPage {
                invoices: or_empty(db.invoices_for_students(&ids(&children), false), "invoices"),
            })
        })
        .await
    })
    .await
}

/// GET /parent/children/{student_id}/attendance: empty unless the student
/// is the caller's child.
pub async fn child_attendance(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = portal_profile(&state, &identity, Role::Parent).await?;
    let parent_id = parent.id;
    let key = format!("{}/children/{}/attendance", PARENT_PATH, student_id);
    render(&state, &key, parent_id, async {
        run_db(&state, move |db| {
            let own_child = or_empty(db.get_student(student_id), "student")
                .is_some_and(|s| s.parent_id == Some(parent_id));
            let records = if own_child {
                or_empty(
                    db.attendance_for_students(&[student_id], CHILD_ATTENDANCE_LIMIT),
                    "attendance",
                )
            } else {
                vec![]
            };
            Ok(AttendancePage { records })
        })
        .await
    })
    .await
}

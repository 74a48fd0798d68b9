use axum::{Extension, extract::State, response::IntoResponse};
use chrono::Utc;

use schoolhub_types::api::{AttendancePage, AttendanceSummary, HomeworkPage, StudentDashboard};
use schoolhub_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::render::{or_empty, portal_profile, render, run_db};

pub const STUDENT_PATH: &str = "/student";
pub const STUDENT_HOMEWORK_PATH: &str = "/student/homework";
pub const STUDENT_ATTENDANCE_PATH: &str = "/student/attendance";

const TERM_ATTENDANCE_LIMIT: u32 = 180;

/// GET /student: own class, upcoming homework and an attendance tally.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = portal_profile(&state, &identity, Role::Student).await?;
    let profile_id = profile.id;
    render(&state, STUDENT_PATH, profile_id, async {
        run_db(&state, move |db| {
            let student = or_empty(db.student_for_profile(profile_id), "student record");
            let Some(record) = student.as_ref() else {
                return Ok(StudentDashboard {
                    student: None,
                    class: None,
                    homework_due: vec![],
                    attendance: AttendanceSummary::default(),
                });
            };

            let class = match record.class_id {
                Some(class_id) => or_empty(db.get_class(class_id), "class"),
                None => None,
            };
            let homework_due = match record.class_id {
                Some(class_id) => or_empty(
                    db.homework_due_for_class(class_id, Utc::now().date_naive()),
                    "homework",
                ),
                None => vec![],
            };
            let attendance = or_empty(
                db.attendance_for_students(&[record.id], TERM_ATTENDANCE_LIMIT),
                "attendance",
            );

            Ok(StudentDashboard {
                attendance: AttendanceSummary::tally(&attendance),
                student,
                class,
                homework_due,
            })
        })
        .await
    })
    .await
}

/// GET /student/homework: all homework for the student's class.
pub async fn homework(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = portal_profile(&state, &identity, Role::Student).await?;
    let profile_id = profile.id;
    render(&state, STUDENT_HOMEWORK_PATH, profile_id, async {
        run_db(&state, move |db| {
            let class_id = or_empty(db.student_for_profile(profile_id), "student record")
                .and_then(|s| s.class_id);
            let homework = match class_id {
                Some(class_id) => or_empty(db.homework_for_class(class_id), "homework"),
                None => vec![],
            };
            Ok(HomeworkPage { homework })
        })
        .await
    })
    .await
}

/// GET /student/attendance
pub async fn attendance(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = portal_profile(&state, &identity, Role::Student).await?;
    let profile_id = profile.id;
    render(&state, STUDENT_ATTENDANCE_PATH, profile_id, async {
        run_db(&state, move |db| {
            let records = match or_empty(db.student_for_profile(profile_id), "student record") {
                Some(s) => or_empty(
                    db.attendance_for_students(&[s.id], TERM_ATTENDANCE_LIMIT),
                    "attendance",
                ),
                None => vec![],
            };
            Ok(AttendancePage { records })
        })
        .await
    })
    .await
}

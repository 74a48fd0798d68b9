use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use schoolhub_db::Database;
use schoolhub_types::api::{
    AttendanceQuery, AttendanceSheet, CreateHomeworkRequest, HomeworkPage, RecordAttendanceRequest,
    RosterEntry, TeacherDashboard,
};
use schoolhub_types::models::{AttendanceRecord, Class, Homework, Role};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::render::{or_empty, portal_profile, render, required, run_db};

pub const TEACHER_PATH: &str = "/teacher";
pub const HOMEWORK_PATH: &str = "/teacher/homework";
pub const ATTENDANCE_PATH: &str = "/teacher/attendance";

const RECENT_HOMEWORK: u32 = 10;
const HOMEWORK_PAGE_LIMIT: u32 = 100;

// -- Pages --

/// GET /teacher: classes taught and recently set homework.
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let teacher = portal_profile(&state, &identity, Role::Teacher).await?;
    let teacher_id = teacher.id;
    render(&state, TEACHER_PATH, teacher_id, async {
        run_db(&state, move |db| {
            Ok(TeacherDashboard {
                classes: or_empty(db.classes_for_teacher(teacher_id), "classes"),
                recent_homework: or_empty(db.homework_by_teacher(teacher_id, RECENT_HOMEWORK), "homework"),
            })
        })
        .await
    })
    .await
}

/// GET /teacher/homework
pub async fn list_homework(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let teacher = portal_profile(&state, &identity, Role::Teacher).await?;
    let teacher_id = teacher.id;
    render(&state, HOMEWORK_PATH, teacher_id, async {
        run_db(&state, move |db| {
            Ok(HomeworkPage {
                homework: or_empty(db.homework_by_teacher(teacher_id, HOMEWORK_PAGE_LIMIT), "homework"),
            })
        })
        .await
    })
    .await
}

/// GET /teacher/attendance?class_id=..&date=..: class roster with each
/// student's status for the day. Empty for a class the caller does not teach.
pub async fn attendance_sheet(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let teacher = portal_profile(&state, &identity, Role::Teacher).await?;
    let teacher_id = teacher.id;
    let AttendanceQuery { class_id, date } = query;
    let key = format!("{}?class_id={}&date={}", ATTENDANCE_PATH, class_id, date);

    render(&state, &key, teacher_id, async {
        run_db(&state, move |db| {
            let taught = or_empty(taught_class(db, class_id, teacher_id), "class").is_some();
            if !taught {
                return Ok(AttendanceSheet { class_id, date, roster: vec![] });
            }

            let students = or_empty(db.students_in_class(class_id), "roster");
            let marks: HashMap<Uuid, _> = or_empty(db.attendance_for_class_on(class_id, date), "attendance")
                .into_iter()
                .map(|r| (r.student_id, r.status))
                .collect();

            let roster = students
                .into_iter()
                .map(|student| RosterEntry {
                    status: marks.get(&student.id).copied(),
                    student,
                })
                .collect();

            Ok(AttendanceSheet { class_id, date, roster })
        })
        .await
    })
    .await
}

// -- Actions --

/// POST /teacher/attendance: record one student's status for a day.
/// Re-recording the same day overwrites the earlier status.
pub async fn record_attendance(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<RecordAttendanceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let teacher = portal_profile(&state, &identity, Role::Teacher).await?;
    let teacher_id = teacher.id;

    let record = AttendanceRecord {
        id: Uuid::new_v4(),
        student_id: req.student_id,
        class_id: req.class_id,
        date: req.date,
        status: req.status,
        marked_by: teacher_id,
    };

    let row = record.clone();
    run_db(&state, move |db| {
        let Some(class) = taught_class(db, row.class_id, teacher_id)? else {
            return Ok(Err(ApiError::Forbidden));
        };
        match db.get_student(row.student_id)? {
            Some(s) if s.class_id == Some(class.id) => {}
            _ => return Ok(Err(ApiError::bad_request("student is not in this class"))),
        }
        db.upsert_attendance(class.school_id, &row)?;
        Ok(Ok(()))
    })
    .await??;

    state.cache.invalidate(ATTENDANCE_PATH);
    info!(
        "Teacher {} marked {} {} on {}",
        teacher_id,
        record.student_id,
        record.status.as_str(),
        record.date
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /teacher/homework
pub async fn create_homework(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateHomeworkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let teacher = portal_profile(&state, &identity, Role::Teacher).await?;
    let teacher_id = teacher.id;

    let homework = Homework {
        id: Uuid::new_v4(),
        class_id: req.class_id,
        teacher_id,
        title: required(&req.title, "title")?,
        description: req.description.trim().to_string(),
        due_date: req.due_date,
        created_at: Utc::now(),
    };

    let row = homework.clone();
    run_db(&state, move |db| {
        let Some(class) = taught_class(db, row.class_id, teacher_id)? else {
            return Ok(Err(ApiError::Forbidden));
        };
        db.insert_homework(class.school_id, &row)?;
        Ok(Ok(()))
    })
    .await??;

    state.cache.invalidate(HOMEWORK_PATH);
    info!("Teacher {} set homework {} for class {}", teacher_id, homework.id, homework.class_id);
    Ok((StatusCode::CREATED, Json(homework)))
}

/// The class, if it exists and is taught by `teacher_id`.
fn taught_class(db: &Database, class_id: Uuid, teacher_id: Uuid) -> anyhow::Result<Option<Class>> {
    Ok(db
        .get_class(class_id)?
        .filter(|c| c.teacher_id == Some(teacher_id)))
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use schoolhub_types::api::{
    AdminDashboard, ClassesPage, CreateClassRequest, CreateInvoiceRequest, CreateStudentRequest,
    CreateTeacherRequest, FeesPage, StudentsPage, TeachersPage,
};
use schoolhub_types::models::{Class, Invoice, InvoiceStatus, Role, Student, Teacher};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::render::{or_empty, portal_profile, render, required, run_db};

pub const ADMIN_PATH: &str = "/admin";
pub const STUDENTS_PATH: &str = "/admin/students";
pub const TEACHERS_PATH: &str = "/admin/teachers";
pub const CLASSES_PATH: &str = "/admin/classes";
pub const FEES_PATH: &str = "/admin/fees";

// -- Pages --

/// GET /admin
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;
    render(&state, ADMIN_PATH, admin.id, async {
        run_db(&state, move |db| {
            let counts = or_empty(db.school_counts(school_id), "school counts");
            Ok(AdminDashboard {
                school_id,
                students: counts.students,
                teachers: counts.teachers,
                classes: counts.classes,
                pending_invoices: counts.pending_invoices,
            })
        })
        .await
    })
    .await
}

/// GET /admin/students
pub async fn list_students(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;
    render(&state, STUDENTS_PATH, admin.id, async {
        run_db(&state, move |db| {
            Ok(StudentsPage {
                students: or_empty(db.students_for_school(school_id), "students"),
            })
        })
        .await
    })
    .await
}

/// GET /admin/teachers
pub async fn list_teachers(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;
    render(&state, TEACHERS_PATH, admin.id, async {
        run_db(&state, move |db| {
            Ok(TeachersPage {
                teachers: or_empty(db.teachers_for_school(school_id), "teachers"),
            })
        })
        .await
    })
    .await
}

/// GET /admin/classes
pub async fn list_classes(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;
    render(&state, CLASSES_PATH, admin.id, async {
        run_db(&state, move |db| {
            Ok(ClassesPage {
                classes: or_empty(db.classes_for_school(school_id), "classes"),
            })
        })
        .await
    })
    .await
}

/// GET /admin/fees
pub async fn list_fees(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;
    render(&state, FEES_PATH, admin.id, async {
        run_db(&state, move |db| {
            Ok(FeesPage {
                invoices: or_empty(db.invoices_for_school(school_id), "invoices"),
            })
        })
        .await
    })
    .await
}

// -- Actions --

/// POST /admin/students
pub async fn create_student(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;

    let student = Student {
        id: Uuid::new_v4(),
        school_id,
        profile_id: req.profile_id,
        parent_id: req.parent_id,
        class_id: req.class_id,
        first_name: required(&req.first_name, "first_name")?,
        last_name: required(&req.last_name, "last_name")?,
        admission_number: required(&req.admission_number, "admission_number")?,
    };

    let row = student.clone();
    run_db(&state, move |db| {
        if let Some(class_id) = row.class_id {
            ensure_class_in_school(db, class_id, school_id)?;
        }
        if let Some(parent_id) = row.parent_id {
            ensure_member(db, parent_id, school_id, Role::Parent)?;
        }
        if let Some(profile_id) = row.profile_id {
            ensure_member(db, profile_id, school_id, Role::Student)?;
        }
        db.insert_student(&row)
    })
    .await
    .map_err(rejected("student"))?;

    state.cache.invalidate(STUDENTS_PATH);
    info!("Admin {} created student {}", admin.id, student.id);
    Ok((StatusCode::CREATED, Json(student)))
}

/// POST /admin/teachers
pub async fn create_teacher(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateTeacherRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;

    let teacher = Teacher {
        id: Uuid::new_v4(),
        school_id,
        profile_id: req.profile_id,
        full_name: required(&req.full_name, "full_name")?,
        email: required(&req.email, "email")?,
        subject: req.subject.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
    };

    let row = teacher.clone();
    run_db(&state, move |db| {
        if let Some(profile_id) = row.profile_id {
            ensure_member(db, profile_id, school_id, Role::Teacher)?;
        }
        db.insert_teacher(&row)
    })
    .await
    .map_err(rejected("teacher"))?;

    state.cache.invalidate(TEACHERS_PATH);
    info!("Admin {} created teacher {}", admin.id, teacher.id);
    Ok((StatusCode::CREATED, Json(teacher)))
}

/// POST /admin/classes
pub async fn create_class(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;

    let class = Class {
        id: Uuid::new_v4(),
        school_id,
        name: required(&req.name, "name")?,
        grade_level: required(&req.grade_level, "grade_level")?,
        teacher_id: req.teacher_id,
    };

    let row = class.clone();
    run_db(&state, move |db| {
        if let Some(teacher_id) = row.teacher_id {
            ensure_member(db, teacher_id, school_id, Role::Teacher)?;
        }
        db.insert_class(&row)
    })
    .await
    .map_err(rejected("class"))?;

    state.cache.invalidate(CLASSES_PATH);
    info!("Admin {} created class {}", admin.id, class.id);
    Ok((StatusCode::CREATED, Json(class)))
}

/// POST /admin/fees
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;

    if req.amount_cents <= 0 {
        return Err(ApiError::bad_request("amount_cents must be positive"));
    }

    let invoice = Invoice {
        id: Uuid::new_v4(),
        student_id: req.student_id,
        description: required(&req.description, "description")?,
        amount_cents: req.amount_cents,
        due_date: req.due_date,
        status: InvoiceStatus::Pending,
        paid_at: None,
        created_at: Utc::now(),
    };

    let row = invoice.clone();
    run_db(&state, move |db| {
        match db.get_student(row.student_id)? {
            Some(s) if s.school_id == school_id => {}
            _ => anyhow::bail!("student {} is not enrolled in school {}", row.student_id, school_id),
        }
        db.insert_invoice(school_id, &row)
    })
    .await
    .map_err(rejected("invoice"))?;

    state.cache.invalidate(FEES_PATH);
    info!("Admin {} issued invoice {}", admin.id, invoice.id);
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// POST /admin/fees/{invoice_id}/paid
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = portal_profile(&state, &identity, Role::Admin).await?;
    let school_id = admin.school_id;

    let updated =
        run_db(&state, move |db| db.mark_invoice_paid(invoice_id, school_id, Utc::now())).await?;
    if updated == 0 {
        return Err(ApiError::NotFound);
    }

    state.cache.invalidate(FEES_PATH);
    info!("Admin {} settled invoice {}", admin.id, invoice_id);
    Ok(StatusCode::NO_CONTENT)
}

// -- Helpers --

fn ensure_class_in_school(db: &schoolhub_db::Database, class_id: Uuid, school_id: Uuid) -> anyhow::Result<()> {
    match db.get_class(class_id)? {
        Some(c) if c.school_id == school_id => Ok(()),
        _ => anyhow::bail!("class {} does not belong to school {}", class_id, school_id),
    }
}

fn ensure_member(
    db: &schoolhub_db::Database,
    profile_id: Uuid,
    school_id: Uuid,
    role: Role,
) -> anyhow::Result<()> {
    match db.get_profile(profile_id)? {
        Some(p) if p.school_id == school_id && p.role == role => Ok(()),
        _ => anyhow::bail!("profile {} is not a {} of school {}", profile_id, role, school_id),
    }
}

/// Insert failures surface to the form as a plain rejection.
fn rejected(what: &'static str) -> impl Fn(ApiError) -> ApiError {
    move |e| {
        warn!("Rejected {}: {}", what, e);
        ApiError::bad_request(format!("could not save {}", what))
    }
}

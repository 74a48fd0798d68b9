use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::{self, AppState};
use crate::middleware::{LOGOUT_PATH, session_gate};
use crate::{admin, messages, notifications, pages, parent, student, teacher};

/// Every route of the application behind the session gate.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(pages::home))
        .route("/about", get(pages::about))
        .route("/contact", get(pages::contact))
        .route("/login", get(pages::login_page).post(auth::login))
        .route("/signup", get(pages::signup_page).post(auth::signup))
        .route(LOGOUT_PATH, post(auth::logout));

    let shared_routes = Router::new()
        .route("/messages", get(messages::list_conversations).post(messages::create_message))
        .route("/messages/{id}", get(messages::get_thread))
        .route("/messages/{id}/read", post(messages::read_message))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{id}/read", post(notifications::read_notification));

    let admin_routes = Router::new()
        .route("/admin", get(admin::dashboard))
        .route("/admin/students", get(admin::list_students).post(admin::create_student))
        .route("/admin/teachers", get(admin::list_teachers).post(admin::create_teacher))
        .route("/admin/classes", get(admin::list_classes).post(admin::create_class))
        .route("/admin/fees", get(admin::list_fees).post(admin::create_invoice))
        .route("/admin/fees/{invoice_id}/paid", post(admin::mark_invoice_paid))
        .route("/admin/notifications", post(notifications::send_notification));

    let teacher_routes = Router::new()
        .route("/teacher", get(teacher::dashboard))
        .route("/teacher/homework", get(teacher::list_homework).post(teacher::create_homework))
        .route(
            "/teacher/attendance",
            get(teacher::attendance_sheet).post(teacher::record_attendance),
        );

    let parent_routes = Router::new()
        .route("/parent", get(parent::dashboard))
        .route("/parent/fees", get(parent::fees))
        .route("/parent/children/{student_id}/attendance", get(parent::child_attendance));

    let student_routes = Router::new()
        .route("/student", get(student::dashboard))
        .route("/student/homework", get(student::homework))
        .route("/student/attendance", get(student::attendance));

    Router::new()
        .merge(public_routes)
        .merge(shared_routes)
        .merge(admin_routes)
        .merge(teacher_routes)
        .merge(parent_routes)
        .merge(student_routes)
        .layer(middleware::from_fn_with_state(state.clone(), session_gate))
        .with_state(state)
}

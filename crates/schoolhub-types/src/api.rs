use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AttendanceRecord, AttendanceStatus, Class, Conversation, Homework, Invoice, Message,
    Notification, Profile, Student, Teacher,
};

// -- Session claims --

/// Claims carried by the identity provider's access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: usize,
}

// -- Auth forms --

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub school_id: Uuid,
}

// -- Public pages --

#[derive(Debug, Serialize)]
pub struct PublicPage {
    pub title: &'static str,
    pub body: &'static str,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct MessagesPage {
    pub conversations: Vec<Conversation>,
    pub unread: usize,
}

#[derive(Debug, Serialize)]
pub struct ThreadPage {
    pub peer: Option<Profile>,
    pub messages: Vec<Message>,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendNotificationRequest {
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationsPage {
    pub notifications: Vec<Notification>,
}

// -- Admin --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStudentRequest {
    pub first_name: String,
    pub last_name: String,
    pub admission_number: String,
    pub class_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub profile_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTeacherRequest {
    pub full_name: String,
    pub email: String,
    pub subject: Option<String>,
    pub profile_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateClassRequest {
    pub name: String,
    pub grade_level: String,
    pub teacher_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateInvoiceRequest {
    pub student_id: Uuid,
    pub description: String,
    pub amount_cents: i64,
    pub due_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AdminDashboard {
    pub school_id: Uuid,
    pub students: i64,
    pub teachers: i64,
    pub classes: i64,
    pub pending_invoices: i64,
}

#[derive(Debug, Serialize)]
pub struct StudentsPage {
    pub students: Vec<Student>,
}

#[derive(Debug, Serialize)]
pub struct TeachersPage {
    pub teachers: Vec<Teacher>,
}

#[derive(Debug, Serialize)]
pub struct ClassesPage {
    pub classes: Vec<Class>,
}

#[derive(Debug, Serialize)]
pub struct FeesPage {
    pub invoices: Vec<Invoice>,
}

// -- Teacher --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordAttendanceRequest {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateHomeworkRequest {
    pub class_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceQuery {
    pub class_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct TeacherDashboard {
    pub classes: Vec<Class>,
    pub recent_homework: Vec<Homework>,
}

#[derive(Debug, Serialize)]
pub struct HomeworkPage {
    pub homework: Vec<Homework>,
}

#[derive(Debug, Serialize)]
pub struct RosterEntry {
    pub student: Student,
    pub status: Option<AttendanceStatus>,
}

#[derive(Debug, Serialize)]
pub struct AttendanceSheet {
    pub class_id: Uuid,
    pub date: NaiveDate,
    pub roster: Vec<RosterEntry>,
}

// -- Parent --

#[derive(Debug, Serialize)]
pub struct ParentDashboard {
    pub children: Vec<Student>,
    pub recent_attendance: Vec<AttendanceRecord>,
    pub outstanding_invoices: Vec<Invoice>,
}

#[derive(Debug, Serialize)]
pub struct AttendancePage {
    pub records: Vec<AttendanceRecord>,
}

// -- Student --

#[derive(Debug, Default, Serialize)]
pub struct AttendanceSummary {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
}

impl AttendanceSummary {
    pub fn tally(records: &[AttendanceRecord]) -> Self {
        let mut summary = Self::default();
        for r in records {
            match r.status {
                AttendanceStatus::Present => summary.present += 1,
                AttendanceStatus::Absent => summary.absent += 1,
                AttendanceStatus::Late => summary.late += 1,
                AttendanceStatus::Excused => summary.excused += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Serialize)]
pub struct StudentDashboard {
    pub student: Option<Student>,
    pub class: Option<Class>,
    pub homework_due: Vec<Homework>,
    pub attendance: AttendanceSummary,
}

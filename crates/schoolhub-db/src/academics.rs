//! Classes, staff, students, attendance and homework.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use schoolhub_types::models::{AttendanceRecord, AttendanceStatus, Class, Homework, Student, Teacher};

use crate::Database;
use crate::models::{date_col, enum_col, fmt_date, fmt_ts, opt_uuid_col, placeholders, ts_col, uuid_col};

const CLASS_COLUMNS: &str = "id, school_id, name, grade_level, teacher_id";
const STUDENT_COLUMNS: &str =
    "id, school_id, profile_id, parent_id, class_id, first_name, last_name, admission_number";
const ATTENDANCE_COLUMNS: &str = "id, student_id, class_id, date, status, marked_by";
const HOMEWORK_COLUMNS: &str =
    "id, class_id, teacher_id, title, description, due_date, created_at";

/// Per-school totals shown on the admin dashboard.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchoolCounts {
    pub students: i64,
    pub teachers: i64,
    pub classes: i64,
    pub pending_invoices: i64,
}

impl Database {
    // -- Classes --

    pub fn insert_class(&self, class: &Class) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO classes (id, school_id, name, grade_level, teacher_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    class.id.to_string(),
                    class.school_id.to_string(),
                    &class.name,
                    &class.grade_level,
                    class.teacher_id.map(|t| t.to_string()),
                    fmt_ts(&Utc::now()),
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_class(&self, id: Uuid) -> Result<Option<Class>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM classes WHERE id = ?1", CLASS_COLUMNS);
            Ok(conn.query_row(&sql, [id.to_string()], map_class).optional()?)
        })
    }

    pub fn classes_for_school(&self, school_id: Uuid) -> Result<Vec<Class>> {
        self.select_all(
            &format!("SELECT {} FROM classes WHERE school_id = ?1 ORDER BY name", CLASS_COLUMNS),
            school_id,
            map_class,
        )
    }

    /// Classes taught by the teacher with profile `teacher_id`.
    pub fn classes_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<Class>> {
        self.select_all(
            &format!("SELECT {} FROM classes WHERE teacher_id = ?1 ORDER BY name", CLASS_COLUMNS),
            teacher_id,
            map_class,
        )
    }

    // -- Teachers --

    pub fn insert_teacher(&self, teacher: &Teacher) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO teachers (id, school_id, profile_id, full_name, email, subject, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    teacher.id.to_string(),
                    teacher.school_id.to_string(),
                    teacher.profile_id.map(|p| p.to_string()),
                    &teacher.full_name,
                    &teacher.email,
                    teacher.subject.as_deref(),
                    fmt_ts(&Utc::now()),
                ),
            )?;
            Ok(())
        })
    }

    pub fn teachers_for_school(&self, school_id: Uuid) -> Result<Vec<Teacher>> {
        self.select_all(
            "SELECT id, school_id, profile_id, full_name, email, subject
             FROM teachers WHERE school_id = ?1 ORDER BY full_name",
            school_id,
            |row| {
                Ok(Teacher {
                    id: uuid_col(row, 0)?,
                    school_id: uuid_col(row, 1)?,
                    profile_id: opt_uuid_col(row, 2)?,
                    full_name: row.get(3)?,
                    email: row.get(4)?,
                    subject: row.get(5)?,
                })
            },
        )
    }

    // -- Students --

    pub fn insert_student(&self, student: &Student) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO students
                    (id, school_id, profile_id, parent_id, class_id, first_name, last_name, admission_number, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                (
                    student.id.to_string(),
                    student.school_id.to_string(),
                    student.profile_id.map(|p| p.to_string()),
                    student.parent_id.map(|p| p.to_string()),
                    student.class_id.map(|c| c.to_string()),
                    &student.first_name,
                    &student.last_name,
                    &student.admission_number,
                    fmt_ts(&Utc::now()),
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM students WHERE id = ?1", STUDENT_COLUMNS);
            Ok(conn.query_row(&sql, [id.to_string()], map_student).optional()?)
        })
    }

    pub fn students_for_school(&self, school_id: Uuid) -> Result<Vec<Student>> {
        self.select_all(
            &format!(
                "SELECT {} FROM students WHERE school_id = ?1 ORDER BY last_name, first_name",
                STUDENT_COLUMNS
            ),
            school_id,
            map_student,
        )
    }

    pub fn students_in_class(&self, class_id: Uuid) -> Result<Vec<Student>> {
        self.select_all(
            &format!(
                "SELECT {} FROM students WHERE class_id = ?1 ORDER BY last_name, first_name",
                STUDENT_COLUMNS
            ),
            class_id,
            map_student,
        )
    }

    pub fn children_of(&self, parent_id: Uuid) -> Result<Vec<Student>> {
        self.select_all(
            &format!(
                "SELECT {} FROM students WHERE parent_id = ?1 ORDER BY first_name",
                STUDENT_COLUMNS
            ),
            parent_id,
            map_student,
        )
    }

    /// Student record linked to a student's own login profile.
    pub fn student_for_profile(&self, profile_id: Uuid) -> Result<Option<Student>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM students WHERE profile_id = ?1", STUDENT_COLUMNS);
            Ok(conn
                .query_row(&sql, [profile_id.to_string()], map_student)
                .optional()?)
        })
    }

    // -- Attendance --

    /// Record (or overwrite) a student's attendance for one day.
    pub fn upsert_attendance(&self, school_id: Uuid, record: &AttendanceRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO attendance (id, school_id, student_id, class_id, date, status, marked_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(student_id, date) DO UPDATE SET
                    status = excluded.status,
                    class_id = excluded.class_id,
                    marked_by = excluded.marked_by",
                (
                    record.id.to_string(),
                    school_id.to_string(),
                    record.student_id.to_string(),
                    record.class_id.to_string(),
                    fmt_date(&record.date),
                    record.status.as_str(),
                    record.marked_by.to_string(),
                    fmt_ts(&Utc::now()),
                ),
            )?;
            Ok(())
        })
    }

    pub fn attendance_for_class_on(
        &self,
        class_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM attendance WHERE class_id = ?1 AND date = ?2",
                ATTENDANCE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((class_id.to_string(), fmt_date(&date)), map_attendance)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Most recent attendance rows for any of `student_ids`, newest day first.
    pub fn attendance_for_students(
        &self,
        student_ids: &[Uuid],
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>> {
        if student_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM attendance WHERE student_id IN ({}) ORDER BY date DESC LIMIT {}",
                ATTENDANCE_COLUMNS,
                placeholders(student_ids.len()),
                limit
            );
            let params: Vec<String> = student_ids.iter().map(Uuid::to_string).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), map_attendance)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Homework --

    pub fn insert_homework(&self, school_id: Uuid, homework: &Homework) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO homework (id, school_id, class_id, teacher_id, title, description, due_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                (
                    homework.id.to_string(),
                    school_id.to_string(),
                    homework.class_id.to_string(),
                    homework.teacher_id.to_string(),
                    &homework.title,
                    &homework.description,
                    fmt_date(&homework.due_date),
                    fmt_ts(&homework.created_at),
                ),
            )?;
            Ok(())
        })
    }

    /// Homework set by a teacher, most recently created first.
    pub fn homework_by_teacher(&self, teacher_id: Uuid, limit: u32) -> Result<Vec<Homework>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM homework WHERE teacher_id = ?1 ORDER BY created_at DESC LIMIT ?2",
                HOMEWORK_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![teacher_id.to_string(), limit], map_homework)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Homework for a class due on or after `from`, soonest first.
    pub fn homework_due_for_class(&self, class_id: Uuid, from: NaiveDate) -> Result<Vec<Homework>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM homework WHERE class_id = ?1 AND due_date >= ?2 ORDER BY due_date",
                HOMEWORK_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((class_id.to_string(), fmt_date(&from)), map_homework)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn homework_for_class(&self, class_id: Uuid) -> Result<Vec<Homework>> {
        self.select_all(
            &format!(
                "SELECT {} FROM homework WHERE class_id = ?1 ORDER BY due_date DESC",
                HOMEWORK_COLUMNS
            ),
            class_id,
            map_homework,
        )
    }

    // -- Dashboard --

    pub fn school_counts(&self, school_id: Uuid) -> Result<SchoolCounts> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM students WHERE school_id = ?1),
                    (SELECT COUNT(*) FROM teachers WHERE school_id = ?1),
                    (SELECT COUNT(*) FROM classes WHERE school_id = ?1),
                    (SELECT COUNT(*) FROM invoices WHERE school_id = ?1 AND status = 'pending')",
                [school_id.to_string()],
                |r| {
                    Ok(SchoolCounts {
                        students: r.get(0)?,
                        teachers: r.get(1)?,
                        classes: r.get(2)?,
                        pending_invoices: r.get(3)?,
                    })
                },
            )?;
            Ok(counts)
        })
    }

    /// Run a single-parameter SELECT keyed by one id.
    fn select_all<T, F>(&self, sql: &str, key: Uuid, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([key.to_string()], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_class(row: &Row<'_>) -> rusqlite::Result<Class> {
    Ok(Class {
        id: uuid_col(row, 0)?,
        school_id: uuid_col(row, 1)?,
        name: row.get(2)?,
        grade_level: row.get(3)?,
        teacher_id: opt_uuid_col(row, 4)?,
    })
}

fn map_student(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: uuid_col(row, 0)?,
        school_id: uuid_col(row, 1)?,
        profile_id: opt_uuid_col(row, 2)?,
        parent_id: opt_uuid_col(row, 3)?,
        class_id: opt_uuid_col(row, 4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
        admission_number: row.get(7)?,
    })
}

fn map_attendance(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: uuid_col(row, 0)?,
        student_id: uuid_col(row, 1)?,
        class_id: uuid_col(row, 2)?,
        date: date_col(row, 3)?,
        status: enum_col::<AttendanceStatus>(row, 4)?,
        marked_by: uuid_col(row, 5)?,
    })
}

fn map_homework(row: &Row<'_>) -> rusqlite::Result<Homework> {
    Ok(Homework {
        id: uuid_col(row, 0)?,
        class_id: uuid_col(row, 1)?,
        teacher_id: uuid_col(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        due_date: date_col(row, 5)?,
        created_at: ts_col(row, 6)?,
    })
}

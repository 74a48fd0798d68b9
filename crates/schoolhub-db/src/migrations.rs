use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE schools (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                id          TEXT PRIMARY KEY,
                school_id   TEXT NOT NULL REFERENCES schools(id),
                role        TEXT NOT NULL CHECK (role IN ('admin', 'teacher', 'parent', 'student')),
                full_name   TEXT NOT NULL,
                email       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_profiles_school ON profiles(school_id, role);

            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                sender_id     TEXT NOT NULL REFERENCES profiles(id),
                recipient_id  TEXT NOT NULL REFERENCES profiles(id),
                subject       TEXT NOT NULL,
                body          TEXT NOT NULL,
                is_read       INTEGER NOT NULL DEFAULT 0,
                read_at       TEXT,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_messages_sender ON messages(sender_id, created_at);
            CREATE INDEX idx_messages_recipient ON messages(recipient_id, created_at);

            CREATE TABLE notifications (
                id            TEXT PRIMARY KEY,
                school_id     TEXT NOT NULL REFERENCES schools(id),
                recipient_id  TEXT NOT NULL REFERENCES profiles(id),
                title         TEXT NOT NULL,
                body          TEXT NOT NULL,
                is_read       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, created_at);

            CREATE TABLE teachers (
                id          TEXT PRIMARY KEY,
                school_id   TEXT NOT NULL REFERENCES schools(id),
                profile_id  TEXT REFERENCES profiles(id),
                full_name   TEXT NOT NULL,
                email       TEXT NOT NULL,
                subject     TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_teachers_school ON teachers(school_id);

            CREATE TABLE classes (
                id           TEXT PRIMARY KEY,
                school_id    TEXT NOT NULL REFERENCES schools(id),
                name         TEXT NOT NULL,
                grade_level  TEXT NOT NULL,
                teacher_id   TEXT REFERENCES profiles(id),
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_classes_school ON classes(school_id);
            CREATE INDEX idx_classes_teacher ON classes(teacher_id);

            CREATE TABLE students (
                id                TEXT PRIMARY KEY,
                school_id         TEXT NOT NULL REFERENCES schools(id),
                profile_id        TEXT REFERENCES profiles(id),
                parent_id         TEXT REFERENCES profiles(id),
                class_id          TEXT REFERENCES classes(id),
                first_name        TEXT NOT NULL,
                last_name         TEXT NOT NULL,
                admission_number  TEXT NOT NULL,
                created_at        TEXT NOT NULL,
                UNIQUE(school_id, admission_number)
            );

            CREATE INDEX idx_students_class ON students(class_id);
            CREATE INDEX idx_students_parent ON students(parent_id);
            CREATE INDEX idx_students_profile ON students(profile_id);

            CREATE TABLE attendance (
                id          TEXT PRIMARY KEY,
                school_id   TEXT NOT NULL REFERENCES schools(id),
                student_id  TEXT NOT NULL REFERENCES students(id),
                class_id    TEXT NOT NULL REFERENCES classes(id),
                date        TEXT NOT NULL,
                status      TEXT NOT NULL CHECK (status IN ('present', 'absent', 'late', 'excused')),
                marked_by   TEXT NOT NULL REFERENCES profiles(id),
                created_at  TEXT NOT NULL,
                UNIQUE(student_id, date)
            );

            CREATE INDEX idx_attendance_class_date ON attendance(class_id, date);

            CREATE TABLE homework (
                id           TEXT PRIMARY KEY,
                school_id    TEXT NOT NULL REFERENCES schools(id),
                class_id     TEXT NOT NULL REFERENCES classes(id),
                teacher_id   TEXT NOT NULL REFERENCES profiles(id),
                title        TEXT NOT NULL,
                description  TEXT NOT NULL,
                due_date     TEXT NOT NULL,
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_homework_class_due ON homework(class_id, due_date);
            CREATE INDEX idx_homework_teacher ON homework(teacher_id, created_at);

            CREATE TABLE invoices (
                id            TEXT PRIMARY KEY,
                school_id     TEXT NOT NULL REFERENCES schools(id),
                student_id    TEXT NOT NULL REFERENCES students(id),
                description   TEXT NOT NULL,
                amount_cents  INTEGER NOT NULL CHECK (amount_cents > 0),
                due_date      TEXT NOT NULL,
                status        TEXT NOT NULL DEFAULT 'pending'
                              CHECK (status IN ('pending', 'paid', 'overdue')),
                paid_at       TEXT,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_invoices_school ON invoices(school_id, status);
            CREATE INDEX idx_invoices_student ON invoices(student_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

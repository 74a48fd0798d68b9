use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use schoolhub_types::models::{Message, Notification, Profile};

use crate::Database;
use crate::models::{
    NewMessage, NewNotification, enum_col, fmt_ts, opt_ts_col, placeholders, ts_col, uuid_col,
};

const PROFILE_COLUMNS: &str = "id, school_id, role, full_name, email";
const MESSAGE_COLUMNS: &str =
    "id, sender_id, recipient_id, subject, body, is_read, read_at, created_at";

impl Database {
    // -- Schools --

    pub fn create_school(&self, id: Uuid, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO schools (id, name, created_at) VALUES (?1, ?2, ?3)",
                (id.to_string(), name, fmt_ts(&Utc::now())),
            )?;
            Ok(())
        })
    }

    // -- Profiles --

    pub fn create_profile(&self, profile: &Profile) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, school_id, role, full_name, email, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    profile.id.to_string(),
                    profile.school_id.to_string(),
                    profile.role.as_str(),
                    &profile.full_name,
                    &profile.email,
                    fmt_ts(&Utc::now()),
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS);
            let profile = conn
                .query_row(&sql, [id.to_string()], map_profile)
                .optional()?;
            Ok(profile)
        })
    }

    /// Batch-fetch profiles for a set of ids. Unknown ids are skipped.
    pub fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM profiles WHERE id IN ({})",
                PROFILE_COLUMNS,
                placeholders(ids.len())
            );
            let params: Vec<String> = ids.iter().map(Uuid::to_string).collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), map_profile)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, new: &NewMessage<'_>) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            recipient_id: new.recipient_id,
            subject: new.subject.to_string(),
            body: new.body.to_string(),
            is_read: false,
            read_at: None,
            created_at: new.created_at,
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, subject, body, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                (
                    message.id.to_string(),
                    message.sender_id.to_string(),
                    message.recipient_id.to_string(),
                    &message.subject,
                    &message.body,
                    fmt_ts(&message.created_at),
                ),
            )?;
            Ok(())
        })?;

        Ok(message)
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            let message = conn
                .query_row(&sql, [id.to_string()], map_message)
                .optional()?;
            Ok(message)
        })
    }

    /// Messages sent or received by `user_id`, newest first.
    pub fn messages_for_user(&self, user_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE sender_id = ?1 OR recipient_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
                MESSAGE_COLUMNS
            );
            query_messages(conn, &sql, rusqlite::params![user_id.to_string(), limit])
        })
    }

    /// Messages exchanged between `user_id` and `peer_id`, newest first.
    pub fn thread(&self, user_id: Uuid, peer_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE (sender_id = ?1 AND recipient_id = ?2)
                    OR (sender_id = ?2 AND recipient_id = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                MESSAGE_COLUMNS
            );
            query_messages(
                conn,
                &sql,
                rusqlite::params![user_id.to_string(), peer_id.to_string(), limit],
            )
        })
    }

    pub fn unread_message_count(&self, recipient_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Flag a message as read. Only the row whose recipient is `recipient_id`
    /// is touched; returns the number of rows updated (0 or 1).
    pub fn mark_message_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1, read_at = ?3
                 WHERE id = ?1 AND recipient_id = ?2",
                (id.to_string(), recipient_id.to_string(), fmt_ts(&at)),
            )?;
            Ok(updated)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, new: &NewNotification<'_>) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: new.recipient_id,
            title: new.title.to_string(),
            body: new.body.to_string(),
            is_read: false,
            created_at: new.created_at,
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, school_id, recipient_id, title, body, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                (
                    notification.id.to_string(),
                    new.school_id.to_string(),
                    notification.recipient_id.to_string(),
                    &notification.title,
                    &notification.body,
                    fmt_ts(&notification.created_at),
                ),
            )?;
            Ok(())
        })?;

        Ok(notification)
    }

    pub fn notifications_for(&self, recipient_id: Uuid, limit: u32) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, title, body, is_read, created_at
                 FROM notifications
                 WHERE recipient_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![recipient_id.to_string(), limit], |row| {
                    Ok(Notification {
                        id: uuid_col(row, 0)?,
                        recipient_id: uuid_col(row, 1)?,
                        title: row.get(2)?,
                        body: row.get(3)?,
                        is_read: row.get(4)?,
                        created_at: ts_col(row, 5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_notification_read(&self, id: Uuid, recipient_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
                (id.to_string(), recipient_id.to_string()),
            )?;
            Ok(updated)
        })
    }
}

fn map_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: uuid_col(row, 0)?,
        school_id: uuid_col(row, 1)?,
        role: enum_col(row, 2)?,
        full_name: row.get(3)?,
        email: row.get(4)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_col(row, 0)?,
        sender_id: uuid_col(row, 1)?,
        recipient_id: uuid_col(row, 2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        is_read: row.get(5)?,
        read_at: opt_ts_col(row, 6)?,
        created_at: ts_col(row, 7)?,
    })
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use schoolhub_types::models::Role;

    fn seed() -> (Database, Uuid, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let school = Uuid::new_v4();
        db.create_school(school, "Northside Primary").unwrap();

        let mut ids = Vec::new();
        for (name, role) in [("Ada", Role::Teacher), ("Ben", Role::Parent), ("Cy", Role::Parent)] {
            let id = Uuid::new_v4();
            db.create_profile(&Profile {
                id,
                school_id: school,
                role,
                full_name: name.into(),
                email: format!("{}@example.org", name.to_lowercase()),
            })
            .unwrap();
            ids.push(id);
        }
        (db, ids[0], ids[1], ids[2])
    }

    fn send(db: &Database, from: Uuid, to: Uuid, minute: u32) -> Message {
        db.insert_message(&NewMessage {
            sender_id: from,
            recipient_id: to,
            subject: "Trip",
            body: "Permission slip",
            created_at: Utc.with_ymd_and_hms(2024, 10, 1, 9, minute, 0).unwrap(),
        })
        .unwrap()
    }

    #[test]
    fn messages_for_user_are_newest_first() {
        let (db, a, b, c) = seed();
        send(&db, b, a, 1);
        send(&db, a, c, 2);
        send(&db, c, b, 3);

        let rows = db.messages_for_user(a, 50).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].created_at > rows[1].created_at);
        assert_eq!(rows[0].recipient_id, c);
    }

    #[test]
    fn mark_read_requires_recipient() {
        let (db, a, b, _) = seed();
        let msg = send(&db, a, b, 5);

        assert_eq!(db.mark_message_read(msg.id, a, Utc::now()).unwrap(), 0);
        assert!(!db.get_message(msg.id).unwrap().unwrap().is_read);

        assert_eq!(db.mark_message_read(msg.id, b, Utc::now()).unwrap(), 1);
        let stored = db.get_message(msg.id).unwrap().unwrap();
        assert!(stored.is_read);
        assert!(stored.read_at.is_some());
        assert_eq!(db.unread_message_count(b).unwrap(), 0);
    }

    #[test]
    fn insert_to_unknown_recipient_fails() {
        let (db, a, _, _) = seed();
        let res = db.insert_message(&NewMessage {
            sender_id: a,
            recipient_id: Uuid::new_v4(),
            subject: "Hello",
            body: "Anyone?",
            created_at: Utc::now(),
        });
        assert!(res.is_err());
    }

    #[test]
    fn batch_profile_lookup_skips_unknown_ids() {
        let (db, a, b, _) = seed();
        let found = db.get_profiles(&[a, b, Uuid::new_v4()]).unwrap();
        assert_eq!(found.len(), 2);
        assert!(db.get_profiles(&[]).unwrap().is_empty());
    }

    #[test]
    fn thread_only_contains_the_pair() {
        let (db, a, b, c) = seed();
        send(&db, a, b, 1);
        send(&db, b, a, 2);
        send(&db, a, c, 3);

        let thread = db.thread(a, b, 50).unwrap();
        assert_eq!(thread.len(), 2);
        assert!(thread.iter().all(|m| m.sender_id != c && m.recipient_id != c));
    }

    #[test]
    fn notifications_are_read_by_their_recipient_only() {
        let (db, a, b, _) = seed();
        let school_id = db.get_profile(a).unwrap().unwrap().school_id;
        let n = db
            .insert_notification(&NewNotification {
                school_id,
                recipient_id: b,
                title: "Sports day",
                body: "Bring a water bottle",
                created_at: Utc::now(),
            })
            .unwrap();

        assert!(db.notifications_for(a, 10).unwrap().is_empty());
        assert_eq!(db.mark_notification_read(n.id, a).unwrap(), 0);
        assert_eq!(db.mark_notification_read(n.id, b).unwrap(), 1);
        assert!(db.notifications_for(b, 10).unwrap()[0].is_read);
    }
}

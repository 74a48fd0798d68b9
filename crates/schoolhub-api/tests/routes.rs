use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use schoolhub_api::auth::{AppState, AppStateInner, AuthClient, Backend};
use schoolhub_api::cache::PageCache;
use schoolhub_api::middleware::{SESSION_COOKIE, SessionVerifier};
use schoolhub_api::routes;
use schoolhub_db::Database;
use schoolhub_types::api::Claims;
use schoolhub_types::models::{Class, Profile, Role, Student};

const SECRET: &str = "test-jwt-secret";

struct Harness {
    state: AppState,
    app: Router,
    school_id: Uuid,
}

impl Harness {
    fn new() -> Self {
        Self::with_cache(PageCache::default())
    }

    fn with_cache(cache: PageCache) -> Self {
        let db = Database::open_in_memory().unwrap();
        let school_id = Uuid::new_v4();
        db.create_school(school_id, "Riverside Primary").unwrap();

        // Port 9 (discard): provider calls fail fast.
        let backend = Backend {
            client: AuthClient::new("http://127.0.0.1:9", "anon").unwrap(),
            verifier: SessionVerifier::new(SECRET),
        };
        let state = AppStateInner::with_cache(db, Some(backend), false, cache);
        let app = routes::router(state.clone());
        Self { state, app, school_id }
    }

    fn profile(&self, role: Role, name: &str) -> Uuid {
        self.profile_in(self.school_id, role, name)
    }

    fn profile_in(&self, school_id: Uuid, role: Role, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .db
            .create_profile(&Profile {
                id,
                school_id,
                role,
                full_name: name.into(),
                email: format!("{}@example.org", name.to_lowercase()),
            })
            .unwrap();
        id
    }

    fn other_school(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.state.db.create_school(id, "Hillcrest Academy").unwrap();
        id
    }

    fn class_in(&self, school_id: Uuid, teacher_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .db
            .insert_class(&Class {
                id,
                school_id,
                name: "4B".into(),
                grade_level: "4".into(),
                teacher_id,
            })
            .unwrap();
        id
    }

    fn student_in(&self, school_id: Uuid, class_id: Option<Uuid>, parent_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .db
            .insert_student(&Student {
                id,
                school_id,
                profile_id: None,
                parent_id,
                class_id,
                first_name: "Ada".into(),
                last_name: "Lindqvist".into(),
                admission_number: format!("RS-{}", &id.simple().to_string()[..8]),
            })
            .unwrap();
        id
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Option<String>, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let location = resp
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, location, body)
    }
}

fn token(sub: Uuid) -> String {
    token_expiring_in(sub, 3600)
}

fn token_expiring_in(sub: Uuid, secs: i64) -> String {
    let claims = Claims {
        sub,
        email: None,
        aud: "authenticated".into(),
        exp: (Utc::now().timestamp() + secs) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn get(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token(user)));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, user: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token(user)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn public_pages_need_no_session() {
    let h = Harness::new();
    for path in ["/", "/about", "/contact", "/login", "/signup"] {
        let (status, _, body) = h.send(get(path, None)).await;
        assert_eq!(status, StatusCode::OK, "{}", path);
        assert!(body["title"].is_string());
    }
}

#[tokio::test]
async fn gated_pages_redirect_to_login_without_session() {
    let h = Harness::new();
    for path in ["/messages", "/admin", "/parent/fees"] {
        let (status, location, _) = h.send(get(path, None)).await;
        assert_eq!(status, StatusCode::SEE_OTHER, "{}", path);
        assert_eq!(location.as_deref(), Some("/login"));
    }
}

#[tokio::test]
async fn forged_session_is_rejected() {
    let h = Harness::new();
    let req = Request::builder()
        .uri("/messages")
        .header(header::COOKIE, format!("{}=not-a-token", SESSION_COOKIE))
        .body(Body::empty())
        .unwrap();
    let (status, location, _) = h.send(req).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/login"));
}

#[tokio::test]
async fn unconfigured_backend_serves_public_pages_only() {
    let state = AppStateInner::new(Database::open_in_memory().unwrap(), None, false);
    let app = routes::router(state);

    let resp = app.clone().oneshot(get("/about", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/messages", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn sent_message_shows_up_in_both_inboxes() {
    let h = Harness::new();
    let teacher = h.profile(Role::Teacher, "Okafor");
    let parent = h.profile(Role::Parent, "Lindqvist");

    // Prime the recipient's cache so the send has something to invalidate.
    let (_, _, before) = h.send(get("/messages", Some(parent))).await;
    assert_eq!(before["conversations"], json!([]));

    let (status, _, sent) = h
        .send(post_json(
            "/messages",
            teacher,
            json!({ "recipient_id": parent, "subject": "Trip", "body": "Forms due Friday" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["is_read"], json!(false));

    let (_, _, inbox) = h.send(get("/messages", Some(parent))).await;
    assert_eq!(inbox["unread"], json!(1));
    let conversations = inbox["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["peer_id"], json!(teacher));
    assert_eq!(conversations[0]["peer_name"], json!("Okafor"));

    let (_, _, outbox) = h.send(get("/messages", Some(teacher))).await;
    assert_eq!(outbox["conversations"][0]["peer_id"], json!(parent));
    assert_eq!(outbox["unread"], json!(0));
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let h = Harness::new();
    let a = h.profile(Role::Teacher, "Okafor");
    let b = h.profile(Role::Parent, "Lindqvist");
    let (status, _, body) = h
        .send(post_json("/messages", a, json!({ "recipient_id": b, "subject": "  ", "body": "x" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("subject is required"));
}

#[tokio::test]
async fn only_recipient_can_mark_message_read() {
    let h = Harness::new();
    let teacher = h.profile(Role::Teacher, "Okafor");
    let parent = h.profile(Role::Parent, "Lindqvist");

    let (_, _, sent) = h
        .send(post_json(
            "/messages",
            teacher,
            json!({ "recipient_id": parent, "subject": "Trip", "body": "Forms due Friday" }),
        ))
        .await;
    let id: Uuid = serde_json::from_value(sent["id"].clone()).unwrap();

    let (status, _, _) = h
        .send(post_json(&format!("/messages/{}/read", id), teacher, json!({})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!h.state.db.get_message(id).unwrap().unwrap().is_read);

    h.send(post_json(&format!("/messages/{}/read", id), parent, json!({}))).await;
    let message = h.state.db.get_message(id).unwrap().unwrap();
    assert!(message.is_read);
    assert!(message.read_at.is_some());
}

#[tokio::test]
async fn wrong_portal_redirects_to_own_portal() {
    let h = Harness::new();
    let parent = h.profile(Role::Parent, "Lindqvist");
    let (status, location, _) = h.send(get("/admin", Some(parent))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/parent"));
}

#[tokio::test]
async fn session_without_profile_goes_home() {
    let h = Harness::new();
    let (status, location, _) = h.send(get("/teacher", Some(Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location.as_deref(), Some("/"));
}

#[tokio::test]
async fn teacher_cannot_set_homework_for_another_class() {
    let h = Harness::new();
    let owner = h.profile(Role::Teacher, "Okafor");
    let other = h.profile(Role::Teacher, "Brennan");
    let class_id = Uuid::new_v4();
    h.state
        .db
        .insert_class(&Class {
            id: class_id,
            school_id: h.school_id,
            name: "4B".into(),
            grade_level: "4".into(),
            teacher_id: Some(owner),
        })
        .unwrap();

    let body = json!({
        "class_id": class_id,
        "title": "Fractions",
        "description": "Worksheet 3",
        "due_date": "2030-01-15"
    });
    let (status, _, _) = h.send(post_json("/teacher/homework", other, body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = h.send(post_json("/teacher/homework", owner, body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, _, page) = h.send(get("/teacher/homework", Some(owner))).await;
    assert_eq!(page["homework"][0]["title"], json!("Fractions"));
}

#[tokio::test]
async fn parent_sees_only_own_childs_attendance() {
    let h = Harness::new();
    let teacher = h.profile(Role::Teacher, "Okafor");
    let parent = h.profile(Role::Parent, "Lindqvist");
    let stranger = h.profile(Role::Parent, "Moreau");

    let class_id = Uuid::new_v4();
    h.state
        .db
        .insert_class(&Class {
            id: class_id,
            school_id: h.school_id,
            name: "4B".into(),
            grade_level: "4".into(),
            teacher_id: Some(teacher),
        })
        .unwrap();
    let student_id = Uuid::new_v4();
    h.state
        .db
        .insert_student(&Student {
            id: student_id,
            school_id: h.school_id,
            profile_id: None,
            parent_id: Some(parent),
            class_id: Some(class_id),
            first_name: "Ada".into(),
            last_name: "Lindqvist".into(),
            admission_number: "RS-0042".into(),
        })
        .unwrap();

    let (status, _, _) = h
        .send(post_json(
            "/teacher/attendance",
            teacher,
            json!({
                "student_id": student_id,
                "class_id": class_id,
                "date": "2026-10-12",
                "status": "late"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let path = format!("/parent/children/{}/attendance", student_id);
    let (_, _, own) = h.send(get(&path, Some(parent))).await;
    let records = own["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], json!("late"));

    let (status, _, other) = h.send(get(&path, Some(stranger))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(other["records"], json!([]));
}

#[tokio::test]
async fn other_schools_stay_out_of_messaging() {
    let h = Harness::new();
    let parent = h.profile(Role::Parent, "Lindqvist");
    let elsewhere = h.other_school();
    let outsider = h.profile_in(elsewhere, Role::Admin, "Principal");

    let (status, _, thread) = h.send(get(&format!("/messages/{}", outsider), Some(parent))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["peer"], Value::Null);

    let (status, _, body) = h
        .send(post_json(
            "/messages",
            parent,
            json!({ "recipient_id": outsider, "subject": "Hi", "body": "Hello there" }),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("internal error"));
    assert!(h.state.db.messages_for_user(outsider, 10).unwrap().is_empty());
}

#[tokio::test]
async fn thread_shows_peer_from_same_school() {
    let h = Harness::new();
    let parent = h.profile(Role::Parent, "Lindqvist");
    let teacher = h.profile(Role::Teacher, "Okafor");

    let (_, _, thread) = h.send(get(&format!("/messages/{}", teacher), Some(parent))).await;
    assert_eq!(thread["peer"]["full_name"], json!("Okafor"));
}

#[tokio::test]
async fn invoice_for_student_of_another_school_is_rejected() {
    let h = Harness::new();
    let admin = h.profile(Role::Admin, "Moreau");
    let foreign_student = h.student_in(h.other_school(), None, None);

    let (status, _, body) = h
        .send(post_json(
            "/admin/fees",
            admin,
            json!({
                "student_id": foreign_student,
                "description": "Term 1 tuition",
                "amount_cents": 125000,
                "due_date": "2026-11-30"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("could not save invoice"));
    assert!(h.state.db.invoices_for_students(&[foreign_student], false).unwrap().is_empty());
}

#[tokio::test]
async fn paying_unknown_or_settled_invoice_is_not_found() {
    let h = Harness::new();
    let admin = h.profile(Role::Admin, "Moreau");
    let student = h.student_in(h.school_id, None, None);

    let (status, _, _) = h
        .send(post_json(&format!("/admin/fees/{}/paid", Uuid::new_v4()), admin, json!({})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, invoice) = h
        .send(post_json(
            "/admin/fees",
            admin,
            json!({
                "student_id": student,
                "description": "Library fine",
                "amount_cents": 500,
                "due_date": "2026-11-30"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let paid = format!("/admin/fees/{}/paid", invoice["id"].as_str().unwrap());

    let (status, _, _) = h.send(post_json(&paid, admin, json!({}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = h.send(post_json(&paid, admin, json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn notification_only_reaches_members_of_the_school() {
    let h = Harness::new();
    let admin = h.profile(Role::Admin, "Moreau");
    let parent = h.profile(Role::Parent, "Lindqvist");
    let outsider = h.profile_in(h.other_school(), Role::Parent, "Brennan");

    let (status, _, body) = h
        .send(post_json(
            "/admin/notifications",
            admin,
            json!({ "recipient_id": outsider, "title": "Closure", "body": "Snow day" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("recipient is not a member of this school"));
    assert!(h.state.db.notifications_for(outsider, 10).unwrap().is_empty());

    let (status, _, _) = h
        .send(post_json(
            "/admin/notifications",
            admin,
            json!({ "recipient_id": parent, "title": "Closure", "body": "Snow day" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, _, page) = h.send(get("/notifications", Some(parent))).await;
    assert_eq!(page["notifications"][0]["title"], json!("Closure"));
}

#[tokio::test]
async fn student_in_class_of_another_school_is_rejected() {
    let h = Harness::new();
    let admin = h.profile(Role::Admin, "Moreau");
    let foreign_class = h.class_in(h.other_school(), None);

    let (status, _, body) = h
        .send(post_json(
            "/admin/students",
            admin,
            json!({
                "first_name": "Ada",
                "last_name": "Lindqvist",
                "admission_number": "RS-0099",
                "class_id": foreign_class
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("could not save student"));

    let (_, _, page) = h.send(get("/admin/students", Some(admin))).await;
    assert_eq!(page["students"], json!([]));
}

#[tokio::test]
async fn cross_portal_views_catch_up_after_expiry() {
    let h = Harness::with_cache(PageCache::new(Duration::from_millis(500)));
    let teacher = h.profile(Role::Teacher, "Okafor");
    let parent = h.profile(Role::Parent, "Lindqvist");
    let class_id = h.class_in(h.school_id, Some(teacher));
    let student_id = h.student_in(h.school_id, Some(class_id), Some(parent));
    let path = format!("/parent/children/{}/attendance", student_id);

    let (_, _, before) = h.send(get(&path, Some(parent))).await;
    assert_eq!(before["records"], json!([]));

    let (status, _, _) = h
        .send(post_json(
            "/teacher/attendance",
            teacher,
            json!({
                "student_id": student_id,
                "class_id": class_id,
                "date": "2026-10-12",
                "status": "absent"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // The teacher's action only invalidates the teacher's pages.
    let (_, _, cached) = h.send(get(&path, Some(parent))).await;
    assert_eq!(cached["records"], json!([]));

    tokio::time::sleep(Duration::from_millis(700)).await;
    let (_, _, fresh) = h.send(get(&path, Some(parent))).await;
    assert_eq!(fresh["records"][0]["status"], json!("absent"));
}

#[tokio::test]
async fn logout_clears_cookie_without_valid_session() {
    let expired = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(
            header::COOKIE,
            format!("{}={}", SESSION_COOKIE, token_expiring_in(Uuid::new_v4(), -3600)),
        )
        .body(Body::empty())
        .unwrap();
    let degraded_app = routes::router(AppStateInner::new(Database::open_in_memory().unwrap(), None, false));
    let stale = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(header::COOKIE, format!("{}=stale", SESSION_COOKIE))
        .body(Body::empty())
        .unwrap();

    for (app, req) in [(Harness::new().app, expired), (degraded_app, stale)] {
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/login");
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("{}=", SESSION_COOKIE)), "{}", cookie);
    }
}

use axum::Json;

use schoolhub_types::api::PublicPage;

pub async fn home() -> Json<PublicPage> {
    Json(PublicPage {
        title: "SchoolHub",
        body: "Attendance, homework, fees and messaging for your school.",
    })
}

pub async fn about() -> Json<PublicPage> {
    Json(PublicPage {
        title: "About",
        body: "SchoolHub connects administrators, teachers, parents and students.",
    })
}

pub async fn contact() -> Json<PublicPage> {
    Json(PublicPage {
        title: "Contact",
        body: "Reach your school office through the messages page after signing in.",
    })
}

pub async fn login_page() -> Json<PublicPage> {
    Json(PublicPage {
        title: "Sign in",
        body: "POST email and password to /login.",
    })
}

pub async fn signup_page() -> Json<PublicPage> {
    Json(PublicPage {
        title: "Create an account",
        body: "POST email, password, full_name and school_id to /signup.",
    })
}

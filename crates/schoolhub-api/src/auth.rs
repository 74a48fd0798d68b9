use std::sync::Arc;

use anyhow::Context;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use schoolhub_db::Database;
use schoolhub_types::api::{LoginForm, SignupForm};
use schoolhub_types::models::{Profile, Role};

use crate::cache::PageCache;
use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::middleware::{SESSION_COOKIE, SessionVerifier};
use crate::render::run_db;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// `None` when the identity backend is not configured.
    pub backend: Option<Backend>,
    pub cache: PageCache,
    pub cookie_secure: bool,
}

impl AppStateInner {
    pub fn new(db: Database, backend: Option<Backend>, cookie_secure: bool) -> AppState {
        Self::with_cache(db, backend, cookie_secure, PageCache::default())
    }

    pub fn with_cache(
        db: Database,
        backend: Option<Backend>,
        cookie_secure: bool,
        cache: PageCache,
    ) -> AppState {
        Arc::new(Self {
            db,
            backend,
            cache,
            cookie_secure,
        })
    }

    fn backend(&self) -> Result<&Backend, ApiError> {
        self.backend.as_ref().ok_or(ApiError::Unavailable)
    }
}

/// Identity provider handles: REST client for sign-in/out and the local
/// token verifier used by the session gate.
pub struct Backend {
    pub client: AuthClient,
    pub verifier: SessionVerifier,
}

impl Backend {
    pub fn from_config(config: &BackendConfig) -> anyhow::Result<Option<Self>> {
        let (Some(url), Some(anon_key), Some(secret)) =
            (&config.url, &config.anon_key, &config.jwt_secret)
        else {
            return Ok(None);
        };

        Ok(Some(Self {
            client: AuthClient::new(url, anon_key)?,
            verifier: SessionVerifier::new(secret),
        }))
    }
}

// -- Identity provider REST client --

#[derive(Debug, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session returned by a password sign-in.
#[derive(Debug, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub user: AuthUser,
}

/// Sign-up answers with a session when no email confirmation is required,
/// and with the bare user otherwise.
#[derive(Debug, Deserialize)]
pub struct SignUpResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default)]
    pub id: Option<Uuid>,
}

impl SignUpResponse {
    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id).or(self.id)
    }
}

pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, anon_key: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("schoolhub/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building identity provider client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> anyhow::Result<AuthSession> {
        let session = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?
            .error_for_status()?
            .json::<AuthSession>()
            .await?;
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> anyhow::Result<SignUpResponse> {
        let resp = self
            .http
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?
            .error_for_status()?
            .json::<SignUpResponse>()
            .await?;
        Ok(resp)
    }

    pub async fn sign_out(&self, access_token: &str) -> anyhow::Result<()> {
        self.http
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// -- Session cookie --

pub fn session_cookie(access_token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, access_token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

// -- Handlers --

/// POST /login: exchange credentials for a session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, ApiError> {
    let backend = state.backend()?;

    let session = match backend.client.sign_in_with_password(&form.email, &form.password).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Sign-in failed for {}: {}", form.email, e);
            return Ok((jar, Redirect::to("/login?error=invalid_credentials")));
        }
    };

    let user_id = session.user.id;
    let profile = run_db(&state, move |db| db.get_profile(user_id)).await?;
    let landing = profile.map(|p| p.role.portal_path()).unwrap_or("/");

    info!("User {} signed in", user_id);
    Ok((
        jar.add(session_cookie(session.access_token, state.cookie_secure)),
        Redirect::to(landing),
    ))
}

/// POST /signup: register with the identity provider and create a parent
/// profile in the chosen school. Staff and student profiles are provisioned
/// by school admins.
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<impl IntoResponse, ApiError> {
    let backend = state.backend()?;

    let full_name = form.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(ApiError::bad_request("full_name is required"));
    }
    if form.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }

    let resp = match backend.client.sign_up(&form.email, &form.password).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Sign-up failed for {}: {}", form.email, e);
            return Ok((jar, Redirect::to("/signup?error=signup_failed")));
        }
    };

    let user_id = resp.user_id().context("sign-up response carried no user id")?;
    let profile = Profile {
        id: user_id,
        school_id: form.school_id,
        role: Role::Parent,
        full_name,
        email: form.email.clone(),
    };
    run_db(&state, move |db| db.create_profile(&profile))
        .await
        .map_err(|e| {
            warn!("Profile creation failed for {}: {}", user_id, e);
            ApiError::bad_request("unknown school")
        })?;

    info!("User {} signed up", user_id);
    match resp.access_token {
        Some(token) => Ok((
            jar.add(session_cookie(token, state.cookie_secure)),
            Redirect::to(Role::Parent.portal_path()),
        )),
        None => Ok((jar, Redirect::to("/login?notice=confirm_email"))),
    }
}

/// POST /logout: revoke the provider session (best effort) and clear the cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let (Some(backend), Some(cookie)) = (state.backend.as_ref(), jar.get(SESSION_COOKIE)) {
        if let Err(e) = backend.client.sign_out(cookie.value()).await {
            warn!("Provider sign-out failed: {}", e);
        }
    }

    (jar.remove(expired_session_cookie()), Redirect::to("/login"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_http_only_and_scoped_to_root() {
        let cookie = session_cookie("tok".into(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn signup_user_id_from_either_shape() {
        let with_session: SignUpResponse = serde_json::from_value(json!({
            "access_token": "tok",
            "user": { "id": "6f1c0a52-5a0e-4c4e-9d43-2b5b0d3f7a11", "email": "p@example.org" }
        }))
        .unwrap();
        assert!(with_session.user_id().is_some());

        let bare: SignUpResponse = serde_json::from_value(json!({
            "id": "6f1c0a52-5a0e-4c4e-9d43-2b5b0d3f7a11",
            "email": "p@example.org"
        }))
        .unwrap();
        assert_eq!(bare.user_id(), with_session.user_id());
        assert!(bare.access_token.is_none());
    }

    #[test]
    fn unconfigured_backend_is_none() {
        assert!(Backend::from_config(&BackendConfig::default()).unwrap().is_none());
    }
}

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;
use uuid::Uuid;

use schoolhub_types::api::Claims;

use crate::auth::AppState;

/// Cookie holding the identity provider's access token.
pub const SESSION_COOKIE: &str = "schoolhub-session";

/// Paths served without a session.
pub const PUBLIC_PATHS: &[&str] = &["/", "/login", "/signup", "/about", "/contact"];

/// Served with or without a session so a stale cookie can always be cleared.
pub const LOGOUT_PATH: &str = "/logout";

/// Audience the identity provider stamps on user access tokens.
const TOKEN_AUDIENCE: &str = "authenticated";

/// Authenticated caller, attached to request extensions by [`session_gate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Verifies access tokens issued by the identity provider.
#[derive(Clone)]
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(jwt_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
        }
    }

    /// The identity behind `token`, or `None` when it is malformed, expired
    /// or signed with another key.
    pub fn get_user(&self, token: &str) -> Option<Identity> {
        let data = decode::<Claims>(token, &self.key, &self.validation).ok()?;
        Some(Identity {
            id: data.claims.sub,
            email: data.claims.email,
        })
    }
}

pub fn is_public_path(path: &str) -> bool {
    let trimmed = if path.len() > 1 { path.strip_suffix('/').unwrap_or(path) } else { path };
    PUBLIC_PATHS.contains(&trimmed)
}

/// Gate every request on session presence.
///
/// Public paths and `/logout` always pass. With no configured backend every
/// other path redirects to `/`; otherwise a missing or invalid session
/// redirects to `/login`. A valid session is attached as an [`Identity`]
/// extension.
pub async fn session_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let public = is_public_path(req.uri().path());
    let passes_unauthenticated = public || req.uri().path() == LOGOUT_PATH;

    let Some(backend) = state.backend.as_ref() else {
        if passes_unauthenticated {
            return next.run(req).await;
        }
        debug!("Backend not configured, redirecting {} to /", req.uri().path());
        return Redirect::to("/").into_response();
    };

    let identity = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| backend.verifier.get_user(cookie.value()));

    match identity {
        Some(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        None if passes_unauthenticated => next.run(req).await,
        None => {
            debug!("No session for {}, redirecting to /login", req.uri().path());
            Redirect::to("/login").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, aud: &str, exp_offset: i64) -> (Uuid, String) {
        let sub = Uuid::new_v4();
        let claims = Claims {
            sub,
            email: Some("parent@example.org".into()),
            aud: aud.into(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        let t = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();
        (sub, t)
    }

    #[test]
    fn public_paths() {
        for p in ["/", "/login", "/signup", "/about", "/contact", "/about/"] {
            assert!(is_public_path(p), "{} should be public", p);
        }
        for p in ["/admin", "/login/extra", "/messages", ""] {
            assert!(!is_public_path(p), "{} should be gated", p);
        }
    }

    #[test]
    fn verifier_accepts_valid_token() {
        let verifier = SessionVerifier::new("secret");
        let (sub, t) = token("secret", "authenticated", 3600);
        let identity = verifier.get_user(&t).unwrap();
        assert_eq!(identity.id, sub);
        assert_eq!(identity.email.as_deref(), Some("parent@example.org"));
    }

    #[test]
    fn verifier_rejects_bad_tokens() {
        let verifier = SessionVerifier::new("secret");
        assert!(verifier.get_user(&token("other", "authenticated", 3600).1).is_none());
        assert!(verifier.get_user(&token("secret", "anon", 3600).1).is_none());
        assert!(verifier.get_user(&token("secret", "authenticated", -3600).1).is_none());
        assert!(verifier.get_user("not-a-jwt").is_none());
    }
}

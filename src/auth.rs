use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::User;
use crate::store::Store;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session_token";

/// What the identity provider hands back for a valid session id.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalSession {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    pub session_token: String,
}

/// External OAuth-exchange service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Trades a one-time session id for the user's profile and a session
    /// token. Every failure is an `Unauthorized`.
    async fn exchange(&self, session_id: &str) -> Result<ExternalSession, ApiError>;
}

pub struct HttpIdentityProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpIdentityProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

fn invalid_session_id() -> ApiError {
    ApiError::Unauthorized("Invalid session ID".to_string())
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange(&self, session_id: &str) -> Result<ExternalSession, ApiError> {
        let resp = self
            .client
            .get(&self.url)
            .header("X-Session-ID", session_id)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Identity provider unreachable");
                invalid_session_id()
            })?;

        if resp.status() != reqwest::StatusCode::OK {
            tracing::warn!(status = %resp.status(), "Identity provider rejected session id");
            return Err(invalid_session_id());
        }

        resp.json::<ExternalSession>().await.map_err(|e| {
            tracing::warn!(error = %e, "Identity provider returned an unreadable body");
            invalid_session_id()
        })
    }
}

/// Value of one cookie from the `Cookie` header(s).
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// The caller's credential: the session cookie, else the bearer header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, SESSION_COOKIE).or_else(|| bearer_token(headers))
}

pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{SESSION_COOKIE}={token}; Max-Age={max_age_secs}; Path=/; HttpOnly; Secure; SameSite=None"
    )
}

pub fn clear_session_cookie() -> String {
    session_cookie("", 0)
}

/// Resolves a session token to its user as of `now`.
pub fn authenticate(store: &Store, token: &str, now: DateTime<Utc>) -> Result<User, ApiError> {
    let session = store.find_active_session(token, now)?.ok_or_else(|| {
        tracing::debug!("Rejected unknown or expired session");
        ApiError::Unauthorized("Invalid or expired session".to_string())
    })?;

    store.get_user(&session.user_id)?.ok_or_else(|| {
        tracing::warn!(user_id = %session.user_id, "Session refers to a missing user");
        ApiError::Unauthorized("User not found".to_string())
    })
}

/// Extractor for handlers that require a logged-in caller.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;
        authenticate(&state.store, &token, Utc::now()).map(CurrentUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserSession;
    use axum::http::HeaderValue;
    use chrono::Duration;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_cookie_value_picks_named_cookie() {
        let map = headers(&[("cookie", "theme=dark; session_token=abc123; lang=en")]);
        assert_eq!(cookie_value(&map, "session_token").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&map, "missing"), None);
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(
            bearer_token(&headers(&[("authorization", "Bearer tok-1")])).as_deref(),
            Some("tok-1")
        );
        assert_eq!(
            bearer_token(&headers(&[("authorization", "bearer tok-2")])).as_deref(),
            Some("tok-2")
        );
        assert_eq!(bearer_token(&headers(&[("authorization", "Basic dXNlcg==")])), None);
        assert_eq!(bearer_token(&headers(&[("authorization", "Bearer ")])), None);
    }

    #[test]
    fn test_cookie_preferred_over_bearer() {
        let map = headers(&[
            ("cookie", "session_token=from-cookie"),
            ("authorization", "Bearer from-header"),
        ]);
        assert_eq!(session_token(&map).as_deref(), Some("from-cookie"));

        let map = headers(&[("authorization", "Bearer from-header")]);
        assert_eq!(session_token(&map).as_deref(), Some("from-header"));

        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc", 604800);
        assert!(cookie.starts_with("session_token=abc;"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.contains("Path=/"));

        assert!(clear_session_cookie().starts_with("session_token=;"));
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn test_authenticate_rejects_expired_and_orphaned_sessions() {
        let store = Store::open_in_memory().unwrap();
        let user = User::new("ada@example.com".into(), "Ada".into(), None);
        store.insert_user(&user).unwrap();

        let now = Utc::now();
        let expires_at = now + Duration::days(7);
        store
            .insert_session(&UserSession {
                user_id: user.id.clone(),
                session_token: "good".into(),
                expires_at,
                created_at: now,
            })
            .unwrap();
        store
            .insert_session(&UserSession {
                user_id: "ghost".into(),
                session_token: "orphan".into(),
                expires_at,
                created_at: now,
            })
            .unwrap();

        assert_eq!(authenticate(&store, "good", now).unwrap().id, user.id);
        assert!(matches!(
            authenticate(&store, "good", expires_at),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&store, "orphan", now),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&store, "unknown", now),
            Err(ApiError::Unauthorized(_))
        ));
    }
}

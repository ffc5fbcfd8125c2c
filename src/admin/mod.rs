mod handlers;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::{
    error::AppError,
    state::{AppState, SessionEntry},
};

/// Session cookie name.
const SESSION_COOKIE: &str = "cms_session";
/// Session lifetime (24 hours, sliding).
const SESSION_TTL: Duration = Duration::from_secs(24 * 3600);

// ── Credential verification ───────────────────────────────────────────────────

/// Credential checking sits behind this trait so a real credential store can
/// replace the static pair without touching the page store or the router.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// The shipped verifier: a single username/password pair from configuration.
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        username == self.username && password == self.password
    }
}

// ── Session gate ──────────────────────────────────────────────────────────────

/// Proof of authentication. Only `authenticate` mints one; admin handlers
/// take it by reference instead of consulting any global flag.
#[derive(Debug)]
pub struct AdminSession {
    pub username: String,
}

/// Validate the session cookie and slide its expiry. A single write lock
/// covers the check and the slide so a concurrent logout cannot race between
/// them.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AdminSession, AppError> {
    let token = session_cookie(headers).ok_or(AppError::Unauthorized)?;

    let mut sessions = state.sessions.write().await;
    match sessions.get(&token) {
        Some(entry) if entry.last_seen.elapsed() < SESSION_TTL => {
            let username = entry.username.clone();
            sessions.insert(
                token,
                SessionEntry {
                    username: username.clone(),
                    last_seen: Instant::now(),
                },
            );
            Ok(AdminSession { username })
        }
        Some(_) => {
            sessions.remove(&token);
            Err(AppError::Unauthorized)
        }
        None => Err(AppError::Unauthorized),
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The admin API is a single endpoint dispatching on the `action` query
/// parameter: reads and deletes arrive as GET with the filename in `page`,
/// login/save/create as POST with a JSON body.
pub fn router() -> Router<AppState> {
    Router::new().route("/admin-api", get(dispatch).post(dispatch))
}

#[derive(Deserialize, Default)]
pub struct ActionParams {
    #[serde(default)]
    action: String,
    #[serde(default)]
    page: String,
}

async fn dispatch(
    State(state): State<AppState>,
    Query(params): Query<ActionParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = match params.action.as_str() {
        "login" => handlers::login(&state, &body).await,
        action => {
            // Every action except login passes the session gate first.
            let session = match authenticate(&state, &headers).await {
                Ok(s) => s,
                Err(e) => return e.into_response(),
            };
            match action {
                "logout" => handlers::logout(&state, &headers).await,
                "list-pages" => handlers::list_pages(&state, &session).await,
                "load-page" => handlers::load_page(&state, &session, &params.page).await,
                "save-page" => handlers::save_page(&state, &session, &body).await,
                "create-page" => handlers::create_page(&state, &session, &body).await,
                "delete-page" => handlers::delete_page(&state, &session, &params.page).await,
                _ => Err(AppError::BadRequest("Invalid action".to_string())),
            }
        }
    };

    match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

// ── Cookie helpers ────────────────────────────────────────────────────────────

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie_str = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_str.split(';') {
        let part = part.trim();
        if let Some(val) = part.strip_prefix(&format!("{}=", SESSION_COOKIE)) {
            return Some(val.to_string());
        }
    }
    None
}

fn new_session_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn session_set_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        SESSION_COOKIE,
        token,
        SESSION_TTL.as_secs()
    )
}

fn session_clear_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0", SESSION_COOKIE)
}

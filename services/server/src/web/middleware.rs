//! services/server/src/web/middleware.rs
//!
//! Session middleware: attaches the visitor's session to every request and
//! guards the routes that need a logged-in user.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
    Extension,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::web::state::{AppState, CurrentSession};

pub const SESSION_COOKIE: &str = "session";

/// Reads the session id from the `Cookie` header, if present and well formed.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header
        .split(';')
        .find_map(|c| {
            let c = c.trim();
            c.strip_prefix(SESSION_COOKIE)?.strip_prefix('=')
        })
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

/// Middleware that resolves (or creates) the visitor's session.
///
/// The session is inserted into request extensions as `CurrentSession`. When a
/// new session had to be created, its cookie is set on the response.
pub async fn with_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Look up the session named by the cookie, or start a new one
    let resolved = state
        .sessions
        .resolve(session_id_from_headers(req.headers()))
        .await;

    // 2. Hand it to the handler
    req.extensions_mut().insert(CurrentSession(resolved.handle));
    let mut response = next.run(req).await;

    // 3. Point the browser at the new session
    if resolved.created {
        let cookie = format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/",
            SESSION_COOKIE, resolved.id
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Failed to build session cookie: {:?}", e),
        }
    }

    response
}

/// Middleware that rejects requests whose session is not logged in.
pub async fn require_login(
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !session.lock().await.is_authenticated() {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

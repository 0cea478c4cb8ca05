//! services/server/src/web/pages.rs
//!
//! HTML page handlers. `GET /` renders the session; every form post turns into
//! one `Action` on the session and redirects back to `/`.

use crate::web::state::{AppState, CurrentSession, SessionHandle};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, Redirect},
    Extension, Form,
};
use chatbot_core::controller::Action;
use chatbot_core::domain::Credentials;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

//=========================================================================================
// Form Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl From<CredentialsForm> for Credentials {
    fn from(form: CredentialsForm) -> Self {
        Credentials::new(form.username, form.password)
    }
}

#[derive(Deserialize, ToSchema)]
pub struct MessageForm {
    #[serde(default)]
    pub message: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET / - Login/signup tabs, or the chat page once logged in
pub async fn index_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Result<Html<String>, (StatusCode, String)> {
    let mut session = session.lock().await;
    let flash = session.take_flash();
    state
        .views
        .render_session(&session, flash.as_ref())
        .map(Html)
        .map_err(|e| {
            error!("Failed to render page: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page".to_string())
        })
}

/// POST /login - Check credentials and enter the chat
#[utoipa::path(
    post,
    path = "/login",
    request_body(content = CredentialsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Back to the page; it shows the chat or an error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Form(form): Form<CredentialsForm>,
) -> Redirect {
    dispatch(&state, &session, Action::Login(form.into())).await
}

/// POST /signup - Create an account
#[utoipa::path(
    post,
    path = "/signup",
    request_body(content = CredentialsForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Back to the page with a confirmation or an error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Form(form): Form<CredentialsForm>,
) -> Redirect {
    dispatch(&state, &session, Action::Signup(form.into())).await
}

/// POST /chat - Send a message to the model and record the exchange
#[utoipa::path(
    post,
    path = "/chat",
    request_body(content = MessageForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Back to the chat page with the reply or an error")
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Form(form): Form<MessageForm>,
) -> Redirect {
    dispatch(&state, &session, Action::SubmitMessage(form.message)).await
}

/// POST /logout - Leave the chat and return to the login page
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 303, description = "Back to the login page")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Redirect {
    dispatch(&state, &session, Action::Logout).await
}

/// Applies `action` while holding the session lock, then redirects to `/`.
async fn dispatch(state: &AppState, session: &SessionHandle, action: Action) -> Redirect {
    let mut session = session.lock().await;
    session.dispatch(action, &state.services).await;
    Redirect::to("/")
}

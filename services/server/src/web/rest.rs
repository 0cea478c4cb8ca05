//! services/server/src/web/rest.rs
//!
//! Contains the JSON endpoints and the master definition for the OpenAPI
//! specification, which also documents the HTML form endpoints.

use crate::web::pages::{CredentialsForm, MessageForm};
use crate::web::state::CurrentSession;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::pages::login_handler,
        crate::web::pages::signup_handler,
        crate::web::pages::chat_handler,
        crate::web::pages::logout_handler,
        transcript_handler,
        health_handler,
    ),
    components(
        schemas(CredentialsForm, MessageForm, TranscriptResponse, TranscriptLine)
    ),
    tags(
        (name = "Chatbot", description = "Login-protected chat with a hosted language model.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

/// One line of the transcript as shown on the chat page.
#[derive(Serialize, ToSchema)]
pub struct TranscriptLine {
    role: String,
    text: String,
}

/// The logged-in user's transcript and the most recent reply.
#[derive(Serialize, ToSchema)]
pub struct TranscriptResponse {
    username: String,
    entries: Vec<TranscriptLine>,
    last_response: Option<String>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// The session's in-memory transcript.
#[utoipa::path(
    get,
    path = "/api/transcript",
    responses(
        (status = 200, description = "Transcript of the logged-in user", body = TranscriptResponse),
        (status = 401, description = "The session is not logged in")
    )
)]
pub async fn transcript_handler(
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Result<Json<TranscriptResponse>, (StatusCode, String)> {
    let session = session.lock().await;
    let conversation = session
        .conversation()
        .ok_or((StatusCode::UNAUTHORIZED, "Not logged in".to_string()))?;

    Ok(Json(TranscriptResponse {
        username: conversation.username().to_string(),
        entries: conversation
            .transcript()
            .iter()
            .map(|entry| TranscriptLine {
                role: entry.role.label().to_string(),
                text: entry.text.clone(),
            })
            .collect(),
        last_response: conversation.last_response().map(str::to_string),
    }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "The server is up")
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

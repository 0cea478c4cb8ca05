//! crates/chatbot_core/src/controller.rs
//!
//! The per-visitor session state machine. A `Session` starts `Anonymous`,
//! becomes `Authenticated` after a successful login, and returns to `Anonymous`
//! on logout. Every user interaction is an `Action` applied through
//! `Session::dispatch`, which updates the state and leaves a `Flash` for the
//! next render.

use crate::chat::ChatClient;
use crate::domain::{ChatMessage, Credentials, Role, TranscriptEntry};
use crate::ports::{ChatModelService, CredentialStore, PortError, TranscriptStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The ports a session needs to carry out its actions.
#[derive(Clone)]
pub struct Services {
    pub credentials: Arc<dyn CredentialStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub model: Arc<dyn ChatModelService>,
}

/// A one-shot message shown on the next render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flash {
    Success(String),
    Error(String),
}

/// Everything a visitor can ask the session to do.
#[derive(Debug, Clone)]
pub enum Action {
    Login(Credentials),
    Signup(Credentials),
    SubmitMessage(String),
    Logout,
}

/// State held only while a user is logged in.
pub struct Conversation {
    username: String,
    transcript: Vec<TranscriptEntry>,
    last_response: Option<String>,
    draft: String,
    chat: ChatClient,
}

impl Conversation {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The in-memory mirror of the user's transcript, oldest first.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Text to prefill the input box with; kept after a failed submit.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn chat(&self) -> &ChatClient {
        &self.chat
    }
}

enum SessionState {
    Anonymous,
    Authenticated(Conversation),
}

pub struct Session {
    id: Uuid,
    state: SessionState,
    flash: Option<Flash>,
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

const NOT_AVAILABLE: &str = "That action is not available right now.";

impl Session {
    /// Creates a fresh anonymous session.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Anonymous,
            flash: None,
            created_at: now,
            last_seen_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        match &self.state {
            SessionState::Authenticated(conversation) => Some(conversation),
            SessionState::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    /// Removes the pending flash so it is shown only once.
    pub fn take_flash(&mut self) -> Option<Flash> {
        self.flash.take()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = now;
    }

    /// True once the session has gone unused for longer than `max_idle`.
    pub fn is_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> bool {
        now - self.last_seen_at > max_idle
    }

    /// Applies `action` and records the resulting flash, which is also returned.
    pub async fn dispatch(&mut self, action: Action, services: &Services) -> Option<Flash> {
        let flash = match (action, self.is_authenticated()) {
            (Action::Login(credentials), false) => match login(&credentials, services).await {
                Ok(conversation) => {
                    self.state = SessionState::Authenticated(conversation);
                    None
                }
                Err(flash) => Some(flash),
            },
            (Action::Signup(credentials), false) => Some(signup(&credentials, services).await),
            (Action::SubmitMessage(text), true) => match &mut self.state {
                SessionState::Authenticated(conversation) => {
                    submit_message(conversation, &text, services).await
                }
                SessionState::Anonymous => None,
            },
            (Action::Logout, true) => {
                if let SessionState::Authenticated(conversation) = &self.state {
                    info!("User '{}' logged out of session {}", conversation.username, self.id);
                }
                self.state = SessionState::Anonymous;
                Some(Flash::Success("Logged out.".to_string()))
            }
            (action, _) => {
                warn!("Ignoring {} for session {}", action_name(&action), self.id);
                Some(Flash::Error(NOT_AVAILABLE.to_string()))
            }
        };

        self.flash = flash.clone();
        flash
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::Login(_) => "login",
        Action::Signup(_) => "signup",
        Action::SubmitMessage(_) => "submit_message",
        Action::Logout => "logout",
    }
}

async fn login(credentials: &Credentials, services: &Services) -> Result<Conversation, Flash> {
    match services.credentials.authenticate(credentials).await {
        Ok(true) => {}
        Ok(false) => {
            info!("Rejected login for '{}'", credentials.username);
            return Err(Flash::Error("Invalid credentials.".to_string()));
        }
        Err(e) => {
            error!("Failed to check credentials: {:?}", e);
            return Err(Flash::Error(format!("Could not check your credentials: {}", e)));
        }
    }

    // History is loaded once, on entry; later turns are mirrored in memory.
    let transcript = services
        .transcripts
        .history(&credentials.username)
        .await
        .map_err(|e| {
            error!("Failed to load history for '{}': {:?}", credentials.username, e);
            Flash::Error(format!("Could not load your chat history: {}", e))
        })?;

    info!(
        "User '{}' logged in with {} transcript entries",
        credentials.username,
        transcript.len()
    );
    Ok(Conversation {
        username: credentials.username.clone(),
        transcript,
        last_response: None,
        draft: String::new(),
        chat: ChatClient::new(services.model.clone()),
    })
}

async fn signup(credentials: &Credentials, services: &Services) -> Flash {
    if credentials.username.trim().is_empty() || credentials.password.is_empty() {
        return Flash::Error("Username and password must not be empty.".to_string());
    }

    match services.credentials.register(credentials).await {
        Ok(()) => {
            info!("Created account '{}'", credentials.username);
            Flash::Success("Account created! Please log in.".to_string())
        }
        Err(PortError::AlreadyExists(_)) => Flash::Error("Username already exists.".to_string()),
        Err(e) => {
            error!("Failed to create account '{}': {:?}", credentials.username, e);
            Flash::Error(format!("Could not create your account: {}", e))
        }
    }
}

async fn submit_message(
    conversation: &mut Conversation,
    text: &str,
    services: &Services,
) -> Option<Flash> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let reply = match conversation.chat.send_and_collect(text).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Model call failed for '{}': {:?}", conversation.username, e);
            conversation.draft = text.to_string();
            return Some(Flash::Error(format!("The model could not answer: {}", e)));
        }
    };

    // The in-memory transcript only mirrors rows the store accepted.
    let user_row = ChatMessage::new(&conversation.username, Role::User, text);
    if let Err(e) = services.transcripts.append(&user_row).await {
        error!("Failed to save transcript row for '{}': {:?}", user_row.username, e);
        conversation.chat.forget_last_exchange().await;
        conversation.draft = text.to_string();
        return Some(not_saved(e));
    }
    conversation.transcript.push(user_row.into());
    conversation.last_response = Some(reply.clone());
    conversation.draft.clear();

    // No transaction spans the pair: a failure on the bot row keeps the user row.
    let bot_row = ChatMessage::new(&conversation.username, Role::Bot, reply);
    if let Err(e) = services.transcripts.append(&bot_row).await {
        error!("Failed to save transcript row for '{}': {:?}", bot_row.username, e);
        conversation.chat.forget_last_exchange().await;
        return Some(not_saved(e));
    }
    conversation.transcript.push(bot_row.into());

    None
}

fn not_saved(e: PortError) -> Flash {
    Flash::Error(format!("Your conversation could not be saved: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ChunkStream, PortResult};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        users: Mutex<Vec<Credentials>>,
        rows: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn register(&self, credentials: &Credentials) -> PortResult<()> {
            let mut users = self.users.lock().await;
            if users.iter().any(|u| u.username == credentials.username) {
                return Err(PortError::AlreadyExists(credentials.username.clone()));
            }
            users.push(credentials.clone());
            Ok(())
        }

        async fn authenticate(&self, credentials: &Credentials) -> PortResult<bool> {
            Ok(self.users.lock().await.iter().any(|u| u == credentials))
        }
    }

    #[async_trait]
    impl TranscriptStore for MemoryStore {
        async fn append(&self, message: &ChatMessage) -> PortResult<()> {
            self.rows.lock().await.push(message.clone());
            Ok(())
        }

        async fn history(&self, username: &str) -> PortResult<Vec<TranscriptEntry>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .filter(|row| row.username == username)
                .cloned()
                .map(TranscriptEntry::from)
                .collect())
        }
    }

    struct StubModel {
        chunks: Vec<PortResult<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModelService for StubModel {
        async fn stream_reply(
            &self,
            _context: &[TranscriptEntry],
            _message: &str,
        ) -> PortResult<ChunkStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(stream::iter(self.chunks.clone())))
        }
    }

    fn fixture(chunks: Vec<PortResult<String>>) -> (Services, Arc<MemoryStore>, Arc<StubModel>) {
        let store = Arc::new(MemoryStore::default());
        let model = Arc::new(StubModel {
            chunks,
            calls: AtomicUsize::new(0),
        });
        let services = Services {
            credentials: store.clone(),
            transcripts: store.clone(),
            model: model.clone(),
        };
        (services, store, model)
    }

    /// Fails every credential call, as a locked or missing database would.
    struct UnreachableCredentials;

    #[async_trait]
    impl CredentialStore for UnreachableCredentials {
        async fn register(&self, _credentials: &Credentials) -> PortResult<()> {
            Err(PortError::Unexpected("database is locked".to_string()))
        }

        async fn authenticate(&self, _credentials: &Credentials) -> PortResult<bool> {
            Err(PortError::Unexpected("database is locked".to_string()))
        }
    }

    /// Accepts the first `accept` appends and fails the rest.
    struct FailingTranscripts {
        accept: usize,
        fail_history: bool,
        rows: Mutex<Vec<ChatMessage>>,
    }

    impl FailingTranscripts {
        fn new(accept: usize, fail_history: bool) -> Self {
            Self {
                accept,
                fail_history,
                rows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TranscriptStore for FailingTranscripts {
        async fn append(&self, message: &ChatMessage) -> PortResult<()> {
            let mut rows = self.rows.lock().await;
            if rows.len() >= self.accept {
                return Err(PortError::Unexpected("disk full".to_string()));
            }
            rows.push(message.clone());
            Ok(())
        }

        async fn history(&self, _username: &str) -> PortResult<Vec<TranscriptEntry>> {
            if self.fail_history {
                return Err(PortError::Unexpected("no such table".to_string()));
            }
            Ok(self.rows.lock().await.iter().cloned().map(TranscriptEntry::from).collect())
        }
    }

    /// Real credentials backed by memory, with `transcripts` swapped in.
    fn with_transcripts(transcripts: Arc<FailingTranscripts>) -> (Services, Arc<StubModel>) {
        let (mut services, _, model) = fixture(hi_there());
        services.transcripts = transcripts;
        (services, model)
    }

    fn hi_there() -> Vec<PortResult<String>> {
        vec![Ok("Hi".to_string()), Ok(" there".to_string())]
    }

    async fn logged_in(services: &Services) -> Session {
        let mut session = Session::new();
        session
            .dispatch(Action::Signup(Credentials::new("alice", "pw1")), services)
            .await;
        session
            .dispatch(Action::Login(Credentials::new("alice", "pw1")), services)
            .await;
        assert!(session.is_authenticated());
        session
    }

    #[tokio::test]
    async fn signup_login_and_chat() {
        let (services, store, model) = fixture(hi_there());
        let mut session = Session::new();

        let flash = session
            .dispatch(Action::Signup(Credentials::new("alice", "pw1")), &services)
            .await;
        assert_eq!(
            flash,
            Some(Flash::Success("Account created! Please log in.".to_string()))
        );
        assert!(!session.is_authenticated());

        let flash = session
            .dispatch(Action::Login(Credentials::new("alice", "pw1")), &services)
            .await;
        assert_eq!(flash, None);

        session
            .dispatch(Action::SubmitMessage("hello".to_string()), &services)
            .await;

        let conversation = session.conversation().unwrap();
        assert_eq!(conversation.username(), "alice");
        assert_eq!(conversation.last_response(), Some("Hi there"));
        assert_eq!(
            conversation.transcript(),
            &[
                TranscriptEntry::new(Role::User, "hello"),
                TranscriptEntry::new(Role::Bot, "Hi there"),
            ]
        );
        assert_eq!(
            *store.rows.lock().await,
            vec![
                ChatMessage::new("alice", Role::User, "hello"),
                ChatMessage::new("alice", Role::Bot, "Hi there"),
            ]
        );
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_signup_reports_existing_username() {
        let (services, _, _) = fixture(hi_there());
        let mut session = Session::new();

        session
            .dispatch(Action::Signup(Credentials::new("bob", "one")), &services)
            .await;
        let flash = session
            .dispatch(Action::Signup(Credentials::new("bob", "two")), &services)
            .await;
        assert_eq!(flash, Some(Flash::Error("Username already exists.".to_string())));
    }

    #[tokio::test]
    async fn signup_rejects_empty_fields() {
        let (services, store, _) = fixture(hi_there());
        let mut session = Session::new();

        for (username, password) in [("", "pw"), ("   ", "pw"), ("bob", "")] {
            let flash = session
                .dispatch(Action::Signup(Credentials::new(username, password)), &services)
                .await;
            assert_eq!(
                flash,
                Some(Flash::Error("Username and password must not be empty.".to_string()))
            );
        }
        assert!(store.users.lock().await.is_empty());
    }

    #[tokio::test]
    async fn signup_storage_failure_is_not_a_duplicate() {
        let (mut services, _, _) = fixture(hi_there());
        services.credentials = Arc::new(UnreachableCredentials);
        let mut session = Session::new();

        let flash = session
            .dispatch(Action::Signup(Credentials::new("bob", "pw")), &services)
            .await;
        match flash {
            Some(Flash::Error(msg)) => {
                assert!(msg.starts_with("Could not create your account:"));
                assert!(msg.contains("database is locked"));
                assert_ne!(msg, "Username already exists.");
            }
            other => panic!("unexpected flash: {:?}", other),
        }
    }

    #[tokio::test]
    async fn login_reports_credential_check_failure() {
        let (mut services, _, _) = fixture(hi_there());
        services.credentials = Arc::new(UnreachableCredentials);
        let mut session = Session::new();

        let flash = session
            .dispatch(Action::Login(Credentials::new("alice", "pw1")), &services)
            .await;
        assert!(
            matches!(flash, Some(Flash::Error(msg)) if msg.starts_with("Could not check your credentials:"))
        );
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn login_stays_anonymous_when_history_fails() {
        let transcripts = Arc::new(FailingTranscripts::new(usize::MAX, true));
        let (services, _) = with_transcripts(transcripts);
        let mut session = Session::new();
        session
            .dispatch(Action::Signup(Credentials::new("alice", "pw1")), &services)
            .await;

        let flash = session
            .dispatch(Action::Login(Credentials::new("alice", "pw1")), &services)
            .await;
        assert!(
            matches!(flash, Some(Flash::Error(msg)) if msg.starts_with("Could not load your chat history:"))
        );
        assert!(!session.is_authenticated());
        assert!(session.conversation().is_none());
    }

    #[tokio::test]
    async fn unsaved_message_leaves_no_trace() {
        let transcripts = Arc::new(FailingTranscripts::new(0, false));
        let (services, model) = with_transcripts(transcripts.clone());
        let mut session = logged_in(&services).await;

        let flash = session
            .dispatch(Action::SubmitMessage("hello".to_string()), &services)
            .await;
        assert!(
            matches!(flash, Some(Flash::Error(msg)) if msg.starts_with("Your conversation could not be saved:") && msg.contains("disk full"))
        );

        let conversation = session.conversation().unwrap();
        assert!(conversation.transcript().is_empty());
        assert_eq!(conversation.last_response(), None);
        assert_eq!(conversation.draft(), "hello");
        assert!(conversation.chat().context().await.is_empty());
        assert!(transcripts.rows.lock().await.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsaved_reply_keeps_only_the_saved_row() {
        let transcripts = Arc::new(FailingTranscripts::new(1, false));
        let (services, _) = with_transcripts(transcripts.clone());
        let mut session = logged_in(&services).await;

        let flash = session
            .dispatch(Action::SubmitMessage("hello".to_string()), &services)
            .await;
        assert!(matches!(flash, Some(Flash::Error(_))));

        let conversation = session.conversation().unwrap();
        assert_eq!(
            conversation.transcript(),
            &[TranscriptEntry::new(Role::User, "hello")]
        );
        assert_eq!(conversation.last_response(), Some("Hi there"));
        assert_eq!(conversation.draft(), "");
        assert!(conversation.chat().context().await.is_empty());
        assert_eq!(
            *transcripts.rows.lock().await,
            vec![ChatMessage::new("alice", Role::User, "hello")]
        );
    }

    #[tokio::test]
    async fn wrong_password_stays_anonymous() {
        let (services, store, _) = fixture(hi_there());
        let mut session = Session::new();
        session
            .dispatch(Action::Signup(Credentials::new("alice", "pw1")), &services)
            .await;

        let flash = session
            .dispatch(Action::Login(Credentials::new("alice", "PW1")), &services)
            .await;
        assert_eq!(flash, Some(Flash::Error("Invalid credentials.".to_string())));
        assert!(!session.is_authenticated());
        assert!(session.conversation().is_none());
        assert!(store.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn whitespace_message_is_ignored() {
        let (services, store, model) = fixture(hi_there());
        let mut session = logged_in(&services).await;

        let flash = session
            .dispatch(Action::SubmitMessage("  ".to_string()), &services)
            .await;
        assert_eq!(flash, None);
        assert!(store.rows.lock().await.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(session.conversation().unwrap().transcript().is_empty());
    }

    #[tokio::test]
    async fn model_failure_keeps_session_and_draft() {
        let (services, store, _) = fixture(vec![Err(PortError::Unexpected(
            "quota exceeded".to_string(),
        ))]);
        let mut session = logged_in(&services).await;

        let flash = session
            .dispatch(Action::SubmitMessage("hello".to_string()), &services)
            .await;
        assert!(matches!(flash, Some(Flash::Error(msg)) if msg.contains("quota exceeded")));

        let conversation = session.conversation().unwrap();
        assert_eq!(conversation.draft(), "hello");
        assert!(conversation.transcript().is_empty());
        assert!(store.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn login_loads_history_once() {
        let (services, store, _) = fixture(hi_there());
        store
            .append(&ChatMessage::new("alice", Role::User, "earlier"))
            .await
            .unwrap();
        store
            .append(&ChatMessage::new("alice", Role::Bot, "reply"))
            .await
            .unwrap();

        let session = logged_in(&services).await;
        let conversation = session.conversation().unwrap();
        assert_eq!(conversation.transcript().len(), 2);
        assert_eq!(conversation.transcript()[0].text, "earlier");
        // The model starts without memory of the loaded history.
        assert!(conversation.chat().context().await.is_empty());
    }

    #[tokio::test]
    async fn logout_returns_to_anonymous() {
        let (services, _, _) = fixture(hi_there());
        let mut session = logged_in(&services).await;

        let flash = session.dispatch(Action::Logout, &services).await;
        assert_eq!(flash, Some(Flash::Success("Logged out.".to_string())));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn actions_outside_their_phase_are_rejected() {
        let (services, _, model) = fixture(hi_there());
        let mut session = Session::new();

        let flash = session
            .dispatch(Action::SubmitMessage("hello".to_string()), &services)
            .await;
        assert_eq!(flash, Some(Flash::Error(NOT_AVAILABLE.to_string())));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn idle_sessions_expire() {
        let mut session = Session::new();
        let start = session.created_at();
        session.touch(start);
        assert!(!session.is_idle(start + Duration::minutes(5), Duration::minutes(10)));
        assert!(session.is_idle(start + Duration::minutes(11), Duration::minutes(10)));
    }

    #[test]
    fn take_flash_clears_it() {
        let mut session = Session::new();
        session.flash = Some(Flash::Error("x".to_string()));
        assert!(session.take_flash().is_some());
        assert!(session.flash.is_none());
    }
}

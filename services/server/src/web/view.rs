//! services/server/src/web/view.rs
//!
//! Renders the HTML pages from session state. Templates are compiled into the
//! binary and auto-escaped, so transcript text is always shown verbatim.

use chatbot_core::controller::{Flash, Session};
use chatbot_core::domain::{Role, TranscriptEntry};
use minijinja::{context, Environment};
use serde::Serialize;

pub struct Views {
    env: Environment<'static>,
}

#[derive(Serialize)]
struct FlashView {
    kind: &'static str,
    message: String,
}

impl From<&Flash> for FlashView {
    fn from(flash: &Flash) -> Self {
        match flash {
            Flash::Success(message) => Self {
                kind: "success",
                message: message.clone(),
            },
            Flash::Error(message) => Self {
                kind: "error",
                message: message.clone(),
            },
        }
    }
}

#[derive(Serialize)]
struct EntryView<'a> {
    marker: &'static str,
    role: &'static str,
    text: &'a str,
}

impl<'a> From<&'a TranscriptEntry> for EntryView<'a> {
    fn from(entry: &'a TranscriptEntry) -> Self {
        Self {
            marker: role_marker(entry.role),
            role: entry.role.label(),
            text: &entry.text,
        }
    }
}

fn role_marker(role: Role) -> &'static str {
    match role {
        Role::User => "🧑",
        Role::Bot => "🤖",
    }
}

/// Everything the chat page shows.
pub struct ChatPage<'a> {
    pub username: &'a str,
    pub draft: &'a str,
    pub last_response: Option<&'a str>,
    pub entries: &'a [TranscriptEntry],
}

impl Views {
    /// Compiles the built-in templates.
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("layout.html", include_str!("../../templates/layout.html"))?;
        env.add_template("login.html", include_str!("../../templates/login.html"))?;
        env.add_template("chat.html", include_str!("../../templates/chat.html"))?;
        Ok(Self { env })
    }

    /// The page for the session's current state.
    pub fn render_session(
        &self,
        session: &Session,
        flash: Option<&Flash>,
    ) -> Result<String, minijinja::Error> {
        match session.conversation() {
            None => self.render_login(flash),
            Some(conversation) => self.render_chat(
                &ChatPage {
                    username: conversation.username(),
                    draft: conversation.draft(),
                    last_response: conversation.last_response(),
                    entries: conversation.transcript(),
                },
                flash,
            ),
        }
    }

    pub fn render_login(&self, flash: Option<&Flash>) -> Result<String, minijinja::Error> {
        self.env.get_template("login.html")?.render(context! {
            flash => flash.map(FlashView::from),
        })
    }

    pub fn render_chat(
        &self,
        page: &ChatPage<'_>,
        flash: Option<&Flash>,
    ) -> Result<String, minijinja::Error> {
        let entries: Vec<EntryView<'_>> = page.entries.iter().map(EntryView::from).collect();
        self.env.get_template("chat.html")?.render(context! {
            flash => flash.map(FlashView::from),
            username => page.username,
            draft => page.draft,
            last_response => page.last_response,
            entries => entries,
        })
    }
}

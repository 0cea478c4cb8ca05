//! crates/chatbot_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or rendering format.

use std::fmt;
use std::str::FromStr;

// Only used internally for signup/login - contains the plaintext password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Who authored a line of the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Bot,
}

impl Role {
    /// The label stored in `chat_history.role` and shown next to each entry.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Bot => "Bot",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "You" | "User" | "user" => Ok(Role::User),
            "Bot" | "bot" => Ok(Role::Bot),
            other => Err(format!("unknown transcript role '{}'", other)),
        }
    }
}

/// A single persisted row of a user's transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn new(username: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role,
            text: text.into(),
        }
    }
}

/// One `(role, text)` line as held in a session's in-memory transcript
/// and in the conversation context sent to the remote model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
}

impl TranscriptEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

impl From<ChatMessage> for TranscriptEntry {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role,
            text: message.text,
        }
    }
}

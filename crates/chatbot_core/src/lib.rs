pub mod chat;
pub mod controller;
pub mod domain;
pub mod ports;

pub use chat::ChatClient;
pub use controller::{Action, Conversation, Flash, Services, Session};
pub use domain::{ChatMessage, Credentials, Role, TranscriptEntry};
pub use ports::{
    ChatModelService, ChunkStream, CredentialStore, PortError, PortResult, TranscriptStore,
};

//! crates/chatbot_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store and the remote model API.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::domain::{ChatMessage, Credentials, TranscriptEntry};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item already exists: {0}")]
    AlreadyExists(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// The incremental text fragments of one model reply, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Inserts a new user. Fails with `AlreadyExists` when the username is taken.
    async fn register(&self, credentials: &Credentials) -> PortResult<()>;

    /// True iff a stored row matches both username and password exactly.
    async fn authenticate(&self, credentials: &Credentials) -> PortResult<bool>;
}

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Appends one row, committed immediately.
    async fn append(&self, message: &ChatMessage) -> PortResult<()>;

    /// Every row for `username`, oldest first.
    async fn history(&self, username: &str) -> PortResult<Vec<TranscriptEntry>>;
}

#[async_trait]
pub trait ChatModelService: Send + Sync {
    /// Sends `message` to the remote model, conditioned on the prior `context`
    /// turns, and streams the reply back as it is generated.
    async fn stream_reply(
        &self,
        context: &[TranscriptEntry],
        message: &str,
    ) -> PortResult<ChunkStream>;
}

//! crates/chatbot_core/src/chat.rs
//!
//! The stateful chat client. It owns the conversation context sent to the
//! remote model and grows it by one user/bot pair per completed reply.

use crate::domain::{Role, TranscriptEntry};
use crate::ports::{ChatModelService, ChunkStream, PortResult};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct ChatClient {
    model: Arc<dyn ChatModelService>,
    context: Arc<Mutex<Vec<TranscriptEntry>>>,
}

impl ChatClient {
    /// Creates a client with an empty conversation context.
    pub fn new(model: Arc<dyn ChatModelService>) -> Self {
        Self {
            model,
            context: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A copy of the turns the model will be conditioned on for the next message.
    pub async fn context(&self) -> Vec<TranscriptEntry> {
        self.context.lock().await.clone()
    }

    /// Sends `message` and returns the reply fragments in arrival order.
    ///
    /// The context only grows once the returned stream has been driven to the end
    /// without error; a failed call leaves it exactly as it was.
    pub async fn send(&self, message: &str) -> PortResult<ChunkStream> {
        let snapshot = self.context.lock().await.clone();
        let mut upstream = self.model.stream_reply(&snapshot, message).await?;

        let context = self.context.clone();
        let message = message.to_string();
        let stream = async_stream::stream! {
            let mut reply = String::new();
            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(text) => {
                        reply.push_str(&text);
                        yield Ok(text);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            let mut turns = context.lock().await;
            turns.push(TranscriptEntry::new(Role::User, message));
            turns.push(TranscriptEntry::new(Role::Bot, reply));
        };

        Ok(Box::pin(stream))
    }

    /// Drops the most recent user/bot pair, if any, so the next message is sent
    /// as though that exchange never happened.
    pub async fn forget_last_exchange(&self) {
        let mut turns = self.context.lock().await;
        let keep = turns.len().saturating_sub(2);
        turns.truncate(keep);
    }

    /// Sends `message` and concatenates every fragment into the full reply.
    pub async fn send_and_collect(&self, message: &str) -> PortResult<String> {
        let mut stream = self.send(message).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            reply.push_str(&chunk?);
        }
        Ok(reply)
    }
}

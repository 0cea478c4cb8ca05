//! services/server/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `CredentialStore` and `TranscriptStore` ports from the `core` crate. It
//! handles all interactions with the SQLite database using `sqlx`.

use async_trait::async_trait;
use chatbot_core::domain::{ChatMessage, Credentials, Role, TranscriptEntry};
use chatbot_core::ports::{CredentialStore, PortError, PortResult, TranscriptStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the credential and transcript ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the database at `database_url`, creating the file if it does not exist.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// A single-connection in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        // Every connection to `:memory:` is its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct HistoryRecord {
    role: String,
    message: String,
}
impl HistoryRecord {
    fn to_domain(self) -> PortResult<TranscriptEntry> {
        let role = Role::from_str(&self.role).map_err(PortError::Unexpected)?;
        Ok(TranscriptEntry::new(role, self.message))
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl CredentialStore for DbAdapter {
    async fn register(&self, credentials: &Credentials) -> PortResult<()> {
        sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(&credentials.username)
            .bind(&credentials.password)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    PortError::AlreadyExists(format!("User {}", credentials.username))
                }
                _ => PortError::Unexpected(e.to_string()),
            })?;
        Ok(())
    }

    async fn authenticate(&self, credentials: &Credentials) -> PortResult<bool> {
        let matched: Option<(String,)> =
            sqlx::query_as("SELECT username FROM users WHERE username = ? AND password = ?")
                .bind(&credentials.username)
                .bind(&credentials.password)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(matched.is_some())
    }
}

#[async_trait]
impl TranscriptStore for DbAdapter {
    async fn append(&self, message: &ChatMessage) -> PortResult<()> {
        sqlx::query("INSERT INTO chat_history (username, role, message) VALUES (?, ?, ?)")
            .bind(&message.username)
            .bind(message.role.label())
            .bind(&message.text)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn history(&self, username: &str) -> PortResult<Vec<TranscriptEntry>> {
        let records = sqlx::query_as::<_, HistoryRecord>(
            "SELECT role, message FROM chat_history WHERE username = ? ORDER BY rowid ASC",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(HistoryRecord::to_domain).collect()
    }
}

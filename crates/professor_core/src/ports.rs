//! crates/professor_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the AI backend, the storage engine and the identity provider.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::auth::{IdentitySubscription, SignInError, SignInRequest};
use crate::domain::{AnalysisResult, AuthSession, User, UserCredentials};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// An ordered sequence of text fragments making up one streamed reply.
pub type ChunkStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait ContentAnalysisService: Send + Sync {
    /// Sends the content to the AI backend and returns its raw JSON answer.
    /// Errors carry the backend's message untouched so it can be classified.
    async fn analyze_content(&self, content_text: &str) -> PortResult<String>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Creates a fresh conversation context with no memory of earlier turns.
    async fn start_chat(&self) -> PortResult<Box<dyn ChatContext>>;
}

/// One live conversation with the tutor. Dropping it tears the context down.
#[async_trait]
pub trait ChatContext: Send {
    async fn send_message_stream(&mut self, message: &str) -> PortResult<ChunkStream>;
}

/// Durable string storage. Values are always written whole.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    // --- Accounts ---
    async fn create_account(
        &self,
        name: Option<&str>,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, uid: &str) -> PortResult<User>;

    // --- Auth Sessions ---
    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()>;

    /// Returns the uid owning the session if it exists and has not expired at `now`.
    async fn validate_auth_session(&self, session_id: &str, now: i64) -> PortResult<String>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves whoever is already signed in (persisted session, guest, or nobody).
    async fn restore(&self) -> PortResult<Option<User>>;

    async fn sign_in(&self, request: SignInRequest) -> Result<User, SignInError>;

    async fn sign_out(&self) -> PortResult<()>;

    /// Identity changes, starting from the next change after subscribing.
    fn subscribe(&self) -> IdentitySubscription;

    /// Whether an explicit sign-out makes sense for this provider.
    fn allows_sign_out(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait DocumentExporter: Send + Sync {
    /// Produces a downloadable study guide and returns where it was written.
    async fn export(&self, result: &AnalysisResult) -> PortResult<String>;
}

/// Source of creation timestamps (ms since the Unix epoch).
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

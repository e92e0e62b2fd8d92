//! Persistence seam (spec §5, §6): trait-based repositories so the
//! orchestration core never depends on a concrete store. Credential
//! decryption is mediated by `Cipher`; the cipher mechanism itself is out of
//! scope (spec §1 Non-goals) but the shape is modeled so callers can plug
//! one in.

mod memory_impl;

pub use memory_impl::InMemoryStore;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::types::{Context, Conversation, Message, OAuthToken, ScheduledJob, ToolPermission, UserCredential};

#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Context>, AgentError>;
    async fn put(&self, context: Context) -> Result<(), AgentError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Conversation>, AgentError>;
    async fn put(&self, conversation: Conversation) -> Result<(), AgentError>;
    /// Finds an existing conversation for a (context, platform, external_id)
    /// triple, used to avoid duplicate conversations on redelivered webhooks.
    async fn find_by_external_id(&self, context_id: &str, platform: &str, external_id: &str) -> Result<Option<Conversation>, AgentError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: Message) -> Result<(), AgentError>;
    async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>, AgentError>;
}

#[async_trait]
pub trait ToolPermissionStore: Send + Sync {
    async fn for_context(&self, context_id: &str) -> Result<Vec<ToolPermission>, AgentError>;
}

#[async_trait]
pub trait OAuthTokenStore: Send + Sync {
    async fn get(&self, context_id: &str, provider: &str) -> Result<Option<OAuthToken>, AgentError>;
    async fn put(&self, token: OAuthToken) -> Result<(), AgentError>;
}

#[async_trait]
pub trait UserCredentialStore: Send + Sync {
    async fn get(&self, context_id: &str, user_id: &str, credential_type: &str) -> Result<Option<UserCredential>, AgentError>;
    async fn put(&self, credential: UserCredential) -> Result<(), AgentError>;
}

#[async_trait]
pub trait ScheduledJobStore: Send + Sync {
    async fn for_context(&self, context_id: &str) -> Result<Vec<ScheduledJob>, AgentError>;
    async fn put(&self, job: ScheduledJob) -> Result<(), AgentError>;
}

/// Decrypts credential ciphertext produced by some external encryption
/// mechanism (spec §1 Non-goals: this core never implements crypto).
#[async_trait]
pub trait Cipher: Send + Sync {
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<String, AgentError>;
    async fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, AgentError>;
}

/// A cipher that refuses every call. Wired in by default so a deployment
/// that forgets to configure real credential encryption fails loudly rather
/// than silently persisting plaintext.
pub struct NullCipher;

#[async_trait]
impl Cipher for NullCipher {
    async fn decrypt(&self, _ciphertext: &[u8]) -> Result<String, AgentError> {
        Err(AgentError::new(
            crate::error::ErrorKind::CredentialDecryptFailed,
            "no credential cipher is configured",
        ))
    }

    async fn encrypt(&self, _plaintext: &str) -> Result<Vec<u8>, AgentError> {
        Err(AgentError::new(
            crate::error::ErrorKind::CredentialDecryptFailed,
            "no credential cipher is configured",
        ))
    }
}

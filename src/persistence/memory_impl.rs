//! In-memory repository implementations for tests and single-node
//! deployments. Not the durability layer an at-scale deployment would use;
//! grounded on the shape of the trait set above, not on any specific store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    ContextStore, ConversationStore, MessageStore, OAuthTokenStore, ScheduledJobStore, ToolPermissionStore, UserCredentialStore,
};
use crate::error::AgentError;
use crate::types::{Context, Conversation, Message, OAuthToken, ScheduledJob, ToolPermission, UserCredential};

#[derive(Default)]
pub struct InMemoryStore {
    contexts: Mutex<HashMap<String, Context>>,
    conversations: Mutex<HashMap<String, Conversation>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    permissions: Mutex<HashMap<String, Vec<ToolPermission>>>,
    tokens: Mutex<HashMap<(String, String), OAuthToken>>,
    jobs: Mutex<HashMap<String, Vec<ScheduledJob>>>,
    credentials: Mutex<HashMap<(String, String, String), UserCredential>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_permissions(&self, context_id: impl Into<String>, permissions: Vec<ToolPermission>) {
        self.permissions.lock().unwrap().insert(context_id.into(), permissions);
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Context>, AgentError> {
        Ok(self.contexts.lock().unwrap().get(id).cloned())
    }

    async fn put(&self, context: Context) -> Result<(), AgentError> {
        self.contexts.lock().unwrap().insert(context.id.clone(), context);
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Conversation>, AgentError> {
        Ok(self.conversations.lock().unwrap().get(id).cloned())
    }

    async fn put(&self, conversation: Conversation) -> Result<(), AgentError> {
        self.conversations.lock().unwrap().insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn find_by_external_id(&self, context_id: &str, platform: &str, external_id: &str) -> Result<Option<Conversation>, AgentError> {
        let found = self
            .conversations
            .lock()
            .unwrap()
            .values()
            .find(|c| {
                c.context_id == context_id
                    && c.platform == platform
                    && c.external_id.as_deref() == Some(external_id)
            })
            .cloned();
        Ok(found)
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append(&self, message: Message) -> Result<(), AgentError> {
        self.messages
            .lock()
            .unwrap()
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn recent(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>, AgentError> {
        let messages = self.messages.lock().unwrap();
        let Some(all) = messages.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }
}

#[async_trait]
impl ToolPermissionStore for InMemoryStore {
    async fn for_context(&self, context_id: &str) -> Result<Vec<ToolPermission>, AgentError> {
        Ok(self.permissions.lock().unwrap().get(context_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl OAuthTokenStore for InMemoryStore {
    async fn get(&self, context_id: &str, provider: &str) -> Result<Option<OAuthToken>, AgentError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(&(context_id.to_string(), provider.to_string()))
            .cloned())
    }

    async fn put(&self, token: OAuthToken) -> Result<(), AgentError> {
        self.tokens
            .lock()
            .unwrap()
            .insert((token.context_id.clone(), token.provider.clone()), token);
        Ok(())
    }
}

#[async_trait]
impl ScheduledJobStore for InMemoryStore {
    async fn for_context(&self, context_id: &str) -> Result<Vec<ScheduledJob>, AgentError> {
        Ok(self.jobs.lock().unwrap().get(context_id).cloned().unwrap_or_default())
    }

    async fn put(&self, job: ScheduledJob) -> Result<(), AgentError> {
        let mut jobs = self.jobs.lock().unwrap();
        let entry = jobs.entry(job.context_id.clone()).or_default();
        if let Some(existing) = entry.iter_mut().find(|j| j.name == job.name) {
            *existing = job;
        } else {
            entry.push(job);
        }
        Ok(())
    }
}

#[async_trait]
impl UserCredentialStore for InMemoryStore {
    async fn get(&self, context_id: &str, user_id: &str, credential_type: &str) -> Result<Option<UserCredential>, AgentError> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .get(&(context_id.to_string(), user_id.to_string(), credential_type.to_string()))
            .cloned())
    }

    async fn put(&self, credential: UserCredential) -> Result<(), AgentError> {
        self.credentials.lock().unwrap().insert(
            (credential.context_id.clone(), credential.user_id.clone(), credential.credential_type.clone()),
            credential,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_conversation_by_external_id() {
        let store = InMemoryStore::new();
        let mut conv = Conversation::new("ctx-1", "slack");
        conv.external_id = Some("ext-1".to_string());
        ConversationStore::put(&store, conv.clone()).await.unwrap();

        let found = store.find_by_external_id("ctx-1", "slack", "ext-1").await.unwrap();
        assert_eq!(found.unwrap().id, conv.id);
    }

    #[tokio::test]
    async fn user_credential_round_trips_by_type() {
        let store = InMemoryStore::new();
        let credential = UserCredential {
            context_id: "ctx-1".to_string(),
            user_id: "user-1".to_string(),
            credential_type: "api_key".to_string(),
            encrypted_value: vec![1, 2, 3],
            created_at: chrono::Utc::now(),
        };
        UserCredentialStore::put(&store, credential.clone()).await.unwrap();

        let found = UserCredentialStore::get(&store, "ctx-1", "user-1", "api_key").await.unwrap();
        assert_eq!(found.unwrap().encrypted_value, vec![1, 2, 3]);
        assert!(UserCredentialStore::get(&store, "ctx-1", "user-1", "oauth").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn message_recent_respects_limit() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.append(Message::user("conv-1", format!("msg {i}"))).await.unwrap();
        }
        let recent = store.recent("conv-1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content, "msg 4");
    }
}

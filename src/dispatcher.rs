//! Dispatcher (spec §4.11): the externally-facing entry point. Resolves or
//! creates the conversation, checks the caller's tenant access, merges
//! request metadata, and hands the request to an `Orchestrator`.

use std::sync::Arc;

use crate::error::{AgentError, ErrorKind};
use crate::orchestrator::{Event, Orchestrator};
use crate::persistence::{ConversationStore, MessageStore};
use crate::tools::Ambient;
use crate::types::{AgentRequest, Context, Conversation, Message};

pub struct Dispatcher {
    orchestrator: Orchestrator,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
}

impl Dispatcher {
    pub fn new(
        orchestrator: Orchestrator,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            orchestrator,
            conversations,
            messages,
        }
    }

    /// Resolves the conversation this request belongs to, creating one on
    /// first contact from a given (platform, external_id) pair.
    async fn resolve_conversation(&self, context: &Context, platform: &str, request: &AgentRequest) -> Result<Conversation, AgentError> {
        if let Some(existing) = self.conversations.get(&request.conversation_id).await? {
            return Ok(existing);
        }
        if let Some(external_id) = request.metadata.get("external_id").and_then(|v| v.as_str()) {
            if let Some(existing) = self
                .conversations
                .find_by_external_id(&context.id, platform, external_id)
                .await?
            {
                return Ok(existing);
            }
        }
        let mut conversation = Conversation::new(&context.id, platform);
        conversation.external_id = request
            .metadata
            .get("external_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        self.conversations.put(conversation.clone()).await?;
        Ok(conversation)
    }

    /// Streams one request through the system, enforcing that the
    /// conversation the caller named actually belongs to their context
    /// (§4.11 "per-tenant access checks").
    pub async fn dispatch(&self, context: &Context, platform: &str, request: AgentRequest) -> Vec<Event> {
        let mut conversation = match self.resolve_conversation(context, platform, &request).await {
            Ok(conversation) => conversation,
            Err(e) => {
                return vec![
                    Event::Error {
                        kind: e.kind(),
                        message: e.user_message(),
                    },
                    Event::Done,
                ];
            }
        };

        if conversation.context_id != context.id {
            return vec![
                Event::Error {
                    kind: ErrorKind::ContextDenied,
                    message: "conversation does not belong to this context".to_string(),
                },
                Event::Done,
            ];
        }

        if request.resume_hitl() {
            return self.dispatch_resume(context, &mut conversation, &request).await;
        }

        let history = match self.messages.recent(&conversation.id, 40).await {
            Ok(history) => history,
            Err(e) => {
                return vec![
                    Event::Error {
                        kind: e.kind(),
                        message: e.user_message(),
                    },
                    Event::Done,
                ];
            }
        };

        let user_message = Message::user(conversation.id.clone(), request.prompt.clone());
        if let Err(e) = self.messages.append(user_message).await {
            tracing::warn!(error = %e, "failed to persist inbound message");
        }

        let ambient = Ambient {
            context_id: context.id.clone(),
            cwd: context.default_cwd.clone(),
            user_email: request.user_email().map(str::to_string),
            oauth_token: None,
            cancellation: tokio_util::sync::CancellationToken::new(),
        };

        let (mut events, suspension) = self.orchestrator.handle(&request, &history, ambient).await;

        conversation.pending_hitl = suspension;
        if let Err(e) = self.conversations.put(conversation.clone()).await {
            tracing::warn!(error = %e, "failed to persist conversation after dispatch");
        }

        let transcript: String = events
            .iter()
            .filter_map(|e| match e {
                Event::Token(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        if !transcript.is_empty() {
            let assistant_message = Message::assistant(conversation.id.clone(), transcript);
            if let Err(e) = self.retry_once(|| self.messages.append(assistant_message.clone())).await {
                tracing::warn!(error = %e, "failed to persist assistant message after retry");
                events.push(Event::Error {
                    kind: ErrorKind::Internal,
                    message: "response was produced but could not be persisted".to_string(),
                });
            }
        }

        events
    }

    /// Continues a conversation's suspended skill with the human's answer
    /// (§4.8, §8 scenario 6). Requires the conversation to actually be
    /// suspended and the suspension to not have expired.
    async fn dispatch_resume(&self, context: &Context, conversation: &mut Conversation, request: &AgentRequest) -> Vec<Event> {
        let Some(suspension) = conversation.pending_hitl.clone() else {
            return vec![
                Event::Error {
                    kind: ErrorKind::Internal,
                    message: "no suspended skill run for this conversation".to_string(),
                },
                Event::Done,
            ];
        };
        if suspension.is_expired(chrono::Utc::now()) {
            conversation.pending_hitl = None;
            let _ = self.conversations.put(conversation.clone()).await;
            return vec![
                Event::Error {
                    kind: ErrorKind::Internal,
                    message: "the confirmation request has expired".to_string(),
                },
                Event::Done,
            ];
        }
        let answer = request.hitl_answer().unwrap_or_default();

        let ambient = Ambient {
            context_id: context.id.clone(),
            cwd: context.default_cwd.clone(),
            user_email: request.user_email().map(str::to_string),
            oauth_token: None,
            cancellation: tokio_util::sync::CancellationToken::new(),
        };
        let (mut events, new_suspension) = self.orchestrator.resume_hitl(&suspension, answer, ambient).await;

        conversation.pending_hitl = new_suspension;
        if let Err(e) = self.conversations.put(conversation.clone()).await {
            tracing::warn!(error = %e, "failed to persist conversation after HITL resume");
            events.push(Event::Error {
                kind: ErrorKind::Internal,
                message: "resumed skill ran but its state could not be persisted".to_string(),
            });
        }

        let transcript: String = events
            .iter()
            .filter_map(|e| match e {
                Event::Token(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        if !transcript.is_empty() {
            let assistant_message = Message::assistant(conversation.id.clone(), transcript);
            if let Err(e) = self.retry_once(|| self.messages.append(assistant_message.clone())).await {
                tracing::warn!(error = %e, "failed to persist assistant message after retry");
            }
        }

        events
    }

    /// Persistence is attempted once, then retried once on failure with a
    /// loud warning either way (§4.9 "persistence in one transaction with
    /// WARN+retry-once on partial failure").
    async fn retry_once<F, Fut>(&self, op: F) -> Result<(), AgentError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), AgentError>>,
    {
        match op().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "persistence failed, retrying once");
                op().await
            }
        }
    }
}

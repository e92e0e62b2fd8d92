//! Core domain entities (spec §3). These are semantic types, not a SQL
//! schema -- persistence is behind the traits in `persistence`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Personal,
    Shared,
    Virtual,
    GitRepo,
}

/// A tenant / workspace. Every persisted Conversation, Permission,
/// ScheduledJob, OAuth token, and MemoryNamespace belongs to exactly one
/// Context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub name: String,
    pub context_type: ContextType,
    pub owner: String,
    pub default_cwd: Option<String>,
    pub pinned_files: Vec<String>,
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl Context {
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            context_type: ContextType::Personal,
            owner: owner.into(),
            default_cwd: None,
            pinned_files: Vec::new(),
            config: serde_json::Map::new(),
        }
    }
}

/// An ordered history of messages within a Context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub context_id: String,
    pub platform: String,
    pub external_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Suspended HITL state, if a skill step is currently paused on this
    /// conversation (§4.8, §4.9).
    pub pending_hitl: Option<crate::skills::HitlSuspension>,
}

impl Conversation {
    pub fn new(context_id: impl Into<String>, platform: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            context_id: context_id.into(),
            platform: platform.into(),
            external_id: None,
            created_at: now,
            updated_at: now,
            pending_hitl: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One turn in a Conversation. Append-only; ordering is strictly by creation
/// time within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub trace_id: Option<String>,
    pub tool_calls: Vec<crate::tools::ToolCall>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Message {
    pub fn user(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::User,
            content: content.into(),
            trace_id: None,
            tool_calls: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }

    pub fn assistant(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::Assistant,
            content: content.into(),
            trace_id: None,
            tool_calls: Vec::new(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// Transport-neutral input to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub prompt: String,
    pub conversation_id: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub messages: Option<Vec<Message>>,
}

impl AgentRequest {
    pub fn context_id(&self) -> Option<&str> {
        self.metadata.get("context_id").and_then(|v| v.as_str())
    }

    pub fn user_email(&self) -> Option<&str> {
        self.metadata.get("user_email").and_then(|v| v.as_str())
    }

    pub fn scheduled_job_id(&self) -> Option<&str> {
        self.metadata
            .get("scheduled_job_id")
            .and_then(|v| v.as_str())
    }

    /// Presence of a resume marker routes the request back into a suspended
    /// HITL continuation (§4.8, §8 scenario 6).
    pub fn resume_hitl(&self) -> bool {
        self.metadata
            .get("resume_hitl")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn hitl_answer(&self) -> Option<&str> {
        self.metadata.get("hitl_answer").and_then(|v| v.as_str())
    }

    /// Route forced by the transport, bypassing classification.
    pub fn forced_route(&self) -> Option<&str> {
        self.metadata.get("route").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPermission {
    pub context_id: String,
    pub tool_name: String,
    pub allowed: bool,
}

/// Tenant-scoped OAuth credential. `encrypted_access`/`encrypted_refresh` are
/// opaque ciphertext; decryption goes through an injected `Cipher` (see
/// `persistence::Cipher`) so this core never implements crypto itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub context_id: String,
    pub provider: String,
    pub encrypted_access: Vec<u8>,
    pub encrypted_refresh: Option<Vec<u8>>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub user_id: Option<String>,
}

/// A non-OAuth credential scoped to one user within a context (API keys,
/// shared secrets a skill needs on the user's behalf). `encrypted_value` is
/// opaque ciphertext, decrypted the same way as `OAuthToken` (§6
/// `user_credentials(user_id, credential_type, encrypted_value, created_at)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredential {
    pub context_id: String,
    pub user_id: String,
    pub credential_type: String,
    pub encrypted_value: Vec<u8>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub context_id: String,
    pub name: String,
    pub cron: String,
    pub skill_prompt: String,
    pub notification_channel: Option<String>,
    pub enabled: bool,
    pub run_count: u64,
    pub last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    pub next_run_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ScheduledJob {
    /// Recomputes `next_run_at` from `cron`, anchored at `from`. Deterministic:
    /// the same cron expression and anchor always yield the same instant
    /// (spec §8 "Cron round-trip").
    pub fn recompute_next_run(&mut self, from: chrono::DateTime<chrono::Utc>) {
        self.next_run_at = crate::cron::next_occurrence(&self.cron, from);
    }
}

/// (context_id, collection) binding. Constructing one without a namespace is
/// a startup misconfiguration (§4.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryNamespace {
    pub context_id: String,
    pub collection: String,
}

impl MemoryNamespace {
    pub fn new(context_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            collection: collection.into(),
        }
    }
}

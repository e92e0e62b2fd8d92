//! Configuration surface (spec §6). Loaded once at startup and shared
//! read-only across the process, matching §5's "settings (read-only after
//! startup)".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cap on adaptive replans per request.
    pub max_replans: u32,
    /// Cap on RETRY per step.
    pub max_step_retries: u32,
    /// Global deadline per AgentRequest, in seconds.
    pub request_timeout_s: u64,
    /// Default per-tool timeout, in seconds.
    pub tool_timeout_s: u64,
    /// Fan-out cap within a plan.
    pub step_parallelism: usize,
    /// Truncation threshold for planner input, in characters.
    pub planner_input_char_cap: usize,
    /// Exponential backoff base for the MCP negative cache, in seconds.
    pub mcp_negative_cache_backoff_s: u64,
    /// Vector store binding.
    pub memory_vector_dim: usize,
    pub memory_collection: String,
    /// How long suspended HITL state survives before it expires (§9 open
    /// question; resolved in DESIGN.md with this default).
    pub hitl_ttl_s: u64,
    /// Soft cap on invocations of a single tool within a step window (§4.1).
    pub tool_rate_limit_per_window: u32,
    /// Bound on tool-calling turns within a single skill run (§4.8).
    pub skill_max_tool_calls: u32,
    /// Planner JSON-extraction retry budget (§4.4).
    pub planner_max_retries: u32,
    /// TTL for cached MCP clients (§4.2).
    pub mcp_client_ttl_s: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_replans: 3,
            max_step_retries: 2,
            request_timeout_s: 300,
            tool_timeout_s: 120,
            step_parallelism: 4,
            planner_input_char_cap: 8_000,
            mcp_negative_cache_backoff_s: 30,
            memory_vector_dim: 1536,
            memory_collection: "agent_memory".to_string(),
            hitl_ttl_s: 3600,
            tool_rate_limit_per_window: 3,
            skill_max_tool_calls: 8,
            planner_max_retries: 3,
            mcp_client_ttl_s: 600,
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> crate::error::Result<Self> {
        toml::from_str(s).map_err(|e| crate::error::AgentError::InvalidConfiguration(e.to_string()))
    }
}

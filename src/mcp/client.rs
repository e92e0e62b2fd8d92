//! MCP transport consumed, not defined, by this core (spec §6).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::tools::{ActivityHint, Ambient, Tool};

#[derive(Debug, Clone)]
pub struct McpToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Minimal surface required of an MCP transport client.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, AgentError>;
    async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, AgentError>;
    async fn ping(&self) -> Result<(), AgentError>;
    async fn close(&self) -> Result<(), AgentError>;
}

/// Placeholder client installed into the pool's cache on a failed connect,
/// so a cache slot always holds a valid trait object even in the `Broken`
/// state.
#[derive(Debug)]
pub struct DeadClient;

#[async_trait]
impl McpClient for DeadClient {
    async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, AgentError> {
        Ok(Vec::new())
    }

    async fn call_tool(
        &self,
        _name: &str,
        _args: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, AgentError> {
        Err(AgentError::new(
            crate::error::ErrorKind::McpUnavailable,
            "server connection is broken",
        ))
    }

    async fn ping(&self) -> Result<(), AgentError> {
        Err(AgentError::new(
            crate::error::ErrorKind::McpUnavailable,
            "server connection is broken",
        ))
    }

    async fn close(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Adapts one remote MCP tool into the uniform `Tool` contract (§4.1).
#[derive(Debug)]
pub struct McpTool {
    descriptor: McpToolDescriptor,
    context_id: String,
    server: String,
    pool: Arc<super::McpClientPool>,
}

impl McpTool {
    pub fn new(
        descriptor: McpToolDescriptor,
        context_id: String,
        server: String,
        pool: Arc<super::McpClientPool>,
    ) -> Self {
        Self {
            descriptor,
            context_id,
            server,
            pool,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters(&self) -> serde_json::Value {
        self.descriptor.parameters.clone()
    }

    fn activity_hint(&self) -> Option<ActivityHint> {
        Some(ActivityHint(format!("Calling {}", self.descriptor.name)))
    }

    async fn run(&self, args: serde_json::Map<String, serde_json::Value>, _ambient: Ambient) -> String {
        let client = match self.pool.get(&self.context_id, &self.server).await {
            Ok(client) => client,
            Err(e) => return format!("Error: {e}"),
        };
        match client.call_tool(&self.descriptor.name, args).await {
            Ok(output) => output,
            Err(e) => format!("Error: {e}"),
        }
    }
}

//! Tool Registry & Tool Contract (spec §4.1).

mod builtin;
mod rate_limit;
mod sanitize;

pub use builtin::builtin_tools;
pub use rate_limit::RateLimiter;
pub use sanitize::sanitize_args;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, ErrorKind};
use crate::types::ToolPermission;

/// One invocation of a tool, as produced by the planner or the LLM's
/// tool-calling loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// Ambient injections available to a tool whose parameter schema opts in
/// (§4.1, §4.6 "context injection... by parameter inspection"). Carries the
/// cancellation signal for every suspension point a tool can hit.
#[derive(Clone)]
pub struct Ambient {
    pub context_id: String,
    pub cwd: Option<String>,
    pub user_email: Option<String>,
    pub oauth_token: Option<Arc<dyn OAuthTokenAccessor>>,
    pub cancellation: tokio_util::sync::CancellationToken,
}

#[async_trait]
pub trait OAuthTokenAccessor: Send + Sync {
    async fn access_token(&self, provider: &str) -> Result<String, AgentError>;
}

/// A template-string activity hint, e.g. `"Searching for {{query}}"`, shown
/// to the UI while a tool is in flight.
#[derive(Debug, Clone)]
pub struct ActivityHint(pub String);

impl ActivityHint {
    pub fn render(&self, args: &serde_json::Map<String, serde_json::Value>) -> String {
        let mut out = self.0.clone();
        for (k, v) in args {
            let needle = format!("{{{{{k}}}}}");
            if out.contains(&needle) {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out = out.replace(&needle, &value);
            }
        }
        out
    }
}

/// Uniform call interface over native tools and MCP-provided tools (§4.1,
/// §6 "Tool contract").
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> serde_json::Value;
    fn activity_hint(&self) -> Option<ActivityHint> {
        None
    }

    /// Parameter names this tool declares ambient interest in (a subset of
    /// `cwd`, `user_email`, `oauth_token`). Used for injection-by-inspection
    /// rather than a hard-coded tool name list.
    fn ambient_params(&self) -> &[&'static str] {
        &[]
    }

    /// Runs the tool. Returns a success string, or a string beginning with
    /// the literal "Error: " -- no raw exception ever escapes this boundary.
    async fn run(&self, args: serde_json::Map<String, serde_json::Value>, ambient: Ambient) -> String;
}

fn merge_ambient(
    tool: &dyn Tool,
    mut args: serde_json::Map<String, serde_json::Value>,
    ambient: &Ambient,
) -> serde_json::Map<String, serde_json::Value> {
    for param in tool.ambient_params() {
        match *param {
            "cwd" => {
                if let Some(cwd) = &ambient.cwd {
                    args.entry("cwd")
                        .or_insert_with(|| serde_json::Value::String(cwd.clone()));
                }
            }
            "user_email" => {
                if let Some(email) = &ambient.user_email {
                    args.entry("user_email")
                        .or_insert_with(|| serde_json::Value::String(email.clone()));
                }
            }
            _ => {}
        }
    }
    args
}

/// Per-request scoped registry: cloned from a global template and filtered
/// by the context's `ToolPermission` rows (§4.1 "Scoping").
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<HashMap<String, Arc<dyn Tool>>>,
    rate_limiter: Arc<RateLimiter>,
    tool_timeout: Duration,
}

impl ToolRegistry {
    /// Builds the global template registry from a fixed tool set.
    pub fn from_tools(tools: Vec<Arc<dyn Tool>>, tool_timeout: Duration, rate_limit_per_window: u32) -> Self {
        let mut map = HashMap::new();
        for tool in tools {
            map.insert(tool.name().to_string(), tool);
        }
        Self {
            tools: Arc::new(map),
            rate_limiter: Arc::new(RateLimiter::new(rate_limit_per_window)),
            tool_timeout,
        }
    }

    /// Clones the template and drops any tool the context has not been
    /// granted. Default policy (no row present) is caller-supplied so
    /// deployments can configure allow-by-default or deny-by-default.
    pub fn scoped_for_context(
        &self,
        permissions: &[ToolPermission],
        default_allowed: bool,
    ) -> ToolRegistry {
        let allowed: HashMap<&str, bool> = permissions
            .iter()
            .map(|p| (p.tool_name.as_str(), p.allowed))
            .collect();
        let filtered: HashMap<String, Arc<dyn Tool>> = self
            .tools
            .iter()
            .filter(|(name, _)| *allowed.get(name.as_str()).unwrap_or(&default_allowed))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ToolRegistry {
            tools: Arc::new(filtered),
            rate_limiter: Arc::new(RateLimiter::new(self.rate_limiter.limit())),
            tool_timeout: self.tool_timeout,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn catalogue(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self
            .tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Invokes a tool with scoping, rate limiting, ambient injection, and a
    /// bounded timeout, translating every failure mode into the closed
    /// `ErrorKind` set (§4.1, §4.6). Returns the raw tool output string on
    /// success.
    pub async fn invoke(
        &self,
        tool_call: &ToolCall,
        ambient: Ambient,
        rate_limit_scope: &str,
    ) -> Result<String, (ErrorKind, String)> {
        let Some(tool) = self.get(&tool_call.tool_name) else {
            return Err((
                ErrorKind::ToolNotFound,
                format!("tool '{}' is not known", tool_call.tool_name),
            ));
        };

        if !self.rate_limiter.try_acquire(rate_limit_scope, &tool_call.tool_name) {
            return Err((
                ErrorKind::ToolRateLimited,
                format!("tool '{}' exceeded its rate limit for this step window", tool_call.tool_name),
            ));
        }

        tracing::debug!(
            tool = %tool_call.tool_name,
            args = %serde_json::Value::Object(sanitize_args(&tool_call.args)),
            "invoking tool"
        );

        let args = merge_ambient(tool.as_ref(), tool_call.args.clone(), &ambient);
        let fut = tool.run(args, ambient.clone());

        let outcome = tokio::select! {
            result = tokio::time::timeout(self.tool_timeout, fut) => result,
            _ = ambient.cancellation.cancelled() => {
                return Err((ErrorKind::RequestCancelled, "tool call cancelled".to_string()));
            }
        };

        match outcome {
            Err(_) => Err((
                ErrorKind::ToolTimeout,
                format!("tool '{}' exceeded {:?}", tool_call.tool_name, self.tool_timeout),
            )),
            Ok(output) => {
                if let Some(cause) = output.strip_prefix("Error: ") {
                    Err((ErrorKind::ToolFailed, cause.to_string()))
                } else {
                    Ok(output)
                }
            }
        }
    }
}

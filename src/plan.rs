//! Plan and PlanStep (spec §3). Free-form plan-step args are modeled as a
//! plain `serde_json::Map`, validated against the target tool or skill's
//! JSON schema by the plan supervisor rather than at the type level, since
//! MCP-discovered tools carry schemas that are only known at runtime.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Tool,
    Skill,
    Completion,
    Litellm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub label: String,
    pub executor: ExecutorKind,
    /// Tool or skill name; ignored for `Completion`/`Litellm` steps.
    pub target: Option<String>,
    pub args: serde_json::Map<String, serde_json::Value>,
    pub depends_on: HashSet<String>,
    pub retry_feedback: Option<String>,
    pub retries_used: u32,
}

impl PlanStep {
    pub fn tool(id: impl Into<String>, label: impl Into<String>, target: impl Into<String>, args: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            executor: ExecutorKind::Tool,
            target: Some(target.into()),
            args,
            depends_on: HashSet::new(),
            retry_feedback: None,
            retries_used: 0,
        }
    }

    pub fn skill(id: impl Into<String>, label: impl Into<String>, target: impl Into<String>, args: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            executor: ExecutorKind::Skill,
            target: Some(target.into()),
            args,
            depends_on: HashSet::new(),
            retry_feedback: None,
            retries_used: 0,
        }
    }

    pub fn completion(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            executor: ExecutorKind::Completion,
            target: None,
            args: serde_json::Map::new(),
            depends_on: HashSet::new(),
            retry_feedback: None,
            retries_used: 0,
        }
    }
}

/// Description + ordered list of steps. Non-empty unless explicitly
/// conversational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub description: String,
    pub steps: Vec<PlanStep>,
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn conversational(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            steps: vec![PlanStep::completion("step-1", "respond")],
            warnings: Vec::new(),
        }
    }

    pub fn empty_failed(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_conversational(&self) -> bool {
        self.steps.len() == 1 && self.steps[0].executor == ExecutorKind::Completion
    }
}

/// The supervisor's sole output shape (§3, §4.7).
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Success,
    Retry(String),
    Replan(String),
    Abort(String),
}

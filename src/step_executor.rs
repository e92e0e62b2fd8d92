//! Step Executor (spec §4.6): runs one `PlanStep` to completion, dispatching
//! on its executor kind and emitting a stream of progress events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ErrorKind;
use crate::llm::{LlmClient, LlmMessage};
use crate::plan::{ExecutorKind, PlanStep};
use crate::skills::{HitlSuspension, SkillEngine, SkillRegistry, SkillRunOutcome};
use crate::tools::{Ambient, ToolCall, ToolRegistry};

#[derive(Debug, Clone)]
pub enum StepEvent {
    Started,
    Activity(String),
    TokenChunk(String),
    Finished(StepResult),
}

#[derive(Debug, Clone)]
pub enum StepResult {
    Success(String),
    Failed(ErrorKind, String),
    Suspended(HitlSuspension),
}

pub struct StepExecutor {
    llm: Arc<dyn LlmClient>,
    skills: Arc<SkillRegistry>,
    skill_engine: Arc<SkillEngine>,
    completion_timeout: Duration,
}

impl StepExecutor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        skills: Arc<SkillRegistry>,
        skill_engine: Arc<SkillEngine>,
        completion_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            skills,
            skill_engine,
            completion_timeout,
        }
    }

    /// Executes `step`, returning the ordered events a caller should forward
    /// to the transport as they occur. Collected eagerly rather than
    /// streamed lazily: every branch already awaits to completion before
    /// producing its `Finished` event, so there is no benefit to an async
    /// generator here (§4.6 "yields events").
    pub async fn execute(
        &self,
        step: &PlanStep,
        context_fields: &HashMap<String, serde_json::Value>,
        tools: &ToolRegistry,
        ambient: Ambient,
        rate_limit_scope: &str,
    ) -> Vec<StepEvent> {
        let mut events = vec![StepEvent::Started];

        match step.executor {
            ExecutorKind::Tool => {
                let Some(target) = &step.target else {
                    events.push(StepEvent::Finished(StepResult::Failed(
                        ErrorKind::PlanInvalid,
                        "tool step has no target tool name".to_string(),
                    )));
                    return events;
                };
                if let Some(tool) = tools.get(target) {
                    if let Some(hint) = tool.activity_hint() {
                        events.push(StepEvent::Activity(hint.render(&step.args)));
                    }
                }
                let tool_call = ToolCall {
                    id: step.id.clone(),
                    tool_name: target.clone(),
                    args: step.args.clone(),
                };
                match tools.invoke(&tool_call, ambient, rate_limit_scope).await {
                    Ok(output) => events.push(StepEvent::Finished(StepResult::Success(output))),
                    Err((kind, message)) => events.push(StepEvent::Finished(StepResult::Failed(kind, message))),
                }
            }

            ExecutorKind::Skill => {
                let Some(target) = &step.target else {
                    events.push(StepEvent::Finished(StepResult::Failed(
                        ErrorKind::PlanInvalid,
                        "skill step has no target skill id".to_string(),
                    )));
                    return events;
                };
                let Some(skill) = self.skills.get(target) else {
                    events.push(StepEvent::Finished(StepResult::Failed(
                        ErrorKind::ToolNotFound,
                        format!("skill '{target}' is not registered"),
                    )));
                    return events;
                };
                events.push(StepEvent::Activity(format!("running skill '{}'", skill.display_name)));
                let prompt = step
                    .args
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&step.label)
                    .to_string();
                let outcome = self
                    .skill_engine
                    .run(skill, &prompt, context_fields, tools, ambient, rate_limit_scope)
                    .await;
                events.push(StepEvent::Finished(skill_outcome_to_result(outcome)));
            }

            ExecutorKind::Completion | ExecutorKind::Litellm => {
                let messages = vec![LlmMessage::user(step.label.clone())];
                let call = self.llm.complete(&messages, &[]);
                match tokio::time::timeout(self.completion_timeout, call).await {
                    Err(_) => events.push(StepEvent::Finished(StepResult::Failed(
                        ErrorKind::RequestTimeout,
                        "completion step timed out".to_string(),
                    ))),
                    Ok(Err(e)) => events.push(StepEvent::Finished(StepResult::Failed(e.kind(), e.user_message()))),
                    Ok(Ok(response)) => {
                        let content = crate::llm::strip_reasoning(&response.content);
                        events.push(StepEvent::TokenChunk(content.clone()));
                        events.push(StepEvent::Finished(StepResult::Success(content)));
                    }
                }
            }
        }

        events
    }
}

fn skill_outcome_to_result(outcome: SkillRunOutcome) -> StepResult {
    match outcome {
        SkillRunOutcome::Completed(text) => StepResult::Success(text),
        SkillRunOutcome::Suspended(s) => StepResult::Suspended(s),
        SkillRunOutcome::Failed(kind, message) => StepResult::Failed(kind, message),
    }
}

//! Orchestrator / AgentService (spec §4.9): the adaptive request loop —
//! route, plan, validate, execute, supervise, replan or abort — scoped to a
//! single request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::error::ErrorKind;
use crate::fast_path::FastPath;
use crate::llm::LlmClient;
use crate::memory::MemoryStore;
use crate::plan::{Plan, PlanStep, StepOutcome};
use crate::plan_supervisor::PlanSupervisor;
use crate::planner::Planner;
use crate::skills::{HitlSuspension, SkillEngine, SkillRegistry, SkillRunOutcome};
use crate::step_executor::{StepEvent, StepExecutor, StepResult};
use crate::step_supervisor::StepSupervisor;
use crate::tools::{Ambient, ToolRegistry};
use crate::types::{AgentRequest, Message};

/// How a single step's retry loop definitively resolved, for the batch
/// scheduler in `run` to act on once every step in a round has settled.
enum StepBatchOutcome {
    Success,
    Replan(String),
    Abort(String),
    Suspended(HitlSuspension),
}

/// The closed event union a caller observes as a request is served
/// (spec §4.9, §4.11, §6).
#[derive(Debug, Clone)]
pub enum Event {
    PlanEmitted(String),
    ToolStarted { step_id: String },
    ToolActivity { step_id: String, hint: String },
    Token(String),
    ToolFinished { step_id: String, outcome: String },
    HitlPending { step_id: String, question: String },
    Error { kind: ErrorKind, message: String },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Chat,
    FastPath,
    Agentic,
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    planner: Planner,
    step_executor: StepExecutor,
    step_supervisor: StepSupervisor,
    skill_engine: Arc<SkillEngine>,
    fast_path: Option<Arc<FastPath>>,
    tools: ToolRegistry,
    skills: Arc<SkillRegistry>,
    memory: Option<MemoryStore>,
    settings: Settings,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        planner: Planner,
        step_executor: StepExecutor,
        step_supervisor: StepSupervisor,
        skill_engine: Arc<SkillEngine>,
        fast_path: Option<Arc<FastPath>>,
        tools: ToolRegistry,
        skills: Arc<SkillRegistry>,
        memory: Option<MemoryStore>,
        settings: Settings,
    ) -> Self {
        Self {
            llm,
            planner,
            step_executor,
            step_supervisor,
            skill_engine,
            fast_path,
            tools,
            skills,
            memory,
            settings,
        }
    }

    /// Continues a skill paused on human confirmation (§4.8, §8 scenario 6).
    /// Returns the events to forward plus a new suspension if the skill
    /// immediately hit another confirmation point, for the caller to persist
    /// in place of the one it resumed from.
    pub async fn resume_hitl(
        &self,
        suspension: &HitlSuspension,
        answer: &str,
        ambient: Ambient,
    ) -> (Vec<Event>, Option<HitlSuspension>) {
        let Some(skill) = self.skills.get(&suspension.skill_id) else {
            return (
                vec![
                    Event::Error {
                        kind: ErrorKind::Internal,
                        message: format!("skill '{}' is no longer registered", suspension.skill_id),
                    },
                    Event::Done,
                ],
                None,
            );
        };
        let rate_limit_scope = format!("resume:{}", suspension.skill_id);
        let outcome = self
            .skill_engine
            .resume(skill, suspension.clone(), answer, &self.tools, ambient, &rate_limit_scope)
            .await;
        match outcome {
            SkillRunOutcome::Completed(text) => (vec![Event::Token(text), Event::Done], None),
            SkillRunOutcome::Suspended(s) => (
                vec![
                    Event::HitlPending {
                        step_id: suspension.skill_id.clone(),
                        question: s.question.clone(),
                    },
                    Event::Done,
                ],
                Some(s),
            ),
            SkillRunOutcome::Failed(kind, message) => (vec![Event::Error { kind, message }, Event::Done], None),
        }
    }

    fn classify(&self, request: &AgentRequest) -> Route {
        if let Some(route) = request.forced_route() {
            return match route {
                "chat" => Route::Chat,
                "fast_path" => Route::FastPath,
                _ => Route::Agentic,
            };
        }
        if Planner::looks_conversational(&request.prompt) {
            return Route::Chat;
        }
        if self
            .fast_path
            .as_ref()
            .is_some_and(|fp| fp.match_prompt(&request.prompt).is_some())
        {
            return Route::FastPath;
        }
        Route::Agentic
    }

    /// Serves one request end to end, bounded by the global request
    /// timeout (§4.9). Transcript history is capped so a long-running
    /// conversation's memory footprint doesn't grow unbounded (§4.9
    /// "transcript growth bounding").
    pub async fn handle(
        &self,
        request: &AgentRequest,
        history: &[Message],
        ambient: Ambient,
    ) -> (Vec<Event>, Option<HitlSuspension>) {
        let deadline = Duration::from_secs(self.settings.request_timeout_s);
        match tokio::time::timeout(deadline, self.run(request, history, ambient)).await {
            Ok(result) => result,
            Err(_) => (
                vec![
                    Event::Error {
                        kind: ErrorKind::RequestTimeout,
                        message: "request exceeded its global deadline".to_string(),
                    },
                    Event::Done,
                ],
                None,
            ),
        }
    }

    async fn run(&self, request: &AgentRequest, history: &[Message], ambient: Ambient) -> (Vec<Event>, Option<HitlSuspension>) {
        const TRANSCRIPT_CAP: usize = 40;
        let bounded_history: Vec<Message> = history
            .iter()
            .rev()
            .take(TRANSCRIPT_CAP)
            .rev()
            .cloned()
            .collect();

        let route = self.classify(request);

        // Chat bypasses planning entirely: a direct completion, no plan
        // emitted (§8 scenario 1 "Simple chat").
        if route == Route::Chat {
            let mut messages: Vec<_> = bounded_history
                .iter()
                .map(|m| match m.role {
                    crate::types::Role::User => crate::llm::LlmMessage::user(m.content.clone()),
                    crate::types::Role::Assistant => crate::llm::LlmMessage::assistant(m.content.clone()),
                    crate::types::Role::Tool => crate::llm::LlmMessage::assistant(m.content.clone()),
                })
                .collect();
            messages.push(crate::llm::LlmMessage::user(request.prompt.clone()));
            return match self.llm.complete(&messages, &[]).await {
                Ok(response) => (
                    vec![Event::Token(crate::llm::strip_reasoning(&response.content)), Event::Done],
                    None,
                ),
                Err(e) => (vec![Event::Error { kind: e.kind(), message: e.user_message() }, Event::Done], None),
            };
        }

        let mut plan = match route {
            Route::FastPath => match self.fast_path.as_ref().and_then(|fp| fp.match_prompt(&request.prompt)) {
                Some(plan) => plan,
                None => self.plan_via_llm(request, &bounded_history).await,
            },
            Route::Agentic => self.plan_via_llm(request, &bounded_history).await,
            Route::Chat => unreachable!("handled above"),
        };

        let mut events = Vec::new();
        let context_fields: HashMap<String, serde_json::Value> = request.metadata.clone();

        // Tracks consecutive replans carrying the *same* reason, across plan
        // regenerations, so a planner stuck picking the same bad tool over
        // and over escalates to an abort rather than looping forever (§9
        // open question, resolved: same-reason recurrence past max_replans
        // aborts instead of replanning indefinitely).
        let mut last_replan_reason: Option<String> = None;
        let mut same_reason_streak = 0u32;

        'outer: loop {
            let validated = PlanSupervisor::validate(plan.clone(), &self.tools, &self.skills);

            let mut replan_reason: Option<String> = validated.fatal.clone();
            let mut abort_reason: Option<String> = None;

            if replan_reason.is_none() {
                for warning in &validated.warnings {
                    tracing::warn!(warning = %warning, "plan supervisor warning");
                }
                plan = validated.plan;
                events.push(Event::PlanEmitted(plan.description.clone()));
            }

            if replan_reason.is_none() {
                let mut completed: HashSet<String> = HashSet::new();
                let mut remaining: Vec<usize> = (0..plan.steps.len()).collect();
                let fan_out = self.settings.step_parallelism.max(1);

                'batches: while !remaining.is_empty() {
                    let ready: Vec<usize> = remaining
                        .iter()
                        .copied()
                        .filter(|&i| plan.steps[i].depends_on.iter().all(|d| completed.contains(d)))
                        .take(fan_out)
                        .collect();

                    if ready.is_empty() {
                        replan_reason = Some("plan has a step whose dependencies never complete".to_string());
                        break 'batches;
                    }

                    let results = futures::future::join_all(ready.iter().map(|&idx| {
                        self.run_step(plan.steps[idx].clone(), &context_fields, ambient.clone(), &request.conversation_id)
                    }))
                    .await;

                    let mut batch_failed = false;
                    for (idx, (step, step_events, outcome)) in ready.iter().copied().zip(results) {
                        plan.steps[idx] = step;
                        events.extend(step_events);

                        match outcome {
                            StepBatchOutcome::Success => {
                                completed.insert(plan.steps[idx].id.clone());
                                remaining.retain(|&r| r != idx);
                            }
                            StepBatchOutcome::Suspended(suspension) => {
                                events.push(Event::Done);
                                return (events, Some(suspension));
                            }
                            StepBatchOutcome::Replan(reason) => {
                                replan_reason = Some(reason);
                                batch_failed = true;
                            }
                            StepBatchOutcome::Abort(reason) => {
                                abort_reason = Some(reason);
                                batch_failed = true;
                            }
                        }
                    }
                    if batch_failed {
                        break 'batches;
                    }
                }
            }

            if let Some(reason) = abort_reason {
                events.push(Event::Error {
                    kind: ErrorKind::Internal,
                    message: reason,
                });
                events.push(Event::Done);
                return (events, None);
            }

            if let Some(reason) = replan_reason {
                if last_replan_reason.as_deref() == Some(reason.as_str()) {
                    same_reason_streak += 1;
                } else {
                    same_reason_streak = 1;
                    last_replan_reason = Some(reason.clone());
                }
                if same_reason_streak > self.settings.max_replans {
                    events.push(Event::Error {
                        kind: ErrorKind::PlanInvalid,
                        message: format!(
                            "same replan reason recurred {same_reason_streak} times, exceeding {}: {reason}",
                            self.settings.max_replans
                        ),
                    });
                    events.push(Event::Done);
                    return (events, None);
                }
                plan = self.plan_via_llm(request, &bounded_history).await;
                continue 'outer;
            }

            break;
        }

        self.record_to_memory(request, &plan);
        events.push(Event::Done);
        (events, None)
    }

    /// Drives one step's execute/evaluate/retry loop to a definitive
    /// outcome. The rate limit window is scoped to this one step (a step id
    /// under the conversation), not shared across the whole request, so two
    /// independent steps calling the same tool each get their own budget
    /// (§4.1).
    async fn run_step(
        &self,
        mut step: PlanStep,
        context_fields: &HashMap<String, serde_json::Value>,
        ambient: Ambient,
        conversation_id: &str,
    ) -> (PlanStep, Vec<Event>, StepBatchOutcome) {
        let rate_limit_scope = format!("{conversation_id}:{}", step.id);
        let mut events = Vec::new();

        loop {
            events.push(Event::ToolStarted { step_id: step.id.clone() });

            let step_events = self
                .step_executor
                .execute(&step, context_fields, &self.tools, ambient.clone(), &rate_limit_scope)
                .await;

            let mut result = None;
            for event in step_events {
                match event {
                    StepEvent::Started => {}
                    StepEvent::Activity(hint) => events.push(Event::ToolActivity {
                        step_id: step.id.clone(),
                        hint,
                    }),
                    StepEvent::TokenChunk(token) => events.push(Event::Token(token)),
                    StepEvent::Finished(r) => result = Some(r),
                }
            }
            let Some(result) = result else {
                return (step, events, StepBatchOutcome::Success);
            };

            if let StepResult::Suspended(suspension) = &result {
                events.push(Event::HitlPending {
                    step_id: step.id.clone(),
                    question: suspension.question.clone(),
                });
                return (step, events, StepBatchOutcome::Suspended(suspension.clone()));
            }

            let outcome = self
                .step_supervisor
                .evaluate(&step.label, &result, step.retries_used, self.settings.max_step_retries)
                .await;

            let outcome_label = match &result {
                StepResult::Success(text) => text.clone(),
                StepResult::Failed(_, message) => message.clone(),
                StepResult::Suspended(_) => String::new(),
            };
            events.push(Event::ToolFinished {
                step_id: step.id.clone(),
                outcome: outcome_label,
            });

            match outcome {
                StepOutcome::Success => return (step, events, StepBatchOutcome::Success),
                StepOutcome::Retry(reason) => {
                    step.retries_used += 1;
                    step.retry_feedback = Some(reason);
                    continue;
                }
                StepOutcome::Replan(reason) => return (step, events, StepBatchOutcome::Replan(reason)),
                StepOutcome::Abort(reason) => return (step, events, StepBatchOutcome::Abort(reason)),
            }
        }
    }

    async fn plan_via_llm(&self, request: &AgentRequest, history: &[Message]) -> Plan {
        let tool_catalogue = self.tools.catalogue();
        let skill_catalogue = self.skills.catalogue();
        self.planner.plan(request, history, &tool_catalogue, &skill_catalogue).await
    }

    /// Fire-and-forget write: memory persistence never blocks the user-facing
    /// response, and its failure is logged, not surfaced (§4.3, §4.9).
    fn record_to_memory(&self, request: &AgentRequest, plan: &Plan) {
        let Some(memory) = self.memory.clone() else {
            return;
        };
        let text = format!("{}: {}", request.prompt, plan.description);
        tokio::spawn(async move {
            let _ = memory.upsert(&text, serde_json::Map::new()).await;
        });
    }
}

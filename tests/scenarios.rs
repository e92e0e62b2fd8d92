//! End-to-end scenarios driven through the full `Dispatcher` -> `ServiceFactory`
//! -> `Orchestrator` stack, backed by `InMemoryStore` and a scripted LLM so
//! every outcome is deterministic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use agent_orchestration_core::config::Settings;
use agent_orchestration_core::error::ErrorKind;
use agent_orchestration_core::fast_path::{FastPath, FastPathRoute};
use agent_orchestration_core::llm::mock::MockLlmClient;
use agent_orchestration_core::llm::{LlmClient, LlmResponse, ToolCallIntent, Usage};
use agent_orchestration_core::orchestrator::Event;
use agent_orchestration_core::persistence::InMemoryStore;
use agent_orchestration_core::service_factory::{Runtime, ServiceFactory};
use agent_orchestration_core::skills::{HitlPolicy, Skill, SkillRegistry};
use agent_orchestration_core::tools::{builtin_tools, ToolRegistry};
use agent_orchestration_core::types::{AgentRequest, Context};

fn context() -> Context {
    Context::new("ctx-1", "acme", "owner@acme.test")
}

fn request(prompt: &str) -> AgentRequest {
    AgentRequest {
        prompt: prompt.to_string(),
        conversation_id: "conv-1".to_string(),
        metadata: HashMap::new(),
        messages: None,
    }
}

fn runtime(llm: Arc<dyn LlmClient>, fast_path: Option<Arc<FastPath>>, skills: Arc<SkillRegistry>, settings: Settings) -> Arc<Runtime> {
    let store = Arc::new(InMemoryStore::new());
    Arc::new(Runtime {
        llm,
        vector_client: None,
        tool_registry_template: ToolRegistry::from_tools(builtin_tools(), Duration::from_secs(5), 10),
        skills,
        fast_path,
        conversations: store.clone(),
        messages: store.clone(),
        permissions: store,
        settings,
    })
}

async fn dispatcher(runtime: Arc<Runtime>) -> agent_orchestration_core::dispatcher::Dispatcher {
    let factory = ServiceFactory::new(runtime, Duration::from_secs(60));
    factory.build_for_context("ctx-1", false).await.unwrap()
}

#[tokio::test]
async fn simple_chat_skips_planning() {
    let llm = Arc::new(MockLlmClient::new(vec![LlmResponse {
        content: "Hi! How can I help?".to_string(),
        tool_calls: Vec::new(),
        usage: Usage::default(),
    }]));
    let runtime = runtime(llm, None, Arc::new(SkillRegistry::new()), Settings::default());
    let dispatcher = dispatcher(runtime).await;

    let events = dispatcher.dispatch(&context(), "test", request("hello")).await;

    assert!(!events.iter().any(|e| matches!(e, Event::PlanEmitted(_))));
    assert!(events.iter().any(|e| matches!(e, Event::Token(t) if t == "Hi! How can I help?")));
    assert!(matches!(events.last(), Some(Event::Done)));
}

#[tokio::test]
async fn fast_path_bypasses_the_planner() {
    fn product_mapper(captures: &regex::Captures) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("product".to_string(), serde_json::Value::String(captures[1].to_string()));
        map
    }
    let route = FastPathRoute::new("track a product's price", "price_tracker", r"^track (\S+)$", product_mapper).unwrap();
    let fast_path = Some(Arc::new(FastPath::new(vec![route])));

    // No LLM calls are expected on this route at all.
    let llm = Arc::new(MockLlmClient::new(Vec::new()));
    let runtime = runtime(llm, fast_path, Arc::new(SkillRegistry::new()), Settings::default());
    let dispatcher = dispatcher(runtime).await;

    let events = dispatcher.dispatch(&context(), "test", request("track widget")).await;

    assert!(events.iter().any(|e| matches!(e, Event::PlanEmitted(_))));
    assert!(events.iter().any(|e| matches!(e, Event::ToolFinished { outcome, .. } if outcome.contains("widget"))));
    assert!(!events.iter().any(|e| matches!(e, Event::Error { .. })));
    assert!(matches!(events.last(), Some(Event::Done)));
}

#[tokio::test]
async fn agentic_two_step_plan_runs_to_completion() {
    let plan = r#"{"description": "answer in two steps", "steps": [
        {"id": "s1", "label": "draft", "executor": "completion", "args": {}, "depends_on": []},
        {"id": "s2", "label": "polish", "executor": "completion", "args": {}, "depends_on": ["s1"]}
    ]}"#;
    let llm = Arc::new(MockLlmClient::new(vec![
        LlmResponse { content: plan.to_string(), tool_calls: Vec::new(), usage: Usage::default() },
        LlmResponse { content: "a draft answer".to_string(), tool_calls: Vec::new(), usage: Usage::default() },
        LlmResponse { content: "a polished answer".to_string(), tool_calls: Vec::new(), usage: Usage::default() },
    ]));
    let runtime = runtime(llm, None, Arc::new(SkillRegistry::new()), Settings::default());
    let dispatcher = dispatcher(runtime).await;

    let events = dispatcher.dispatch(&context(), "test", request("write me a short note, step by step")).await;

    assert!(events.iter().any(|e| matches!(e, Event::PlanEmitted(_))));
    assert!(!events.iter().any(|e| matches!(e, Event::Error { .. })));
    assert!(matches!(events.last(), Some(Event::Done)));
}

#[tokio::test]
async fn a_failing_step_retries_then_replans_into_success() {
    // The first plan calls price_tracker with no "product" arg, which the
    // tool rejects outright; the LLM-judged supervisor is asked twice and
    // told to retry both times before the retry budget is exhausted and the
    // step forces a replan, after which the corrected plan succeeds.
    let bad_plan = r#"{"description": "d", "steps": [
        {"id": "s1", "label": "look up price", "executor": "tool", "tool": "price_tracker", "args": {}, "depends_on": []}
    ]}"#;
    let good_plan = r#"{"description": "d", "steps": [
        {"id": "s1", "label": "look up price", "executor": "tool", "tool": "price_tracker", "args": {"product": "widget"}, "depends_on": []}
    ]}"#;
    let llm = Arc::new(MockLlmClient::new(vec![
        LlmResponse { content: bad_plan.to_string(), tool_calls: Vec::new(), usage: Usage::default() },
        LlmResponse { content: "RETRY".to_string(), tool_calls: Vec::new(), usage: Usage::default() },
        LlmResponse { content: "RETRY".to_string(), tool_calls: Vec::new(), usage: Usage::default() },
        LlmResponse { content: good_plan.to_string(), tool_calls: Vec::new(), usage: Usage::default() },
    ]));
    let mut settings = Settings::default();
    settings.max_step_retries = 2;
    let runtime = runtime(llm, None, Arc::new(SkillRegistry::new()), settings);
    let dispatcher = dispatcher(runtime).await;

    let events = dispatcher.dispatch(&context(), "test", request("what does the widget cost")).await;

    let plan_emissions = events.iter().filter(|e| matches!(e, Event::PlanEmitted(_))).count();
    assert_eq!(plan_emissions, 2, "expected one replan after the retry budget was exhausted");
    assert!(!events.iter().any(|e| matches!(e, Event::Error { .. })));
    assert!(matches!(events.last(), Some(Event::Done)));
}

#[tokio::test]
async fn a_planner_stuck_on_the_same_bad_tool_escalates_to_abort() {
    let json = r#"{"description": "d", "steps": [
        {"id": "s1", "label": "l", "executor": "tool", "tool": "not_a_real_tool", "args": {}, "depends_on": []}
    ]}"#;
    let settings = Settings::default();
    let replans_before_giveup = settings.max_replans + 1;
    let llm = Arc::new(MockLlmClient::with_json_plans(vec![json.to_string(); replans_before_giveup as usize]));
    let runtime = runtime(llm, None, Arc::new(SkillRegistry::new()), settings);
    let dispatcher = dispatcher(runtime).await;

    let events = dispatcher.dispatch(&context(), "test", request("do a complex multi-step task")).await;

    assert!(events.iter().any(|e| matches!(e, Event::Error { kind: ErrorKind::PlanInvalid, .. })));
    assert!(matches!(events.last(), Some(Event::Done)));
}

#[tokio::test]
async fn skill_suspends_on_confirmation_and_resumes_after_the_human_answers() {
    let mut skills = SkillRegistry::new();
    skills.insert(Skill {
        id: "email_notifier".to_string(),
        display_name: "Email Notifier".to_string(),
        system_prompt: "You draft and send short status emails.".to_string(),
        permitted_tools: HashSet::from(["send_email".to_string()]),
        required_context: Vec::new(),
        hitl_policy: Some(HitlPolicy {
            confirm_tools: HashSet::from(["send_email".to_string()]),
        }),
        trigger_patterns: Vec::new(),
    });

    let plan = r#"{"description": "d", "steps": [
        {"id": "s1", "label": "notify the team", "executor": "skill", "tool": "email_notifier", "args": {}, "depends_on": []}
    ]}"#;
    let llm = Arc::new(MockLlmClient::new(vec![
        LlmResponse { content: plan.to_string(), tool_calls: Vec::new(), usage: Usage::default() },
        LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCallIntent {
                id: "c1".to_string(),
                tool_name: "send_email".to_string(),
                args: serde_json::Map::new(),
            }],
            usage: Usage::default(),
        },
        LlmResponse { content: "Email sent, thanks!".to_string(), tool_calls: Vec::new(), usage: Usage::default() },
    ]));
    let runtime = runtime(llm, None, Arc::new(skills), Settings::default());
    let dispatcher = dispatcher(runtime).await;

    let mut first = request("notify the team that the deploy finished");
    first.metadata.insert("external_id".to_string(), serde_json::json!("conv-ext-1"));
    let events = dispatcher.dispatch(&context(), "test", first).await;

    assert!(events.iter().any(|e| matches!(e, Event::HitlPending { .. })));
    assert!(matches!(events.last(), Some(Event::Done)));

    let mut second = request("");
    second.metadata.insert("external_id".to_string(), serde_json::json!("conv-ext-1"));
    second.metadata.insert("resume_hitl".to_string(), serde_json::json!(true));
    second.metadata.insert("hitl_answer".to_string(), serde_json::json!("yes, send it"));
    let resumed = dispatcher.dispatch(&context(), "test", second).await;

    assert!(resumed.iter().any(|e| matches!(e, Event::Token(t) if t == "Email sent, thanks!")));
    assert!(!resumed.iter().any(|e| matches!(e, Event::Error { .. })));
    assert!(matches!(resumed.last(), Some(Event::Done)));
}

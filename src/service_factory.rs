//! Service Factory (spec §4.12): wires process-wide singletons into the
//! per-request scoped objects a `Dispatcher` needs, with an optional
//! short-TTL cache keyed by context id so repeat requests from the same
//! tenant don't rebuild their scoped registry every time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::Settings;
use crate::dispatcher::Dispatcher;
use crate::error::AgentError;
use crate::fast_path::{FastPath, FastPathRoute};
use crate::llm::LlmClient;
use crate::memory::{MemoryStore, VectorClient};
use crate::orchestrator::Orchestrator;
use crate::persistence::{ConversationStore, MessageStore, ToolPermissionStore};
use crate::planner::Planner;
use crate::skills::{SkillEngine, SkillRegistry};
use crate::step_executor::StepExecutor;
use crate::step_supervisor::StepSupervisor;
use crate::tools::ToolRegistry;
use crate::types::MemoryNamespace;

/// Process-wide singletons, constructed once at startup.
pub struct Runtime {
    pub llm: Arc<dyn LlmClient>,
    pub vector_client: Option<Arc<dyn VectorClient>>,
    pub tool_registry_template: ToolRegistry,
    pub skills: Arc<SkillRegistry>,
    pub fast_path: Option<Arc<FastPath>>,
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub permissions: Arc<dyn ToolPermissionStore>,
    pub settings: Settings,
}

struct CachedOrchestrator {
    built_at: Instant,
    tools: ToolRegistry,
}

/// Builds a scoped `Dispatcher` per request from the shared `Runtime`.
/// Caches a context's scoped tool registry (the one component that depends
/// on a permissions lookup) by object identity, keyed off a short-TTL
/// timestamp, so repeat requests from the same tenant within the TTL skip
/// re-fetching permissions and re-scoping tools (§4.12 "optional short-TTL
/// caching").
pub struct ServiceFactory {
    runtime: Arc<Runtime>,
    cache_ttl: Duration,
    cache: DashMap<String, CachedOrchestrator>,
}

impl ServiceFactory {
    pub fn new(runtime: Arc<Runtime>, cache_ttl: Duration) -> Self {
        Self {
            runtime,
            cache_ttl,
            cache: DashMap::new(),
        }
    }

    pub fn evict_stale(&self) {
        self.cache.retain(|_, c| c.built_at.elapsed() <= self.cache_ttl);
    }

    /// Layers each loaded skill's `trigger_patterns` on top of the
    /// statically configured fast-path routes, so a skill can opt into
    /// fast-path dispatch purely through its frontmatter (§6).
    fn fast_path_with_skill_triggers(&self) -> Option<Arc<FastPath>> {
        let skill_routes: Vec<FastPathRoute> = self
            .runtime
            .skills
            .trigger_patterns()
            .into_iter()
            .filter_map(|(pattern, skill_id)| match FastPathRoute::for_skill(format!("skill trigger: {skill_id}"), skill_id.clone(), &pattern) {
                Ok(route) => Some(route),
                Err(e) => {
                    tracing::warn!(skill_id = %skill_id, pattern = %pattern, error = %e, "invalid skill trigger pattern, skipping");
                    None
                }
            })
            .collect();

        match (&self.runtime.fast_path, skill_routes.is_empty()) {
            (Some(base), false) => Some(Arc::new(base.extended_with(skill_routes))),
            (Some(base), true) => Some(base.clone()),
            (None, false) => Some(Arc::new(FastPath::new(skill_routes))),
            (None, true) => None,
        }
    }

    /// Builds a `Dispatcher` scoped to `context_id`: a filtered tool
    /// registry, a namespaced memory store, and a fresh `Orchestrator`.
    pub async fn build_for_context(&self, context_id: &str, production: bool) -> Result<Dispatcher, AgentError> {
        let cached = self
            .cache
            .get(context_id)
            .filter(|c| c.built_at.elapsed() < self.cache_ttl)
            .map(|c| c.tools.clone());

        let tools = match cached {
            Some(tools) => tools,
            None => {
                let permissions = self.runtime.permissions.for_context(context_id).await?;
                let tools = self
                    .runtime
                    .tool_registry_template
                    .scoped_for_context(&permissions, true);
                self.cache.insert(
                    context_id.to_string(),
                    CachedOrchestrator {
                        built_at: Instant::now(),
                        tools: tools.clone(),
                    },
                );
                tools
            }
        };

        let memory = match &self.runtime.vector_client {
            Some(client) => Some(MemoryStore::new(
                client.clone(),
                MemoryNamespace::new(context_id, self.runtime.settings.memory_collection.clone()),
                production,
            )?),
            None => None,
        };

        let planner = Planner::new(
            self.runtime.llm.clone(),
            self.runtime.settings.planner_max_retries,
            self.runtime.settings.planner_input_char_cap,
        );
        let skill_engine = Arc::new(SkillEngine::new(
            self.runtime.llm.clone(),
            self.runtime.settings.skill_max_tool_calls,
            Duration::from_secs(self.runtime.settings.tool_timeout_s),
        ));
        let step_executor = StepExecutor::new(
            self.runtime.llm.clone(),
            self.runtime.skills.clone(),
            skill_engine.clone(),
            Duration::from_secs(self.runtime.settings.request_timeout_s),
        );
        let step_supervisor = StepSupervisor::new(self.runtime.llm.clone());

        let fast_path = self.fast_path_with_skill_triggers();

        let orchestrator = Orchestrator::new(
            self.runtime.llm.clone(),
            planner,
            step_executor,
            step_supervisor,
            skill_engine,
            fast_path,
            tools,
            self.runtime.skills.clone(),
            memory,
            self.runtime.settings.clone(),
        );

        Ok(Dispatcher::new(
            orchestrator,
            self.runtime.conversations.clone(),
            self.runtime.messages.clone(),
        ))
    }
}

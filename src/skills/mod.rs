//! Skill Registry & Skill Engine (spec §4.8). A Skill is data, not code:
//! frontmatter + body, loaded at startup with a fan-out over skill files.

mod engine;
mod parser;

pub use engine::{HitlSuspension, SkillEngine, SkillRunOutcome};
pub use parser::parse_skill_markdown;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlPolicy {
    /// Tool calls matching these names require human confirmation before
    /// they run.
    pub confirm_tools: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub display_name: String,
    pub system_prompt: String,
    pub permitted_tools: HashSet<String>,
    /// Context fields this skill requires to run, e.g. `cwd`, `repo`.
    pub required_context: Vec<String>,
    pub hitl_policy: Option<HitlPolicy>,
    /// Fast-path trigger patterns this skill registers (§4.10, §6).
    pub trigger_patterns: Vec<String>,
}

/// Catalogue of skills indexed by name and trigger tags.
#[derive(Default)]
pub struct SkillRegistry {
    by_name: HashMap<String, Skill>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads skills in parallel from the given markdown sources and indexes
    /// them by name. A skill referencing a tool outside `known_tools` fails
    /// the whole load fast, per §4.8.
    pub async fn load_parallel(
        sources: Vec<(String, String)>,
        known_tools: &HashSet<String>,
    ) -> Result<Self, crate::error::AgentError> {
        let handles: Vec<_> = sources
            .into_iter()
            .map(|(id, content)| tokio::spawn(async move { parser::parse_skill_markdown(&id, &content) }))
            .collect();

        let mut registry = SkillRegistry::new();
        for handle in handles {
            let skill = handle
                .await
                .map_err(|e| crate::error::AgentError::Internal(e.to_string()))??;
            let unknown: Vec<&String> = skill
                .permitted_tools
                .iter()
                .filter(|t| !known_tools.contains(t.as_str()))
                .collect();
            if !unknown.is_empty() {
                return Err(crate::error::AgentError::InvalidConfiguration(format!(
                    "skill '{}' references unknown tools: {unknown:?}",
                    skill.id
                )));
            }
            registry.by_name.insert(skill.id.clone(), skill);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, skill: Skill) {
        self.by_name.insert(skill.id.clone(), skill);
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.by_name.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &Skill> {
        self.by_name.values()
    }

    pub fn catalogue(&self) -> Vec<(String, String)> {
        self.by_name
            .values()
            .map(|s| (s.id.clone(), s.display_name.clone()))
            .collect()
    }

    pub fn trigger_patterns(&self) -> Vec<(String, String)> {
        self.by_name
            .values()
            .flat_map(|s| s.trigger_patterns.iter().map(move |p| (p.clone(), s.id.clone())))
            .collect()
    }
}

//! Fast-Path Router (spec §4.10): matches a request's prompt against a
//! small, ordered set of compiled patterns and, on a hit, synthesizes a
//! single-step plan that bypasses the planner and plan supervisor entirely.

use regex::Regex;

use crate::plan::{ExecutorKind, Plan, PlanStep};

/// An arg mapper extracts a tool's arguments from a regex's captures.
pub type ArgMapper = fn(&regex::Captures) -> serde_json::Map<String, serde_json::Value>;

fn whole_match_as_prompt(captures: &regex::Captures) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    map.insert("prompt".to_string(), serde_json::Value::String(captures[0].to_string()));
    map
}

#[derive(Clone)]
pub struct FastPathRoute {
    pub description: String,
    pub tool: String,
    executor: ExecutorKind,
    pattern: Regex,
    arg_mapper: ArgMapper,
}

impl FastPathRoute {
    pub fn new(description: impl Into<String>, tool: impl Into<String>, pattern: &str, arg_mapper: ArgMapper) -> Result<Self, regex::Error> {
        Ok(Self {
            description: description.into(),
            tool: tool.into(),
            executor: ExecutorKind::Tool,
            pattern: Regex::new(pattern)?,
            arg_mapper,
        })
    }

    /// A route that dispatches straight to a skill instead of a tool,
    /// sourced from a skill's own `trigger_patterns` frontmatter (§6 "the
    /// fast-path registry may also be extended by skill loader").
    pub fn for_skill(description: impl Into<String>, skill_id: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            description: description.into(),
            tool: skill_id.into(),
            executor: ExecutorKind::Skill,
            pattern: Regex::new(pattern)?,
            arg_mapper: whole_match_as_prompt,
        })
    }
}

/// Ordered, first-match-wins route table. Compiled once at startup and
/// shared read-only across requests (§4.10 "compiled once").
pub struct FastPath {
    routes: Vec<FastPathRoute>,
}

impl FastPath {
    pub fn new(routes: Vec<FastPathRoute>) -> Self {
        Self { routes }
    }

    /// Returns a new route table with `extra` appended after the existing
    /// routes, preserving first-match-wins order (used to layer
    /// skill-sourced trigger patterns on top of the statically configured
    /// routes, §6).
    pub fn extended_with(&self, extra: impl IntoIterator<Item = FastPathRoute>) -> FastPath {
        let mut routes = self.routes.clone();
        routes.extend(extra);
        FastPath { routes }
    }

    /// Scans the prompt in order and returns a synthetic single-step plan on
    /// the first match. O(n) in the number of registered routes.
    pub fn match_prompt(&self, prompt: &str) -> Option<Plan> {
        for route in &self.routes {
            if let Some(captures) = route.pattern.captures(prompt) {
                let args = (route.arg_mapper)(&captures);
                let step = match route.executor {
                    ExecutorKind::Skill => PlanStep::skill("fast-path-1", route.description.clone(), route.tool.clone(), args),
                    _ => PlanStep::tool("fast-path-1", route.description.clone(), route.tool.clone(), args),
                };
                return Some(Plan {
                    description: route.description.clone(),
                    steps: vec![step],
                    warnings: Vec::new(),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_mapper(captures: &regex::Captures) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("url".to_string(), serde_json::Value::String(captures[1].to_string()));
        map
    }

    #[test]
    fn first_match_wins() {
        let routes = vec![
            FastPathRoute::new("fetch a url", "web_fetch", r"fetch (\S+)", url_mapper).unwrap(),
            FastPathRoute::new("catch-all fetch", "web_fetch", r"(\S+)", url_mapper).unwrap(),
        ];
        let fast_path = FastPath::new(routes);
        let plan = fast_path.match_prompt("fetch https://example.com").unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].args.get("url").unwrap(), "https://example.com");
    }

    #[test]
    fn no_match_returns_none() {
        let routes = vec![FastPathRoute::new("fetch a url", "web_fetch", r"^fetch (\S+)$", url_mapper).unwrap()];
        let fast_path = FastPath::new(routes);
        assert!(fast_path.match_prompt("tell me a joke").is_none());
    }

    #[test]
    fn skill_route_synthesizes_a_skill_step() {
        let routes = vec![FastPathRoute::for_skill("notify the team", "email_notifier", r"^notify .+$").unwrap()];
        let fast_path = FastPath::new(routes);
        let plan = fast_path.match_prompt("notify the team the deploy finished").unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].executor, ExecutorKind::Skill);
        assert_eq!(plan.steps[0].target.as_deref(), Some("email_notifier"));
        assert_eq!(plan.steps[0].args.get("prompt").unwrap(), "notify the team the deploy finished");
    }
}

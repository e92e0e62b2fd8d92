//! Plan Supervisor (spec §4.5): validates and rewrites a generated plan
//! before execution.

use std::collections::{HashMap, HashSet};

use crate::plan::Plan;
use crate::skills::SkillRegistry;
use crate::tools::ToolRegistry;

pub struct ValidatedPlan {
    pub plan: Plan,
    pub warnings: Vec<String>,
    pub fatal: Option<String>,
}

pub struct PlanSupervisor;

impl PlanSupervisor {
    /// Validates a plan against the scoped tool registry and skill
    /// registry. Unknown tools fail closed: the plan is not executed
    /// (§4.5, §9 -- this spec resolves the contradictory source note by
    /// always failing closed).
    pub fn validate(mut plan: Plan, tools: &ToolRegistry, skills: &SkillRegistry) -> ValidatedPlan {
        let mut warnings = Vec::new();

        // Renumber duplicate step ids.
        let mut seen: HashSet<String> = HashSet::new();
        for (idx, step) in plan.steps.iter_mut().enumerate() {
            if !seen.insert(step.id.clone()) {
                let new_id = format!("{}-dup{idx}", step.id);
                warnings.push(format!("duplicate step id '{}' renumbered to '{new_id}'", step.id));
                step.id = new_id;
            }
        }

        // Drop dependencies on ids that don't exist in this plan.
        let known_ids: HashSet<String> = plan.steps.iter().map(|s| s.id.clone()).collect();
        for step in plan.steps.iter_mut() {
            let broken: Vec<String> = step
                .depends_on
                .iter()
                .filter(|d| !known_ids.contains(*d))
                .cloned()
                .collect();
            for dep in broken {
                step.depends_on.remove(&dep);
                warnings.push(format!("step '{}' referenced unknown dependency '{dep}', removed", step.id));
            }
        }

        // Fail closed on unknown tools/skills.
        use crate::plan::ExecutorKind;
        for step in &plan.steps {
            match (&step.executor, &step.target) {
                (ExecutorKind::Tool, Some(name)) if !tools.contains(name) => {
                    return ValidatedPlan {
                        fatal: Some(format!("plan references unknown tool '{name}'")),
                        warnings,
                        plan,
                    };
                }
                (ExecutorKind::Skill, Some(name)) if skills.get(name).is_none() => {
                    return ValidatedPlan {
                        fatal: Some(format!("plan references unknown skill '{name}'")),
                        warnings,
                        plan,
                    };
                }
                _ => {}
            }
        }

        // Validate tool-step args against the target tool's declared schema
        // (§4.4 step 4). Flagged as a warning rather than fatal: a minor
        // schema mismatch is still worth surfacing, but the step executor's
        // own retry loop is the enforcement point for args a tool actually
        // rejects.
        for step in &plan.steps {
            if step.executor != ExecutorKind::Tool {
                continue;
            }
            let Some(name) = &step.target else { continue };
            let Some(tool) = tools.get(name) else { continue };
            let schema = tool.parameters();
            let instance = serde_json::Value::Object(step.args.clone());
            if !jsonschema::is_valid(&schema, &instance) {
                warnings.push(format!("step '{}' args do not match tool '{name}''s parameter schema", step.id));
            }
        }

        // Cycle detection (Kahn's algorithm).
        if has_cycle(&plan) {
            return ValidatedPlan {
                fatal: Some("plan's step dependency graph contains a cycle".to_string()),
                warnings,
                plan,
            };
        }

        ValidatedPlan {
            plan,
            warnings,
            fatal: None,
        }
    }
}

fn has_cycle(plan: &Plan) -> bool {
    let mut indegree: HashMap<&str, usize> = plan.steps.iter().map(|s| (s.id.as_str(), 0)).collect();
    for step in &plan.steps {
        for _dep in &step.depends_on {
            *indegree.get_mut(step.id.as_str()).unwrap() += 1;
        }
    }
    let mut queue: Vec<&str> = indegree
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0usize;
    while let Some(id) = queue.pop() {
        visited += 1;
        for step in &plan.steps {
            if step.depends_on.contains(id) {
                let entry = indegree.get_mut(step.id.as_str()).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push(&step.id);
                }
            }
        }
    }
    visited != plan.steps.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;
    use crate::skills::SkillRegistry;
    use crate::tools::{builtin_tools, ToolRegistry};
    use std::time::Duration;

    fn registry() -> ToolRegistry {
        ToolRegistry::from_tools(builtin_tools(), Duration::from_secs(1), 3)
    }

    #[test]
    fn unknown_tool_fails_closed() {
        let plan = Plan {
            description: "d".to_string(),
            steps: vec![PlanStep::tool("s1", "l", "not_a_real_tool", Default::default())],
            warnings: vec![],
        };
        let validated = PlanSupervisor::validate(plan, &registry(), &SkillRegistry::new());
        assert!(validated.fatal.is_some());
    }

    #[test]
    fn cycle_is_fatal() {
        let mut a = PlanStep::tool("a", "a", "web_fetch", Default::default());
        a.depends_on.insert("b".to_string());
        let mut b = PlanStep::tool("b", "b", "web_fetch", Default::default());
        b.depends_on.insert("a".to_string());
        let plan = Plan {
            description: "d".to_string(),
            steps: vec![a, b],
            warnings: vec![],
        };
        let validated = PlanSupervisor::validate(plan, &registry(), &SkillRegistry::new());
        assert!(validated.fatal.is_some());
    }

    #[test]
    fn broken_dependency_is_dropped_not_fatal() {
        let mut step = PlanStep::tool("s1", "l", "web_fetch", Default::default());
        step.depends_on.insert("ghost".to_string());
        let plan = Plan {
            description: "d".to_string(),
            steps: vec![step],
            warnings: vec![],
        };
        let validated = PlanSupervisor::validate(plan, &registry(), &SkillRegistry::new());
        assert!(validated.fatal.is_none());
        assert!(validated.plan.steps[0].depends_on.is_empty());
        assert!(validated.warnings.iter().any(|w| w.contains("unknown dependency")));
    }

    #[test]
    fn args_not_matching_tool_schema_is_a_warning_not_fatal() {
        let step = PlanStep::tool("s1", "l", "web_fetch", Default::default());
        let plan = Plan {
            description: "d".to_string(),
            steps: vec![step],
            warnings: vec![],
        };
        let validated = PlanSupervisor::validate(plan, &registry(), &SkillRegistry::new());
        assert!(validated.fatal.is_none());
        assert!(validated.warnings.iter().any(|w| w.contains("parameter schema")));
    }
}

//! Parses a skill's markdown source: YAML frontmatter between `---` fences
//! followed by a system-prompt body, in the same spirit as the teacher's
//! agent-definition loader.

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::AgentError;

use super::{HitlPolicy, Skill};

#[derive(Debug, Deserialize)]
struct Frontmatter {
    display_name: String,
    #[serde(default)]
    permitted_tools: HashSet<String>,
    #[serde(default)]
    required_context: Vec<String>,
    #[serde(default)]
    confirm_tools: HashSet<String>,
    #[serde(default)]
    trigger_patterns: Vec<String>,
}

/// Parses one skill file's contents. `id` is the skill's file stem, used as
/// its registry key.
pub fn parse_skill_markdown(id: &str, content: &str) -> Result<Skill, AgentError> {
    let content = content.trim_start();
    let rest = content.strip_prefix("---\n").ok_or_else(|| {
        AgentError::InvalidConfiguration(format!("skill '{id}' is missing a frontmatter block"))
    })?;
    let (frontmatter_block, body) = rest.split_once("\n---").ok_or_else(|| {
        AgentError::InvalidConfiguration(format!("skill '{id}' has an unterminated frontmatter block"))
    })?;
    let body = body.trim_start_matches('\n').trim().to_string();

    let frontmatter: Frontmatter = serde_yaml::from_str(frontmatter_block)
        .map_err(|e| AgentError::InvalidConfiguration(format!("skill '{id}' has invalid frontmatter: {e}")))?;

    if body.is_empty() {
        return Err(AgentError::InvalidConfiguration(format!(
            "skill '{id}' has an empty system prompt body"
        )));
    }

    let hitl_policy = if frontmatter.confirm_tools.is_empty() {
        None
    } else {
        Some(HitlPolicy {
            confirm_tools: frontmatter.confirm_tools,
        })
    };

    Ok(Skill {
        id: id.to_string(),
        display_name: frontmatter.display_name,
        system_prompt: body,
        permitted_tools: frontmatter.permitted_tools,
        required_context: frontmatter.required_context,
        hitl_policy,
        trigger_patterns: frontmatter.trigger_patterns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
display_name: Price Watcher
permitted_tools:
  - price_tracker
required_context:
  - user_id
confirm_tools:
  - send_email
trigger_patterns:
  - "watch price of"
---
You help the user track product prices and alert them on drops.
"#;

    #[test]
    fn parses_frontmatter_and_body() {
        let skill = parse_skill_markdown("price_watch", SAMPLE).unwrap();
        assert_eq!(skill.display_name, "Price Watcher");
        assert!(skill.permitted_tools.contains("price_tracker"));
        assert_eq!(skill.required_context, vec!["user_id".to_string()]);
        assert!(skill.hitl_policy.unwrap().confirm_tools.contains("send_email"));
        assert!(skill.system_prompt.contains("track product prices"));
    }

    #[test]
    fn missing_frontmatter_is_rejected() {
        assert!(parse_skill_markdown("bad", "just a body, no frontmatter").is_err());
    }

    #[test]
    fn empty_body_is_rejected() {
        let content = "---\ndisplay_name: X\n---\n\n";
        assert!(parse_skill_markdown("bad", content).is_err());
    }
}

//! Step Supervisor (spec §4.7): decides what happens after a step finishes,
//! either by asking the LLM to judge the outcome or, in degraded mode,
//! falling back to a lenient rule.

use std::sync::Arc;

use crate::error::ErrorKind;
use crate::llm::{LlmClient, LlmMessage};
use crate::plan::StepOutcome;
use crate::step_executor::StepResult;

pub struct StepSupervisor {
    llm: Arc<dyn LlmClient>,
    /// When true, skip the LLM judgement call entirely and use the rule-based
    /// fallback (§4.7 "degraded mode").
    degraded: bool,
}

impl StepSupervisor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, degraded: false }
    }

    pub fn degraded(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, degraded: true }
    }

    /// Evaluates one step's result. Non-fatal `PlanSupervisor` warnings
    /// never reach here and never block execution; only the step's own
    /// outcome is considered (§4.7 "never blocks on non-fatal warnings").
    pub async fn evaluate(&self, step_label: &str, result: &StepResult, retries_used: u32, max_retries: u32) -> StepOutcome {
        match result {
            StepResult::Suspended(_) => StepOutcome::Success,
            StepResult::Success(_) => StepOutcome::Success,
            StepResult::Failed(kind, message) => self.evaluate_failure(step_label, *kind, message, retries_used, max_retries).await,
        }
    }

    async fn evaluate_failure(
        &self,
        step_label: &str,
        kind: ErrorKind,
        message: &str,
        retries_used: u32,
        max_retries: u32,
    ) -> StepOutcome {
        if !kind.retryable() {
            return StepOutcome::Replan(format!("step '{step_label}' failed non-retryably: {message}"));
        }
        if retries_used >= max_retries {
            return StepOutcome::Replan(format!(
                "step '{step_label}' exhausted {max_retries} retries, last error: {message}"
            ));
        }
        if self.degraded {
            return Self::rule_based(kind, message);
        }
        self.llm_judged(step_label, message, retries_used, max_retries).await
    }

    /// Lenient rule: default to success unless the LLM explicitly judges
    /// otherwise (§4.7 "lenient-default-to-success policy").
    fn rule_based(kind: ErrorKind, message: &str) -> StepOutcome {
        match kind {
            ErrorKind::ToolTimeout | ErrorKind::ToolFailed | ErrorKind::ToolRateLimited | ErrorKind::LlmRateLimited => {
                StepOutcome::Retry(message.to_string())
            }
            _ => StepOutcome::Success,
        }
    }

    async fn llm_judged(&self, step_label: &str, message: &str, retries_used: u32, max_retries: u32) -> StepOutcome {
        let prompt = format!(
            "Step '{step_label}' failed (attempt {}/{}): {message}. \
             Reply with exactly one word: RETRY, REPLAN, or ABORT.",
            retries_used + 1,
            max_retries + 1,
        );
        let messages = vec![LlmMessage::system(
            "You are a supervisor deciding how to recover from a failed step.".to_string(),
        ), LlmMessage::user(prompt)];

        match self.llm.complete(&messages, &[]).await {
            Ok(response) => match response.content.trim().to_uppercase().as_str() {
                "RETRY" => StepOutcome::Retry(message.to_string()),
                "ABORT" => StepOutcome::Abort(message.to_string()),
                _ => StepOutcome::Replan(message.to_string()),
            },
            Err(_) => Self::rule_based(ErrorKind::Internal, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use crate::llm::{LlmResponse, Usage};

    fn response(text: &str) -> LlmResponse {
        LlmResponse {
            content: text.to_string(),
            tool_calls: Vec::new(),
            usage: Usage::default(),
        }
    }

    #[tokio::test]
    async fn success_is_always_success() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let sup = StepSupervisor::new(llm);
        let outcome = sup
            .evaluate("s1", &StepResult::Success("ok".to_string()), 0, 2)
            .await;
        assert_eq!(outcome, StepOutcome::Success);
    }

    #[tokio::test]
    async fn non_retryable_failure_forces_replan() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let sup = StepSupervisor::new(llm);
        let outcome = sup
            .evaluate("s1", &StepResult::Failed(ErrorKind::ContextDenied, "nope".to_string()), 0, 2)
            .await;
        assert!(matches!(outcome, StepOutcome::Replan(_)));
    }

    #[tokio::test]
    async fn exhausted_retries_forces_replan_even_if_retryable() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let sup = StepSupervisor::new(llm);
        let outcome = sup
            .evaluate("s1", &StepResult::Failed(ErrorKind::ToolTimeout, "slow".to_string()), 2, 2)
            .await;
        assert!(matches!(outcome, StepOutcome::Replan(_)));
    }

    #[tokio::test]
    async fn degraded_mode_retries_recoverable_failures_without_llm_call() {
        let llm = Arc::new(MockLlmClient::new(vec![]));
        let sup = StepSupervisor::degraded(llm);
        let outcome = sup
            .evaluate("s1", &StepResult::Failed(ErrorKind::ToolFailed, "bad arg".to_string()), 0, 2)
            .await;
        assert!(matches!(outcome, StepOutcome::Retry(_)));
    }

    #[tokio::test]
    async fn llm_judgement_drives_outcome() {
        let llm = Arc::new(MockLlmClient::new(vec![response("ABORT")]));
        let sup = StepSupervisor::new(llm);
        let outcome = sup
            .evaluate("s1", &StepResult::Failed(ErrorKind::ToolFailed, "bad arg".to_string()), 0, 2)
            .await;
        assert!(matches!(outcome, StepOutcome::Abort(_)));
    }
}

//! Question Node: produces the next why question.

use tracing::info;

use super::engine::{invalid, Effect, RcaEngine, Transition};
use super::SessionState;
use crate::error::{EngineError, EngineResult};
use crate::gateway::{DEFAULT_MAX_TOKENS, GENERATION_TEMPERATURE};
use crate::prompts::question_prompt;

impl RcaEngine {
    pub(crate) async fn ask_question(&self, state: &SessionState) -> EngineResult<Transition> {
        if state.current_question.is_some() || state.root_cause.is_some() {
            return Err(invalid(state, "ask a question"));
        }
        if state.iteration >= self.max_depth() {
            return Err(EngineError::InvalidTransition {
                state: format!("the maximum depth of {} is reached", self.max_depth()),
                action: "ask a question".to_string(),
            }
            .into());
        }

        let why_no = state.iteration + 1;
        let prompt = question_prompt(&state.problem, why_no, &state.history);
        let raw = self
            .call(
                "question",
                self.gateway()
                    .generate(&prompt, DEFAULT_MAX_TOKENS, GENERATION_TEMPERATURE),
            )
            .await?;
        let question = strip_why_prefix(&raw);

        let mut next = state.clone();
        next.iteration = why_no;
        next.current_question = Some(question.clone());
        next.retry_count = 0;
        next.pending_retry = false;
        next.suggestion = None;
        next.image_requested = false;
        next.pending_evidence_ref = None;
        next.early_stop_signal = false;

        info!(why_no = why_no, question = %question, "Why question generated");

        Ok(Transition {
            state: next,
            effect: Effect::QuestionAsked { question, why_no },
        })
    }
}

/// Drop a leading `Why N:` echo of the numbering template.
///
/// Tolerates markdown emphasis around the label (`**Why 2:**`). Text without
/// the label is returned trimmed but otherwise unchanged.
pub fn strip_why_prefix(text: &str) -> String {
    let trimmed = text.trim();
    let unbolded = trimmed.trim_start_matches(['*', '#', ' ']);

    let lower = unbolded.to_ascii_lowercase();
    if !lower.starts_with("why") {
        return trimmed.to_string();
    }

    let rest = &unbolded[3..];
    let after_ws = rest.trim_start();
    let digits = after_ws
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 {
        return trimmed.to_string();
    }

    let after_num = after_ws[digits..].trim_start();
    match after_num.strip_prefix(':') {
        Some(question) => {
            let question = question.trim_start_matches(['*', ' ']).trim();
            let question = question.trim_end_matches("**").trim();
            if question.is_empty() {
                trimmed.to_string()
            } else {
                question.to_string()
            }
        }
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_plain_prefix() {
        assert_eq!(
            strip_why_prefix("Why 1: Why did the server crash at 2AM?"),
            "Why did the server crash at 2AM?"
        );
    }

    #[test]
    fn test_strip_bold_prefix() {
        assert_eq!(
            strip_why_prefix("**Why 3:** Why was the backup job skipped?"),
            "Why was the backup job skipped?"
        );
    }

    #[test]
    fn test_question_without_label_is_kept() {
        assert_eq!(
            strip_why_prefix("  Why was the alert not escalated?  "),
            "Why was the alert not escalated?"
        );
    }

    #[test]
    fn test_colon_inside_question_is_kept() {
        assert_eq!(
            strip_why_prefix("What happened at 02:00 on the node?"),
            "What happened at 02:00 on the node?"
        );
    }

    #[test]
    fn test_label_only_is_not_emptied() {
        assert_eq!(strip_why_prefix("Why 2:"), "Why 2:");
    }
}

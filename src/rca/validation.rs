//! Validation Node: scores an answer, may send it back once for improvement,
//! appends accepted answers and runs the early-stop check.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::engine::{invalid, Effect, RcaEngine, Transition};
use super::{SessionState, WhyEntry, MAX_QUALITY_SCORE};
use crate::error::{EngineError, EngineResult};
use crate::gateway::EvidenceRef;
use crate::prompts::{early_stop_prompt, evidence_prompt, validation_prompt};

/// Neutral rating used when the validator's number cannot be read.
pub const DEFAULT_RATING: f64 = 3.0;
/// Answers scoring below this may be sent back for improvement.
pub const IMPROVEMENT_THRESHOLD: f64 = 3.0;
/// Added to the quality score when evidence was attached.
pub const EVIDENCE_BONUS: f64 = 0.3;
/// Improvement round-trips allowed per question.
pub const MAX_RETRIES_PER_QUESTION: u32 = 1;
/// Suggestion used when the validator gives none.
pub const DEFAULT_SUGGESTION: &str = "Please provide more details.";
/// Prefix marking a suggestion that asks for visual evidence.
pub const EVIDENCE_REQUEST_PREFIX: &str = "[Evidence requested] ";

/// Parsed validator response. Unreadable fields fall back to neutral defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub specificity: f64,
    pub relevance: f64,
    pub needs_improvement: bool,
    pub request_evidence: bool,
    pub suggestion: Option<String>,
}

impl Default for ValidationVerdict {
    fn default() -> Self {
        Self {
            specificity: DEFAULT_RATING,
            relevance: DEFAULT_RATING,
            needs_improvement: false,
            request_evidence: false,
            suggestion: None,
        }
    }
}

impl ValidationVerdict {
    /// Parse the line-oriented validator output. Never fails.
    pub fn parse(response: &str) -> Self {
        let mut verdict = Self::default();
        let mut suggestion_lines: Option<Vec<&str>> = None;

        for line in response.lines() {
            let Some((label, value)) = split_label(line) else {
                if let Some(lines) = suggestion_lines.as_mut() {
                    lines.push(line.trim());
                }
                continue;
            };

            match label.as_str() {
                "specificity" => {
                    if let Some(score) = parse_rating(value) {
                        verdict.specificity = score;
                    }
                }
                "relevance" => {
                    if let Some(score) = parse_rating(value) {
                        verdict.relevance = score;
                    }
                }
                "needs improvement" => verdict.needs_improvement = parse_yes(value),
                "request evidence" => verdict.request_evidence = parse_yes(value),
                "suggestion" => suggestion_lines = Some(vec![value.trim()]),
                _ => {
                    if let Some(lines) = suggestion_lines.as_mut() {
                        lines.push(line.trim());
                    }
                }
            }
        }

        verdict.suggestion = suggestion_lines
            .map(|lines| lines.join("\n").trim().to_string())
            .filter(|s| !s.is_empty());
        verdict
    }

    /// `(specificity + relevance) / 2`, plus the evidence bonus, capped at 5.
    pub fn quality_score(&self, with_evidence: bool) -> f64 {
        let base = (self.specificity + self.relevance) / 2.0;
        let score = if with_evidence {
            base + EVIDENCE_BONUS
        } else {
            base
        };
        score.clamp(0.0, MAX_QUALITY_SCORE)
    }
}

/// Early-stop oracle answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseClass {
    /// Process, policy, training, maintenance or organizational failure.
    Systematic,
    /// One-off individual or equipment fault.
    Isolated,
}

impl CauseClass {
    /// Read the classifier's one-word answer. Anything unclear is `Isolated`.
    pub fn parse(response: &str) -> Self {
        let upper = response.trim().to_ascii_uppercase();
        let systematic = upper.contains("SYSTEMATIC") && !upper.contains("NOT SYSTEMATIC");
        let isolated = upper.contains("ISOLATED");
        if systematic && !isolated {
            CauseClass::Systematic
        } else if !systematic && !isolated {
            let first = upper
                .split(|c: char| !c.is_ascii_alphabetic())
                .find(|w| !w.is_empty())
                .unwrap_or("");
            if first == "YES" {
                CauseClass::Systematic
            } else {
                CauseClass::Isolated
            }
        } else {
            CauseClass::Isolated
        }
    }
}

fn split_label(line: &str) -> Option<(String, &str)> {
    let (label, value) = line.split_once(':')?;
    let label = label
        .trim()
        .trim_matches(|c: char| c == '*' || c == '-' || c == '#' || c.is_whitespace())
        .to_ascii_lowercase();
    Some((label, value))
}

fn parse_rating(value: &str) -> Option<f64> {
    let token = value
        .trim_start_matches(|c: char| c == '*' || c == '[' || c.is_whitespace())
        .split(|c: char| c.is_whitespace() || c == '/' || c == ']' || c == '*')
        .next()?;
    let number: String = token
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let rating: f64 = number.parse().ok()?;
    rating.is_finite().then(|| rating.clamp(0.0, MAX_QUALITY_SCORE))
}

fn parse_yes(value: &str) -> bool {
    value.to_ascii_lowercase().contains("yes")
}

impl RcaEngine {
    pub(crate) async fn validate_answer(
        &self,
        state: &SessionState,
        answer: String,
        improved_answer: Option<String>,
        evidence: Option<EvidenceRef>,
    ) -> EngineResult<Transition> {
        let Some(question) = state.current_question.clone() else {
            return Err(invalid(state, "submit an answer"));
        };
        let improved_answer = improved_answer.filter(|a| !a.trim().is_empty());

        // A resubmission after an improvement request is judged on its
        // improved text, which gets the single remaining pass.
        let (answer, improved_answer) = match improved_answer {
            Some(improved) if state.pending_retry => (improved, None),
            other => (answer, other),
        };
        if answer.trim().is_empty() {
            return Err(EngineError::Validation {
                field: "answer".to_string(),
                reason: "Answer cannot be empty".to_string(),
            }
            .into());
        }

        let evidence = match evidence.or_else(|| state.pending_evidence_ref.clone()) {
            Some(reference) if self.evidence_enabled() => Some(reference),
            Some(reference) => {
                warn!(
                    evidence = %reference,
                    "Evidence attached but the gateway has no evidence capability; ignoring"
                );
                None
            }
            None => None,
        };

        let evidence_summary = match &evidence {
            Some(reference) => {
                let prompt = evidence_prompt(&question, &answer);
                let summary = self
                    .call(
                        "analyze_evidence",
                        self.gateway().analyze_evidence(reference, &prompt),
                    )
                    .await?;
                debug!(evidence = %reference, "Evidence analyzed");
                Some(summary)
            }
            None => None,
        };

        let mut next = state.clone();
        next.early_stop_signal = false;
        next.pending_evidence_ref = evidence;

        self.validation_pass(next, question, answer, improved_answer, evidence_summary)
            .await
    }

    /// Score the answer. A supplied improved answer gets one more pass,
    /// bounded by the retry budget.
    async fn validation_pass(
        &self,
        mut next: SessionState,
        question: String,
        mut answer: String,
        mut improved_answer: Option<String>,
        evidence_summary: Option<String>,
    ) -> EngineResult<Transition> {
        let (verdict, quality_score) = loop {
            let augmented = match &evidence_summary {
                Some(summary) => format!("{}\n\nVisual evidence analysis: {}", answer, summary),
                None => answer.clone(),
            };

            let prompt = validation_prompt(&question, &augmented, self.evidence_enabled());
            let response = self
                .call("validate", self.gateway().generate_validation(&prompt))
                .await?;
            let verdict = ValidationVerdict::parse(&response);
            let quality_score = verdict.quality_score(evidence_summary.is_some());

            debug!(
                specificity = verdict.specificity,
                relevance = verdict.relevance,
                quality_score = quality_score,
                needs_improvement = verdict.needs_improvement,
                retry_count = next.retry_count,
                "Answer scored"
            );

            let wants_retry = verdict.needs_improvement
                && quality_score < IMPROVEMENT_THRESHOLD
                && next.retry_count < MAX_RETRIES_PER_QUESTION;
            if !wants_retry {
                break (verdict, quality_score);
            }

            let evidence_requested = verdict.request_evidence && self.evidence_enabled();
            let base = verdict
                .suggestion
                .clone()
                .unwrap_or_else(|| DEFAULT_SUGGESTION.to_string());
            let suggestion = if evidence_requested {
                format!("{}{}", EVIDENCE_REQUEST_PREFIX, base)
            } else {
                base
            };

            next.pending_retry = true;
            next.retry_count += 1;
            next.suggestion = Some(suggestion.clone());
            next.image_requested = evidence_requested;

            match improved_answer.take() {
                Some(improved) => {
                    info!(
                        quality_score = quality_score,
                        "Answer needs improvement; re-validating supplied improved answer"
                    );
                    answer = improved;
                }
                None => {
                    info!(
                        quality_score = quality_score,
                        evidence_requested = evidence_requested,
                        "Answer sent back for improvement"
                    );
                    return Ok(Transition {
                        state: next,
                        effect: Effect::ImprovementRequested {
                            suggestion,
                            evidence_requested,
                            quality_score,
                        },
                    });
                }
            }
        };

        // Retry budget spent: accept whatever the second pass scored.
        let forced = next.retry_count >= MAX_RETRIES_PER_QUESTION
            && verdict.needs_improvement
            && quality_score < IMPROVEMENT_THRESHOLD;

        next.history.push(WhyEntry::new(
            question.clone(),
            answer.clone(),
            quality_score,
            evidence_summary,
        ));
        next.current_question = None;
        next.pending_retry = false;
        next.retry_count = 0;
        next.suggestion = None;
        next.image_requested = false;
        next.pending_evidence_ref = None;

        let early_stop = self.check_early_stop(&next, &question, &answer).await?;
        next.early_stop_signal = early_stop;

        info!(
            why_no = next.iteration,
            quality_score = quality_score,
            forced = forced,
            early_stop = early_stop,
            "Answer accepted"
        );

        Ok(Transition {
            state: next,
            effect: Effect::AnswerAccepted {
                quality_score,
                forced,
                early_stop,
            },
        })
    }

    /// Ask the classifier whether the accepted answer names a systematic cause.
    ///
    /// Only runs from `early_stop_min_iteration` up to (not including) the
    /// maximum depth, where routing extracts regardless.
    async fn check_early_stop(
        &self,
        state: &SessionState,
        question: &str,
        answer: &str,
    ) -> EngineResult<bool> {
        if state.iteration < self.config().early_stop_min_iteration
            || state.iteration >= self.max_depth()
        {
            return Ok(false);
        }

        let prompt = early_stop_prompt(&state.problem, question, answer);
        let response = self
            .call("classify", self.gateway().generate_validation(&prompt))
            .await?;
        let class = CauseClass::parse(&response);
        debug!(class = ?class, iteration = state.iteration, "Early-stop classification");
        Ok(class == CauseClass::Systematic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_response() {
        let verdict = ValidationVerdict::parse(
            "Specificity: 4\nRelevance: 5\nNeeds Improvement: no\nSuggestion: None needed",
        );
        assert_eq!(verdict.specificity, 4.0);
        assert_eq!(verdict.relevance, 5.0);
        assert!(!verdict.needs_improvement);
        assert_eq!(verdict.suggestion.as_deref(), Some("None needed"));
        assert_eq!(verdict.quality_score(false), 4.5);
    }

    #[test]
    fn test_parse_tolerates_decoration() {
        let verdict = ValidationVerdict::parse(
            "**Specificity:** 2/5\n- Relevance: [3]\nNeeds Improvement: Yes\nRequest Evidence: yes\nSuggestion: Name the job.\nInclude its schedule.",
        );
        assert_eq!(verdict.specificity, 2.0);
        assert_eq!(verdict.relevance, 3.0);
        assert!(verdict.needs_improvement);
        assert!(verdict.request_evidence);
        assert_eq!(
            verdict.suggestion.as_deref(),
            Some("Name the job.\nInclude its schedule.")
        );
    }

    #[test]
    fn test_bold_ratings_keep_their_value() {
        let verdict = ValidationVerdict::parse(
            "**Specificity:** 2/5\n**Relevance:** 2/5\n**Needs Improvement:** yes",
        );
        assert_eq!(verdict.specificity, 2.0);
        assert_eq!(verdict.relevance, 2.0);
        assert!(verdict.needs_improvement);
        assert!(verdict.quality_score(false) < IMPROVEMENT_THRESHOLD);
    }

    #[test]
    fn test_parse_falls_back_to_neutral_defaults() {
        let verdict = ValidationVerdict::parse("I think this answer is fine overall.");
        assert_eq!(verdict, ValidationVerdict::default());
        assert_eq!(verdict.quality_score(false), 3.0);

        let verdict = ValidationVerdict::parse("Specificity: high\nRelevance: ???");
        assert_eq!(verdict.specificity, DEFAULT_RATING);
        assert_eq!(verdict.relevance, DEFAULT_RATING);
    }

    #[test]
    fn test_ratings_are_clamped() {
        let verdict = ValidationVerdict::parse("Specificity: 9\nRelevance: 7.5");
        assert_eq!(verdict.specificity, 5.0);
        assert_eq!(verdict.relevance, 5.0);
    }

    #[test]
    fn test_evidence_bonus_is_capped() {
        let verdict = ValidationVerdict {
            specificity: 5.0,
            relevance: 5.0,
            ..ValidationVerdict::default()
        };
        assert_eq!(verdict.quality_score(true), 5.0);

        let verdict = ValidationVerdict {
            specificity: 3.0,
            relevance: 4.0,
            ..ValidationVerdict::default()
        };
        assert!((verdict.quality_score(true) - 3.8).abs() < 1e-9);
    }

    #[test]
    fn test_cause_class_parse() {
        assert_eq!(CauseClass::parse("SYSTEMATIC"), CauseClass::Systematic);
        assert_eq!(CauseClass::parse("systematic."), CauseClass::Systematic);
        assert_eq!(CauseClass::parse("ISOLATED"), CauseClass::Isolated);
        assert_eq!(CauseClass::parse("Yes, it is a process gap"), CauseClass::Systematic);
        assert_eq!(CauseClass::parse("NOT SYSTEMATIC"), CauseClass::Isolated);
        assert_eq!(CauseClass::parse("unsure"), CauseClass::Isolated);
        assert_eq!(
            CauseClass::parse("SYSTEMATIC or ISOLATED? hard to say"),
            CauseClass::Isolated
        );
    }
}

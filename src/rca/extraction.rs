//! Extraction Node and confidence scoring.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::engine::{invalid, Effect, RcaEngine, Transition};
use super::{SessionState, WhyEntry, MAX_QUALITY_SCORE};
use crate::error::EngineResult;
use crate::gateway::{DEFAULT_MAX_TOKENS, GENERATION_TEMPERATURE};
use crate::prompts::root_cause_prompt;

/// Weight of the mean answer quality in the final score.
pub const QUALITY_WEIGHT: f64 = 0.7;
/// Completeness points for reaching the full depth.
pub const COMPLETENESS_MAX: f64 = 20.0;
/// Fixed bonus for a completed why chain.
pub const LOGICAL_FLOW_BONUS: f64 = 10.0;
/// Bonus when any accepted answer carried evidence.
pub const EVIDENCE_CONFIDENCE_BONUS: f64 = 5.0;

/// Individual terms of the confidence score, kept for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    /// Mean quality as a percentage, before weighting.
    pub answer_quality: f64,
    pub completeness: f64,
    pub logical_flow_bonus: f64,
    pub evidence_bonus: f64,
    /// Weighted sum clamped into `[0, 100]`.
    pub total: f64,
}

/// Compute the confidence score for a why chain.
pub fn compute_confidence(history: &[WhyEntry], max_depth: u32) -> ConfidenceBreakdown {
    let answer_quality = if history.is_empty() {
        0.0
    } else {
        let mean =
            history.iter().map(|e| e.quality_score).sum::<f64>() / history.len() as f64;
        mean / MAX_QUALITY_SCORE * 100.0
    };

    let completeness = if max_depth == 0 || history.len() >= max_depth as usize {
        COMPLETENESS_MAX
    } else {
        history.len() as f64 / max_depth as f64 * COMPLETENESS_MAX
    };

    let evidence_bonus = if history.iter().any(|e| e.has_evidence) {
        EVIDENCE_CONFIDENCE_BONUS
    } else {
        0.0
    };

    let total = (answer_quality * QUALITY_WEIGHT
        + completeness
        + LOGICAL_FLOW_BONUS
        + evidence_bonus)
        .clamp(0.0, 100.0);

    ConfidenceBreakdown {
        answer_quality,
        completeness,
        logical_flow_bonus: LOGICAL_FLOW_BONUS,
        evidence_bonus,
        total,
    }
}

impl RcaEngine {
    pub(crate) async fn extract_root_cause(
        &self,
        state: &SessionState,
    ) -> EngineResult<Transition> {
        if state.root_cause.is_some() || !state.is_terminal(self.max_depth()) {
            return Err(invalid(state, "extract the root cause"));
        }

        let prompt = root_cause_prompt(&state.problem, &state.history);
        let root_cause = self
            .call(
                "extract_root_cause",
                self.gateway()
                    .generate(&prompt, DEFAULT_MAX_TOKENS, GENERATION_TEMPERATURE),
            )
            .await?;

        let breakdown = compute_confidence(&state.history, self.max_depth());

        let mut next = state.clone();
        next.root_cause = Some(root_cause.clone());
        next.confidence_score = Some(breakdown.total);

        info!(
            answers = next.history.len(),
            answer_quality = breakdown.answer_quality,
            completeness = breakdown.completeness,
            evidence_bonus = breakdown.evidence_bonus,
            confidence = breakdown.total,
            early_stop = next.early_stop_signal,
            "Root cause extracted"
        );

        Ok(Transition {
            state: next,
            effect: Effect::RootCauseExtracted {
                root_cause,
                confidence: breakdown.total,
            },
        })
    }
}

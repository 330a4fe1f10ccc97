//! The 5 Whys state machine.
//!
//! [`RcaEngine::apply`] is the only way to move a [`SessionState`] forward.
//! It takes the current state by reference and an [`Event`], and returns a
//! [`Transition`] holding the new state plus the observable [`Effect`]. On
//! error nothing is returned, so the caller's state is untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::SessionState;
use crate::config::AnalysisConfig;
use crate::error::{EngineError, EngineResult, GatewayError, GatewayResult};
use crate::gateway::{EvidenceRef, Gateway};

/// Input to a single state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Run the Question Node.
    AskQuestion,
    /// Run the Validation Node on an externally supplied answer.
    SubmitAnswer {
        answer: String,
        improved_answer: Option<String>,
        evidence: Option<EvidenceRef>,
    },
    /// Run the Extraction Node.
    ExtractRootCause,
    /// Run the Report Node.
    GenerateReport,
}

impl Event {
    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Event::AskQuestion => "ask a question",
            Event::SubmitAnswer { .. } => "submit an answer",
            Event::ExtractRootCause => "extract the root cause",
            Event::GenerateReport => "generate the report",
        }
    }
}

/// Observable outcome of a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    QuestionAsked {
        question: String,
        why_no: u32,
    },
    ImprovementRequested {
        suggestion: String,
        evidence_requested: bool,
        quality_score: f64,
    },
    AnswerAccepted {
        quality_score: f64,
        forced: bool,
        early_stop: bool,
    },
    RootCauseExtracted {
        root_cause: String,
        confidence: f64,
    },
    ReportGenerated {
        report: String,
    },
}

/// New state plus what happened.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: SessionState,
    pub effect: Effect,
}

/// Drives sessions through question → validate → extract → report.
///
/// Holds no per-session data; one engine serves any number of sessions.
#[derive(Clone)]
pub struct RcaEngine {
    gateway: Arc<dyn Gateway>,
    config: AnalysisConfig,
    call_timeout: Duration,
}

impl RcaEngine {
    /// Create an engine around an injected gateway.
    pub fn new(gateway: Arc<dyn Gateway>, config: AnalysisConfig, call_timeout: Duration) -> Self {
        Self {
            gateway,
            config,
            call_timeout,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn max_depth(&self) -> u32 {
        self.config.max_depth
    }

    /// Whether attached evidence will be analyzed.
    pub fn evidence_enabled(&self) -> bool {
        self.gateway.supports_evidence()
    }

    #[inline]
    pub(crate) fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }

    /// Apply one event to `state`.
    pub async fn apply(&self, state: &SessionState, event: Event) -> EngineResult<Transition> {
        debug!(
            event = event.name(),
            iteration = state.iteration(),
            status = %state.status(),
            "Applying transition"
        );

        match event {
            Event::AskQuestion => self.ask_question(state).await,
            Event::SubmitAnswer {
                answer,
                improved_answer,
                evidence,
            } => {
                self.validate_answer(state, answer, improved_answer, evidence)
                    .await
            }
            Event::ExtractRootCause => self.extract_root_cause(state).await,
            Event::GenerateReport => self.generate_report(state).await,
        }
    }

    /// Run a gateway call under the engine's timeout and reject empty text.
    pub(crate) async fn call<F>(&self, operation: &str, fut: F) -> GatewayResult<String>
    where
        F: Future<Output = GatewayResult<String>>,
    {
        let text = match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    operation = operation,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "Gateway call timed out"
                );
                return Err(GatewayError::Timeout {
                    timeout_ms: self.call_timeout.as_millis() as u64,
                });
            }
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::EmptyResponse {
                operation: operation.to_string(),
            });
        }
        Ok(trimmed.to_string())
    }
}

/// Build an [`EngineError::InvalidTransition`] for `action` attempted in `state`.
pub(crate) fn invalid(state: &SessionState, action: &str) -> crate::error::AppError {
    let description = match state.status() {
        super::SessionStatus::Questioning => "a question is awaiting its answer".to_string(),
        super::SessionStatus::AwaitingImprovement => "an improved answer is awaited".to_string(),
        super::SessionStatus::Idle if state.history().is_empty() => {
            "no question is pending".to_string()
        }
        super::SessionStatus::Idle => format!(
            "no question is pending ({} of the why sequence answered)",
            state.history().len()
        ),
        super::SessionStatus::RootCauseExtracted => {
            "the root cause is already extracted".to_string()
        }
        super::SessionStatus::Completed => "the analysis is completed".to_string(),
    };

    EngineError::InvalidTransition {
        state: description,
        action: action.to_string(),
    }
    .into()
}

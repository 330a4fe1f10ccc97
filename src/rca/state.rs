//! Session State and the accepted-answer record.
//!
//! The state is only ever changed through [`crate::rca::RcaEngine::apply`],
//! which works on a copy and hands back the new value. Fields are readable
//! from anywhere but writable only inside this crate.

use serde::{Deserialize, Serialize};

/// Upper bound of a per-answer quality score.
pub const MAX_QUALITY_SCORE: f64 = 5.0;

/// One accepted question/answer round. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhyEntry {
    pub question: String,
    pub answer: String,
    /// Combined specificity/relevance rating in `[0, 5]`.
    pub quality_score: f64,
    pub has_evidence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_summary: Option<String>,
}

impl WhyEntry {
    /// Build an entry; the quality score is clamped into `[0, 5]`.
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        quality_score: f64,
        evidence_summary: Option<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            quality_score: quality_score.clamp(0.0, MAX_QUALITY_SCORE),
            has_evidence: evidence_summary.is_some(),
            evidence_summary,
        }
    }
}

/// Coarse lifecycle position derived from the state fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// A question is out and waiting for its first answer.
    Questioning,
    /// The last answer was sent back for improvement.
    AwaitingImprovement,
    /// Between questions; the next step is routing.
    Idle,
    /// Root cause and confidence are set; report pending.
    RootCauseExtracted,
    /// Report generated.
    Completed,
}

impl SessionStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Questioning => "questioning",
            SessionStatus::AwaitingImprovement => "awaiting_improvement",
            SessionStatus::Idle => "idle",
            SessionStatus::RootCauseExtracted => "root_cause_extracted",
            SessionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "questioning" => Ok(SessionStatus::Questioning),
            "awaiting_improvement" => Ok(SessionStatus::AwaitingImprovement),
            "idle" => Ok(SessionStatus::Idle),
            "root_cause_extracted" => Ok(SessionStatus::RootCauseExtracted),
            "completed" => Ok(SessionStatus::Completed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// The single record threaded through the 5 Whys workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub(crate) problem: String,
    pub(crate) iteration: u32,
    pub(crate) history: Vec<WhyEntry>,
    pub(crate) current_question: Option<String>,
    pub(crate) pending_retry: bool,
    pub(crate) retry_count: u32,
    /// Last improvement suggestion, kept while `pending_retry` is set.
    pub(crate) suggestion: Option<String>,
    pub(crate) root_cause: Option<String>,
    pub(crate) confidence_score: Option<f64>,
    pub(crate) report: Option<String>,
    pub(crate) early_stop_signal: bool,
    pub(crate) pending_evidence_ref: Option<crate::gateway::EvidenceRef>,
    pub(crate) image_requested: bool,
}

impl SessionState {
    /// Fresh state for a new analysis.
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problem: problem.into(),
            iteration: 0,
            history: Vec::new(),
            current_question: None,
            pending_retry: false,
            retry_count: 0,
            suggestion: None,
            root_cause: None,
            confidence_score: None,
            report: None,
            early_stop_signal: false,
            pending_evidence_ref: None,
            image_requested: false,
        }
    }

    pub fn problem(&self) -> &str {
        &self.problem
    }

    /// Number of questions asked so far.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Accepted answers in order.
    pub fn history(&self) -> &[WhyEntry] {
        &self.history
    }

    pub fn current_question(&self) -> Option<&str> {
        self.current_question.as_deref()
    }

    pub fn pending_retry(&self) -> bool {
        self.pending_retry
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    pub fn root_cause(&self) -> Option<&str> {
        self.root_cause.as_deref()
    }

    pub fn confidence_score(&self) -> Option<f64> {
        self.confidence_score
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn early_stop_signal(&self) -> bool {
        self.early_stop_signal
    }

    pub fn pending_evidence_ref(&self) -> Option<&crate::gateway::EvidenceRef> {
        self.pending_evidence_ref.as_ref()
    }

    /// Whether the last validation asked for visual evidence.
    pub fn image_requested(&self) -> bool {
        self.image_requested
    }

    /// True once any accepted answer carried evidence.
    pub fn has_evidence(&self) -> bool {
        self.history.iter().any(|e| e.has_evidence)
    }

    /// Termination predicate gating extraction.
    pub fn is_terminal(&self, max_depth: u32) -> bool {
        self.current_question.is_none()
            && !self.history.is_empty()
            && (self.early_stop_signal || self.iteration >= max_depth)
    }

    pub fn status(&self) -> SessionStatus {
        if self.report.is_some() {
            SessionStatus::Completed
        } else if self.root_cause.is_some() {
            SessionStatus::RootCauseExtracted
        } else if self.pending_retry {
            SessionStatus::AwaitingImprovement
        } else if self.current_question.is_some() {
            SessionStatus::Questioning
        } else {
            SessionStatus::Idle
        }
    }
}

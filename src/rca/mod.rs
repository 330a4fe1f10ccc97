//! 5 Whys root cause analysis.
//!
//! A session moves through Question → Validation → (Question | Extraction) →
//! Report. Each step is one [`Event`] applied by [`RcaEngine::apply`];
//! [`route`] picks the next node after a question or validation.
//! [`RcaService`] wraps the engine with persistence, per-session
//! serialization and markdown export.

mod engine;
mod extraction;
mod question;
mod report;
mod routing;
mod service;
mod state;
mod validation;

pub use engine::{Effect, Event, RcaEngine, Transition};
pub use extraction::{
    compute_confidence, ConfidenceBreakdown, COMPLETENESS_MAX, EVIDENCE_CONFIDENCE_BONUS,
    LOGICAL_FLOW_BONUS, QUALITY_WEIGHT,
};
pub use question::strip_why_prefix;
pub use report::{assemble_report, split_sections, ReportSection, SINGLE_REPORT_MAX_TOKENS};
pub use routing::{route, Route};
pub use service::{
    AnswerOutcome, GeneratedReport, RcaService, ReportView, SessionView, StartOutcome,
};
pub use state::{SessionState, SessionStatus, WhyEntry, MAX_QUALITY_SCORE};
pub use validation::{
    CauseClass, ValidationVerdict, DEFAULT_SUGGESTION, EVIDENCE_BONUS, EVIDENCE_REQUEST_PREFIX,
    IMPROVEMENT_THRESHOLD, MAX_RETRIES_PER_QUESTION,
};

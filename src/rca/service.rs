//! Session-level operations over the engine.
//!
//! Every operation loads the stored state, applies one or more engine
//! transitions and persists the result only once all of them succeeded.
//! Calls for the same session id are serialized with a per-session lock.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::{route, Effect, Event, RcaEngine, Route, SessionState, SessionStatus};
use crate::error::{AppError, AppResult, EngineError, StorageError};
use crate::export::ReportExporter;
use crate::gateway::EvidenceRef;
use crate::storage::{Invocation, SessionRecord, SqliteStorage, Storage};

/// Result of starting a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub session_id: String,
    pub question: String,
    pub why_no: u32,
}

/// Result of submitting an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Answer accepted; the next why question is ready.
    NextQuestion {
        question: String,
        why_no: u32,
        quality_score: f64,
    },
    /// Answer sent back; resubmit for the same question.
    NeedsImprovement {
        question: String,
        why_no: u32,
        suggestion: String,
        evidence_requested: bool,
        quality_score: f64,
    },
    /// Analysis finished; a report can be generated.
    RootCauseExtracted {
        root_cause: String,
        confidence_score: f64,
        why_count: usize,
        early_stop: bool,
    },
}

/// Result of report generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedReport {
    pub session_id: String,
    pub report: String,
    pub confidence_score: f64,
    pub root_cause: String,
    pub export_path: String,
}

/// Read-only view of a session's report fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportView {
    pub session_id: String,
    pub status: SessionStatus,
    pub report: Option<String>,
    pub confidence_score: Option<f64>,
    pub root_cause: Option<String>,
    pub export_path: Option<String>,
}

/// Read-only snapshot of a whole session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: String,
    pub status: SessionStatus,
    /// Next node the session is waiting on.
    pub next_step: Route,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: SessionState,
}

type SessionLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Exclusive hold on one session. The map entry is dropped with the last
/// holder so the map only tracks sessions with calls in flight.
struct SessionLease<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Map, lease and guard: no other caller holds or awaits this lock.
        if Arc::strong_count(&self.lock) == 3 {
            locks.remove(&self.session_id);
        }
    }
}

/// 5 Whys sessions backed by SQLite.
pub struct RcaService {
    engine: RcaEngine,
    storage: SqliteStorage,
    exporter: ReportExporter,
    locks: SessionLocks,
}

impl RcaService {
    pub fn new(engine: RcaEngine, storage: SqliteStorage, exporter: ReportExporter) -> Self {
        Self {
            engine,
            storage,
            exporter,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &RcaEngine {
        &self.engine
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Start a session and ask the first why question.
    pub async fn start_session(&self, problem: &str) -> AppResult<StartOutcome> {
        let problem = problem.trim();
        if problem.is_empty() {
            return Err(EngineError::Validation {
                field: "problem".to_string(),
                reason: "Problem statement cannot be empty".to_string(),
            }
            .into());
        }

        let record = SessionRecord::new(SessionState::new(problem));
        let session_id = record.id.clone();
        let _lease = self.lease(&session_id).await;

        let input = json!({ "problem": problem });
        self.instrumented("start_session", &session_id, input, async {
            let transition = self.engine.apply(&record.state, Event::AskQuestion).await?;
            let (question, why_no) = match transition.effect {
                Effect::QuestionAsked { question, why_no } => (question, why_no),
                other => return Err(unexpected(&other)),
            };

            let record = record.with_state(transition.state);
            self.storage.create_session(&record).await?;

            info!(session_id = %record.id, "Analysis session started");
            Ok(StartOutcome {
                session_id: record.id,
                question,
                why_no,
            })
        })
        .await
    }

    /// Validate an answer and advance the session as far as it can go.
    pub async fn submit_answer(
        &self,
        session_id: &str,
        answer: &str,
        improved_answer: Option<&str>,
        evidence: Option<EvidenceRef>,
    ) -> AppResult<AnswerOutcome> {
        if answer.trim().is_empty() {
            return Err(EngineError::Validation {
                field: "answer".to_string(),
                reason: "Answer cannot be empty".to_string(),
            }
            .into());
        }

        let _lease = self.lease(session_id).await;

        let input = json!({
            "answer": answer,
            "improved_answer": improved_answer,
            "evidence_ref": evidence.as_ref().map(EvidenceRef::as_str),
        });
        self.instrumented("submit_answer", session_id, input, async {
            let record = self.load(session_id).await?;

            let event = Event::SubmitAnswer {
                answer: answer.to_string(),
                improved_answer: improved_answer.map(str::to_string),
                evidence,
            };
            let validated = self.engine.apply(&record.state, event).await?;

            let (state, outcome) = match validated.effect {
                Effect::ImprovementRequested {
                    suggestion,
                    evidence_requested,
                    quality_score,
                } => {
                    let outcome = AnswerOutcome::NeedsImprovement {
                        question: validated
                            .state
                            .current_question()
                            .unwrap_or_default()
                            .to_string(),
                        why_no: validated.state.iteration(),
                        suggestion,
                        evidence_requested,
                        quality_score,
                    };
                    (validated.state, outcome)
                }
                Effect::AnswerAccepted { quality_score, .. } => {
                    self.advance(validated.state, quality_score).await?
                }
                other => return Err(unexpected(&other)),
            };

            self.storage.update_session(&record.with_state(state)).await?;
            Ok(outcome)
        })
        .await
    }

    /// Route an accepted answer to the next question or to extraction.
    async fn advance(
        &self,
        state: SessionState,
        quality_score: f64,
    ) -> AppResult<(SessionState, AnswerOutcome)> {
        match route(&state, self.engine.max_depth()) {
            Route::Continue => {
                let transition = self.engine.apply(&state, Event::AskQuestion).await?;
                match transition.effect {
                    Effect::QuestionAsked { question, why_no } => Ok((
                        transition.state,
                        AnswerOutcome::NextQuestion {
                            question,
                            why_no,
                            quality_score,
                        },
                    )),
                    other => Err(unexpected(&other)),
                }
            }
            Route::Extract => {
                let transition = self.engine.apply(&state, Event::ExtractRootCause).await?;
                match transition.effect {
                    Effect::RootCauseExtracted {
                        root_cause,
                        confidence,
                    } => {
                        let outcome = AnswerOutcome::RootCauseExtracted {
                            root_cause,
                            confidence_score: confidence,
                            why_count: transition.state.history().len(),
                            early_stop: transition.state.early_stop_signal(),
                        };
                        Ok((transition.state, outcome))
                    }
                    other => Err(unexpected(&other)),
                }
            }
            Route::Validate => Err(AppError::Internal {
                message: "accepted answer left a question pending".to_string(),
            }),
        }
    }

    /// Generate the report for an extracted session and export it as markdown.
    pub async fn generate_report(&self, session_id: &str) -> AppResult<GeneratedReport> {
        let _lease = self.lease(session_id).await;

        self.instrumented("generate_report", session_id, json!({}), async {
            let record = self.load(session_id).await?;
            let transition = self.engine.apply(&record.state, Event::GenerateReport).await?;
            let report = match transition.effect {
                Effect::ReportGenerated { report } => report,
                other => return Err(unexpected(&other)),
            };

            let path = self.exporter.export(session_id, &transition.state).await?;

            let state = transition.state;
            let result = GeneratedReport {
                session_id: session_id.to_string(),
                report,
                confidence_score: state.confidence_score().unwrap_or_default(),
                root_cause: state.root_cause().unwrap_or_default().to_string(),
                export_path: path.display().to_string(),
            };
            self.storage.update_session(&record.with_state(state)).await?;
            Ok(result)
        })
        .await
    }

    /// Report fields of a session; empty until they are produced.
    pub async fn get_report(&self, session_id: &str) -> AppResult<ReportView> {
        let record = self.load(session_id).await?;
        let state = &record.state;
        let export_path = state
            .report()
            .map(|_| self.report_path(session_id).display().to_string());

        Ok(ReportView {
            session_id: record.id.clone(),
            status: record.status,
            report: state.report().map(str::to_string),
            confidence_score: state.confidence_score(),
            root_cause: state.root_cause().map(str::to_string),
            export_path,
        })
    }

    /// Full snapshot of a session.
    pub async fn get_session(&self, session_id: &str) -> AppResult<SessionView> {
        let record = self.load(session_id).await?;
        Ok(SessionView {
            next_step: route(&record.state, self.engine.max_depth()),
            session_id: record.id,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            state: record.state,
        })
    }

    /// Delete a session and its invocation log.
    pub async fn cleanup_session(&self, session_id: &str) -> AppResult<()> {
        let _lease = self.lease(session_id).await;

        self.storage.delete_session(session_id).await?;

        info!(session_id = %session_id, "Session cleaned up");
        Ok(())
    }

    fn report_path(&self, session_id: &str) -> PathBuf {
        self.exporter.path_for(session_id)
    }

    async fn load(&self, session_id: &str) -> AppResult<SessionRecord> {
        self.storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| {
                StorageError::SessionNotFound {
                    session_id: session_id.to_string(),
                }
                .into()
            })
    }

    async fn lease(&self, session_id: &str) -> SessionLease<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        SessionLease {
            locks: &self.locks,
            session_id: session_id.to_string(),
            lock,
            _guard: guard,
        }
    }

    /// Run an operation and record it in the invocation log.
    async fn instrumented<T, F>(
        &self,
        tool_name: &str,
        session_id: &str,
        input: serde_json::Value,
        operation: F,
    ) -> AppResult<T>
    where
        T: Serialize,
        F: Future<Output = AppResult<T>>,
    {
        let start = Instant::now();
        let result = operation.await;
        let latency = start.elapsed().as_millis() as i64;

        let invocation = Invocation::new(tool_name, input).with_session(session_id);
        let invocation = match &result {
            Ok(output) => {
                info!(
                    tool = tool_name,
                    session_id = %session_id,
                    latency_ms = latency,
                    "Operation completed"
                );
                invocation.success(serde_json::to_value(output).unwrap_or_default(), latency)
            }
            Err(e) => {
                warn!(
                    tool = tool_name,
                    session_id = %session_id,
                    latency_ms = latency,
                    error = %e,
                    "Operation failed"
                );
                invocation.failure(e.to_string(), latency)
            }
        };

        if let Err(e) = self.storage.log_invocation(&invocation).await {
            debug!(error = %e, "Failed to log invocation");
        }

        result
    }
}

fn unexpected(effect: &Effect) -> AppError {
    AppError::Internal {
        message: format!("unexpected transition effect: {:?}", effect),
    }
}

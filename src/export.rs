//! Markdown export of completed analyses.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::error::{ExportError, ExportResult};
use crate::rca::SessionState;

/// Render the persisted report document.
///
/// Returns `None` while the session has no report or confidence score.
pub fn render_markdown(state: &SessionState, generated_at: &DateTime<Local>) -> Option<String> {
    let report = state.report()?;
    let confidence = state.confidence_score()?;

    let mut doc = String::new();
    doc.push_str("# Root Cause Analysis Report\n");
    doc.push_str(&format!(
        "**Generated:** {}\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    doc.push_str(&format!("## Problem Statement\n{}\n\n", state.problem()));

    if state.has_evidence() {
        doc.push_str("## Evidence\n");
        for (i, entry) in state.history().iter().enumerate() {
            if let Some(summary) = &entry.evidence_summary {
                doc.push_str(&format!("- Why {}: {}\n", i + 1, summary));
            }
        }
        doc.push('\n');
    }

    doc.push_str("---\n\n");
    doc.push_str(report);
    doc.push_str("\n\n---\n\n");
    doc.push_str(&format!("**Overall Confidence Score:** {:.1}%\n", confidence));
    Some(doc)
}

/// Writes report documents into a directory.
#[derive(Debug, Clone)]
pub struct ReportExporter {
    dir: PathBuf,
}

impl ReportExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the report for `session_id` is written to.
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("rca_report_{}.md", session_id))
    }

    /// Write the report for a completed session, replacing any earlier export.
    pub async fn export(&self, session_id: &str, state: &SessionState) -> ExportResult<PathBuf> {
        let doc = render_markdown(state, &Local::now()).ok_or_else(|| {
            ExportError::MissingReport {
                session_id: session_id.to_string(),
            }
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ExportError::Io {
                path: self.dir.display().to_string(),
                source,
            })?;

        let path = self.path_for(session_id);
        tokio::fs::write(&path, doc.as_bytes())
            .await
            .map_err(|source| ExportError::Io {
                path: path.display().to_string(),
                source,
            })?;

        info!(session_id = %session_id, path = %path.display(), "Report exported");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rca::WhyEntry;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn completed(evidence: bool) -> SessionState {
        let mut state = SessionState::new("Server crashed at 2AM");
        state.iteration = 2;
        state.history.push(WhyEntry::new("Why 1?", "OOM", 4.0, None));
        state.history.push(WhyEntry::new(
            "Why 2?",
            "Leak",
            4.0,
            evidence.then(|| "Heap graph climbs steadily".to_string()),
        ));
        state.root_cause = Some("Unbounded cache".to_string());
        state.confidence_score = Some(86.0);
        state.report = Some("## 1. EXECUTIVE SUMMARY\n\nBody\n\n---\n".to_string());
        state
    }

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_render_without_evidence() {
        let doc = render_markdown(&completed(false), &timestamp()).unwrap();
        assert_eq!(
            doc,
            "# Root Cause Analysis Report\n\
             **Generated:** 2024-03-05 14:07:09\n\n\
             ## Problem Statement\nServer crashed at 2AM\n\n\
             ---\n\n\
             ## 1. EXECUTIVE SUMMARY\n\nBody\n\n---\n\
             \n\n---\n\n\
             **Overall Confidence Score:** 86.0%\n"
        );
    }

    #[test]
    fn test_render_lists_evidence() {
        let doc = render_markdown(&completed(true), &timestamp()).unwrap();
        assert!(doc.contains("## Evidence\n- Why 2: Heap graph climbs steadily\n\n---\n\n"));
    }

    #[test]
    fn test_render_requires_report() {
        let mut state = completed(false);
        state.report = None;
        assert!(render_markdown(&state, &timestamp()).is_none());
    }

    #[tokio::test]
    async fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ReportExporter::new(dir.path().join("reports"));

        let path = exporter.export("abc", &completed(false)).await.unwrap();

        assert_eq!(path, dir.path().join("reports").join("rca_report_abc.md"));
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.starts_with("# Root Cause Analysis Report\n"));
        assert!(written.ends_with("**Overall Confidence Score:** 86.0%\n"));
    }

    #[tokio::test]
    async fn test_export_without_report_fails() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ReportExporter::new(dir.path());
        let err = exporter
            .export("abc", &SessionState::new("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::MissingReport { .. }));
    }
}

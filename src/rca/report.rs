//! Report Node: section-wise synthesis of the final RCA report.
//!
//! Both strategies end in [`assemble_report`], so the headings and their order
//! are identical whichever one produced the section bodies.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::engine::{invalid, Effect, RcaEngine, Transition};
use super::SessionState;
use crate::config::ReportStrategy;
use crate::error::EngineResult;
use crate::gateway::GENERATION_TEMPERATURE;
use crate::prompts::{full_report_prompt, report_section_prompt};

/// Token budget for the single-call strategy.
pub const SINGLE_REPORT_MAX_TOKENS: u32 = 1600;

/// Separator closing every section.
const SECTION_RULE: &str = "---";

/// The four report sections, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    ExecutiveSummary,
    DetailedAnalysis,
    CorrectiveActions,
    Recommendations,
}

impl ReportSection {
    /// Every section in the fixed emission order.
    pub const ALL: [ReportSection; 4] = [
        ReportSection::ExecutiveSummary,
        ReportSection::DetailedAnalysis,
        ReportSection::CorrectiveActions,
        ReportSection::Recommendations,
    ];

    /// 1-based position in the report.
    pub fn number(&self) -> usize {
        match self {
            ReportSection::ExecutiveSummary => 1,
            ReportSection::DetailedAnalysis => 2,
            ReportSection::CorrectiveActions => 3,
            ReportSection::Recommendations => 4,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportSection::ExecutiveSummary => "EXECUTIVE SUMMARY",
            ReportSection::DetailedAnalysis => "DETAILED ANALYSIS",
            ReportSection::CorrectiveActions => "CORRECTIVE AND PREVENTIVE ACTIONS",
            ReportSection::Recommendations => "RECOMMENDATIONS AND FOLLOW-UP",
        }
    }

    /// Markdown heading line, e.g. `## 1. EXECUTIVE SUMMARY`.
    pub fn heading(&self) -> String {
        format!("## {}. {}", self.number(), self.title())
    }

    /// Section-specific writing instruction appended to the shared context.
    pub fn instruction(&self) -> &'static str {
        match self {
            ReportSection::ExecutiveSummary => {
                "Write the EXECUTIVE SUMMARY section for this RCA report. Include:
- Brief incident overview (2-3 sentences)
- High-level root cause statement
- Overall impact

Keep it concise and executive-focused."
            }
            ReportSection::DetailedAnalysis => {
                "Write the DETAILED ANALYSIS section. Include:
- Problem Statement with impact details
- The 5 Whys methodology application
- Step-by-step breakdown of each Why and answer
- Root cause identification with confidence reasoning

Be thorough and technical."
            }
            ReportSection::CorrectiveActions => {
                "Write the CORRECTIVE AND PREVENTIVE ACTIONS section. Include:
- Immediate corrective actions (3 specific items)
- Long-term preventive measures (3 specific items)
- Each action should be concrete and actionable

Focus on practical solutions."
            }
            ReportSection::Recommendations => {
                "Write the RECOMMENDATIONS AND FOLLOW-UP section. Include:
- Process improvement recommendations (2-3 items)
- Monitoring and alerting improvements
- Follow-up actions and review schedule
- Key learnings

Make it actionable and forward-looking."
            }
        }
    }

    /// Generation budget for the per-section strategy.
    pub fn max_tokens(&self) -> u32 {
        match self {
            ReportSection::DetailedAnalysis => 500,
            _ => 400,
        }
    }

    /// Recognize a heading line for this section. Numbering and emphasis are optional.
    fn matches_heading(&self, line: &str) -> bool {
        let cleaned = line
            .trim()
            .trim_start_matches('#')
            .trim()
            .trim_matches('*')
            .trim();
        let without_number = match cleaned.split_once(". ") {
            Some((n, rest)) if n.chars().all(|c| c.is_ascii_digit()) => rest,
            _ => cleaned,
        };
        without_number
            .trim_end_matches(':')
            .eq_ignore_ascii_case(self.title())
    }

    fn from_heading(line: &str) -> Option<ReportSection> {
        if !line.trim_start().starts_with('#') && !line.trim_start().starts_with("**") {
            return None;
        }
        Self::ALL.into_iter().find(|s| s.matches_heading(line))
    }
}

/// Concatenate section bodies under their headings in fixed order.
///
/// Each section is `heading`, blank line, body, blank line, `---`.
pub fn assemble_report(bodies: &[(ReportSection, String)]) -> String {
    let mut report = String::new();
    for (i, section) in ReportSection::ALL.iter().enumerate() {
        let body = bodies
            .iter()
            .find(|(s, _)| s == section)
            .map(|(_, b)| clean_body(*section, b))
            .unwrap_or_default();
        if i > 0 {
            report.push('\n');
        }
        report.push_str(&section.heading());
        report.push_str("\n\n");
        report.push_str(&body);
        report.push_str("\n\n");
        report.push_str(SECTION_RULE);
        report.push('\n');
    }
    report
}

/// Split report text on recognized section headings.
///
/// Returns the non-empty sections found, in the order they appear. Text before
/// the first heading is dropped. A repeated heading keeps its first body.
pub fn split_sections(text: &str) -> Vec<(ReportSection, String)> {
    let mut sections: Vec<(ReportSection, String)> = Vec::new();
    let mut current: Option<(ReportSection, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(section) = ReportSection::from_heading(line) {
            push_section(current.take(), &mut sections);
            current = Some((section, Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    push_section(current, &mut sections);
    sections
}

fn push_section(
    current: Option<(ReportSection, Vec<&str>)>,
    sections: &mut Vec<(ReportSection, String)>,
) {
    if let Some((section, lines)) = current {
        let body = clean_body(section, &lines.join("\n"));
        if !body.is_empty() && !sections.iter().any(|(s, _)| *s == section) {
            sections.push((section, body));
        }
    }
}

/// Trim a body, dropping an echoed heading and trailing horizontal rules.
fn clean_body(section: ReportSection, body: &str) -> String {
    let mut text = body.trim();
    if let Some(first) = text.lines().next() {
        if section.matches_heading(first) && first.trim_start().starts_with(['#', '*']) {
            text = text[first.len()..].trim();
        }
    }
    while let Some(stripped) = text.strip_suffix(SECTION_RULE) {
        text = stripped.trim_end();
    }
    text.to_string()
}

impl RcaEngine {
    pub(crate) async fn generate_report(&self, state: &SessionState) -> EngineResult<Transition> {
        let (Some(root_cause), Some(confidence)) =
            (state.root_cause.as_deref(), state.confidence_score)
        else {
            return Err(invalid(state, "generate the report"));
        };
        if state.report.is_some() {
            return Err(invalid(state, "generate the report"));
        }

        let bodies = match self.config().report_strategy {
            ReportStrategy::Sections => {
                self.generate_sections(state, root_cause, confidence, &ReportSection::ALL)
                    .await?
            }
            ReportStrategy::Single => self.generate_single(state, root_cause, confidence).await?,
        };

        let report = assemble_report(&bodies);

        let mut next = state.clone();
        next.report = Some(report.clone());

        info!(
            strategy = ?self.config().report_strategy,
            report_len = report.len(),
            confidence = confidence,
            "Report generated"
        );

        Ok(Transition {
            state: next,
            effect: Effect::ReportGenerated { report },
        })
    }

    async fn generate_sections(
        &self,
        state: &SessionState,
        root_cause: &str,
        confidence: f64,
        sections: &[ReportSection],
    ) -> EngineResult<Vec<(ReportSection, String)>> {
        let mut bodies = Vec::with_capacity(sections.len());
        for (i, section) in sections.iter().enumerate() {
            info!(
                section = section.title(),
                step = i + 1,
                total = sections.len(),
                "Generating report section"
            );
            let prompt = report_section_prompt(
                &state.problem,
                &state.history,
                root_cause,
                confidence,
                *section,
            );
            let body = self
                .call(
                    section.title(),
                    self.gateway()
                        .generate(&prompt, section.max_tokens(), GENERATION_TEMPERATURE),
                )
                .await?;
            bodies.push((*section, body));
        }
        Ok(bodies)
    }

    /// One large call; sections the output lacks are generated individually.
    async fn generate_single(
        &self,
        state: &SessionState,
        root_cause: &str,
        confidence: f64,
    ) -> EngineResult<Vec<(ReportSection, String)>> {
        let prompt = full_report_prompt(&state.problem, &state.history, root_cause, confidence);
        let text = self
            .call(
                "report",
                self.gateway()
                    .generate(&prompt, SINGLE_REPORT_MAX_TOKENS, GENERATION_TEMPERATURE),
            )
            .await?;

        let mut bodies = split_sections(&text);
        let missing: Vec<ReportSection> = ReportSection::ALL
            .into_iter()
            .filter(|s| !bodies.iter().any(|(found, _)| found == s))
            .collect();

        if !missing.is_empty() {
            warn!(
                missing = missing.len(),
                "Single-call report is missing sections; generating them individually"
            );
            let extra = self
                .generate_sections(state, root_cause, confidence, &missing)
                .await?;
            bodies.extend(extra);
        }
        Ok(bodies)
    }
}

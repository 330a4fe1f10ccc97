//! Centralized prompt definitions for the 5 Whys session.
//!
//! Every function here is pure: it maps session data to prompt text. The
//! response formats requested here are the ones parsed by
//! [`crate::rca::validation`] and [`crate::rca::report`].

use crate::rca::{ReportSection, WhyEntry};

/// System prompt installed on the generator pipe.
pub const GENERATOR_SYSTEM_PROMPT: &str = r#"You are a facilitator running a Root Cause Analysis with the 5 Whys technique.

Guidelines:
- Ask one direct question at a time
- Build each question on the previous answer
- Move from symptoms toward process, policy and organizational causes
- Keep root cause statements specific and actionable
- Write reports in plain markdown without restating the section heading unless asked"#;

/// System prompt installed on the validator pipe.
pub const VALIDATOR_SYSTEM_PROMPT: &str = r#"You are a strict reviewer of answers given during a Root Cause Analysis.

Always answer in the exact line-oriented format requested by the user message.
Do not add commentary outside of that format."#;

/// System prompt installed on the evidence analysis pipe.
pub const EVIDENCE_SYSTEM_PROMPT: &str = r#"You analyze visual evidence (photos, screenshots, charts) submitted during a Root Cause Analysis.

Describe only what is observable in the evidence that bears on the question.
Note any mismatch between the evidence and the written answer. Be brief and factual."#;

/// Placeholder used when no answer has been accepted yet.
pub const EMPTY_HISTORY: &str = "No previous whys yet.";

/// Render accepted answers as numbered why/answer pairs.
pub fn format_history(history: &[WhyEntry]) -> String {
    if history.is_empty() {
        return EMPTY_HISTORY.to_string();
    }

    history
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let mut block = format!("Why {}: {}\nAnswer: {}", i + 1, entry.question, entry.answer);
            if entry.has_evidence {
                match entry.evidence_summary.as_deref() {
                    Some(summary) if !summary.is_empty() => {
                        block.push_str(&format!("\n[Evidence provided] {}", summary));
                    }
                    _ => block.push_str("\n[Evidence provided]"),
                }
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt for the next why question. `why_no` is 1-based.
pub fn question_prompt(problem: &str, why_no: u32, history: &[WhyEntry]) -> String {
    if why_no <= 1 || history.is_empty() {
        return format!(
            r#"You are conducting a Root Cause Analysis using the 5 Whys technique.

Problem/Incident: {problem}

Generate the first "Why" question to dig deeper into this problem. The question should be direct and help understand the underlying cause.

Format your response as:
Why 1: [your question here]"#
        );
    }

    format!(
        r#"You are conducting a Root Cause Analysis using the 5 Whys technique.

Problem/Incident: {problem}

Previous questions and answers:
{history}

Generate the next "Why" question (Why {why_no}) based on the previous answer. Dig deeper into the root cause.

Format your response as:
Why {why_no}: [your question here]"#,
        history = format_history(history),
    )
}

/// Prompt asking the validator to rate an answer.
pub fn validation_prompt(question: &str, answer: &str, evidence_enabled: bool) -> String {
    let evidence_line = if evidence_enabled {
        "Request Evidence: [yes/no - yes only if a photo or screenshot would materially confirm the answer]\n"
    } else {
        ""
    };

    format!(
        r#"You are validating an answer in a Root Cause Analysis session.

Question: {question}
Answer: {answer}

Evaluate the answer on these criteria:
1. Specificity: Is the answer concrete and detailed, or vague and generic? (Rate 1-5, where 5 is very specific)
2. Relevance: Does the answer actually address the question asked? (Rate 1-5, where 5 is highly relevant)

Respond in this exact format:
Specificity: [score]
Relevance: [score]
Needs Improvement: [yes/no]
{evidence_line}Suggestion: [If needs improvement, provide a brief suggestion for what additional details would help]"#
    )
}

/// Prompt for summarizing attached evidence against the question and answer.
pub fn evidence_prompt(question: &str, answer: &str) -> String {
    format!(
        r#"Evidence was attached to an answer in a Root Cause Analysis session.

Question: {question}
Written answer: {answer}

Summarize in 2-3 sentences what the evidence shows that is relevant to the question, and whether it supports the written answer."#
    )
}

/// Binary classification prompt for the early-stop check.
pub fn early_stop_prompt(problem: &str, question: &str, answer: &str) -> String {
    format!(
        r#"You are reviewing a Root Cause Analysis to decide whether a systematic root cause has been reached.

Problem/Incident: {problem}
Latest question: {question}
Latest answer: {answer}

Classify the latest answer:
- SYSTEMATIC: it names a process, policy, training, maintenance, scheduling or organizational failure.
- ISOLATED: it names a one-off individual mistake or a single equipment fault.

Rule: anything skipped, not done or missing that is tied to a process, policy or schedule counts as SYSTEMATIC.

Respond with exactly one word: SYSTEMATIC or ISOLATED."#
    )
}

/// Prompt for the 1-2 sentence root cause statement.
pub fn root_cause_prompt(problem: &str, history: &[WhyEntry]) -> String {
    format!(
        r#"You are analyzing a Root Cause Analysis session using the 5 Whys technique.

Problem/Incident: {problem}

5 Whys Analysis:
{history}

Based on this analysis, extract and state the root cause in 1-2 clear sentences. Be specific and actionable.

Root Cause:"#,
        history = format_history(history),
    )
}

fn report_context(
    problem: &str,
    history: &[WhyEntry],
    root_cause: &str,
    confidence: f64,
) -> String {
    format!(
        r#"Problem/Incident: {problem}

Analysis Process:
{history}

Root Cause: {root_cause}
Confidence Level: {confidence:.1}%"#,
        history = format_history(history),
    )
}

/// Prompt for a single report section.
pub fn report_section_prompt(
    problem: &str,
    history: &[WhyEntry],
    root_cause: &str,
    confidence: f64,
    section: ReportSection,
) -> String {
    format!(
        "{}\n\n{}",
        report_context(problem, history, root_cause, confidence),
        section.instruction()
    )
}

/// Prompt for the whole report in one call, with headings the assembler can split on.
pub fn full_report_prompt(
    problem: &str,
    history: &[WhyEntry],
    root_cause: &str,
    confidence: f64,
) -> String {
    let mut prompt = report_context(problem, history, root_cause, confidence);
    prompt.push_str(
        "\n\nWrite a complete RCA report with exactly these four sections, in this order, each introduced by its heading line exactly as shown:\n",
    );
    for section in ReportSection::ALL {
        prompt.push_str(&format!("\n{}\n{}\n", section.heading(), section.instruction()));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str, answer: &str) -> WhyEntry {
        WhyEntry::new(question, answer, 4.0, None)
    }

    #[test]
    fn test_system_prompts_are_not_empty() {
        assert!(!GENERATOR_SYSTEM_PROMPT.is_empty());
        assert!(!VALIDATOR_SYSTEM_PROMPT.is_empty());
        assert!(!EVIDENCE_SYSTEM_PROMPT.is_empty());
    }

    #[test]
    fn test_format_history_empty() {
        assert_eq!(format_history(&[]), EMPTY_HISTORY);
    }

    #[test]
    fn test_format_history_numbering_and_evidence_marker() {
        let history = vec![
            entry("Why did the server crash?", "Memory exhausted"),
            WhyEntry::new(
                "Why was memory exhausted?",
                "A leak in the cache",
                4.3,
                Some("Graph shows steady heap growth".to_string()),
            ),
        ];

        let text = format_history(&history);
        assert_eq!(
            text,
            "Why 1: Why did the server crash?\nAnswer: Memory exhausted\n\n\
             Why 2: Why was memory exhausted?\nAnswer: A leak in the cache\n\
             [Evidence provided] Graph shows steady heap growth"
        );
    }

    #[test]
    fn test_first_question_prompt_has_no_history() {
        let prompt = question_prompt("Server crashed at 2AM", 1, &[]);
        assert!(prompt.contains("Server crashed at 2AM"));
        assert!(prompt.contains("Why 1: [your question here]"));
        assert!(!prompt.contains("Previous questions"));
    }

    #[test]
    fn test_followup_question_prompt_includes_history() {
        let history = vec![entry("Why did it crash?", "OOM")];
        let prompt = question_prompt("Server crashed", 2, &history);
        assert!(prompt.contains("Previous questions and answers:"));
        assert!(prompt.contains("Why 1: Why did it crash?"));
        assert!(prompt.contains("Why 2: [your question here]"));
    }

    #[test]
    fn test_validation_prompt_evidence_line_is_optional() {
        let with = validation_prompt("q", "a", true);
        let without = validation_prompt("q", "a", false);
        assert!(with.contains("Request Evidence:"));
        assert!(!without.contains("Request Evidence:"));
        assert!(without.contains("Needs Improvement: [yes/no]"));
    }

    #[test]
    fn test_early_stop_prompt_states_rule() {
        let prompt = early_stop_prompt("p", "q", "Maintenance was skipped");
        assert!(prompt.contains("SYSTEMATIC or ISOLATED"));
        assert!(prompt.contains("skipped, not done or missing"));
    }

    #[test]
    fn test_report_prompts_share_context() {
        let history = vec![entry("Why?", "Because")];
        let section =
            report_section_prompt("p", &history, "rc", 86.0, ReportSection::ExecutiveSummary);
        assert!(section.contains("Root Cause: rc"));
        assert!(section.contains("Confidence Level: 86.0%"));
        assert!(section.contains("EXECUTIVE SUMMARY"));

        let full = full_report_prompt("p", &history, "rc", 86.0);
        let positions: Vec<usize> = ReportSection::ALL
            .iter()
            .map(|s| full.find(&s.heading()).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}

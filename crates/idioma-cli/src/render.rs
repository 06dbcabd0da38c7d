use std::io::{self, Write};

use idioma_contracts::options::{
    messages, LanguageVariant, OperationMode, OperationType, OptionSet, ReferenceCitationStyle,
    UiLanguage, WritingStyle,
};
use idioma_contracts::request::RequestDraft;
use idioma_contracts::result::{AuditTrace, ConfidenceLevel, ProcessingResult};
use idioma_engine::{ProcessingFailure, SessionState};

const TRACE_BAR_CELLS: usize = 10;

pub fn confidence_badge(level: ConfidenceLevel, lang: UiLanguage) -> String {
    format!("{} {}", level.icon(), level.label(lang))
}

pub fn ai_trace_bar(percentage: u8) -> String {
    let pct = usize::from(percentage.min(100));
    let filled = (pct * TRACE_BAR_CELLS + 50) / 100;
    "█".repeat(filled) + &"░".repeat(TRACE_BAR_CELLS - filled)
}

pub fn ai_trace_line(trace: &AuditTrace, lang: UiLanguage) -> String {
    let flag = if trace.ai_trace_flagged() { " ⚠" } else { "" };
    format!(
        "{}: [{}] {}%{flag}",
        messages(lang).ai_trace,
        ai_trace_bar(trace.ai_trace_percentage),
        trace.ai_trace_percentage
    )
}

fn audit_panel(trace: &AuditTrace, lang: UiLanguage) -> Vec<String> {
    let msgs = messages(lang);
    let mut lines = vec![format!("-- {} --", msgs.expert_panel)];
    for (label, value) in [
        ("Intent Confidence", &trace.intent_confidence),
        ("Constraint Satisfaction", &trace.constraint_satisfaction),
        ("Humanisation Applied", &trace.humanisation_applied),
        ("AI-Trace Risk", &trace.ai_trace_risk),
        ("Variant Compliance", &trace.variant_compliance),
    ] {
        lines.push(format!("{label}: {value}"));
    }
    if trace.has_references() {
        lines.push(format!("{}:", msgs.references));
        for reference in &trace.references {
            let reference = reference.trim();
            if !reference.is_empty() {
                lines.push(format!("  - {reference}"));
            }
        }
    }
    lines
}

/// Final text, badge and trace bar. The audit panel follows only in
/// expert mode.
pub fn render_result(result: &ProcessingResult, mode: OperationMode, lang: UiLanguage) -> String {
    let mut lines = vec![
        format!("== {} ==", messages(lang).final_output),
        result.text.clone(),
        String::new(),
        confidence_badge(result.confidence, lang),
        ai_trace_line(&result.audit_trace, lang),
    ];
    if mode.shows_audit_panel() {
        lines.extend(audit_panel(&result.audit_trace, lang));
    }
    lines.join("\n")
}

pub fn render_failure(failure: &ProcessingFailure, lang: UiLanguage) -> String {
    let msgs = messages(lang);
    match failure {
        ProcessingFailure::Refused(message) => format!("{}: {message}", msgs.system_refusal),
        ProcessingFailure::Malformed(detail) => format!(
            "{}: {}\n  ({detail})",
            msgs.processing_failed, msgs.malformed_result
        ),
        ProcessingFailure::Transport(message) => {
            format!("{}: {message}", msgs.processing_failed)
        }
    }
}

fn option_rows<T: OptionSet>(lang: UiLanguage, default: Option<T>, out: &mut Vec<String>) {
    out.push(format!("{}:", T::KIND));
    for option in T::ALL {
        let marker = if Some(*option) == default { " *" } else { "" };
        out.push(format!(
            "  {:<26} {}{marker}",
            option.code().to_ascii_lowercase().replace('_', "-"),
            option.label(lang)
        ));
    }
}

pub fn render_options(lang: UiLanguage) -> String {
    let mut lines = Vec::new();
    option_rows(lang, Some(LanguageVariant::default()), &mut lines);
    option_rows(lang, Some(WritingStyle::default()), &mut lines);
    option_rows(lang, Some(OperationMode::default()), &mut lines);
    option_rows(lang, Some(OperationType::Rewrite), &mut lines);
    option_rows(lang, Some(ReferenceCitationStyle::default()), &mut lines);
    option_rows(lang, Some(UiLanguage::default()), &mut lines);
    lines.push(String::new());
    for mode in OperationMode::ALL {
        lines.push(format!("{}: {}", mode.label(lang), mode.description(lang)));
    }
    lines.join("\n")
}

pub fn render_status(
    draft: &RequestDraft,
    state: &SessionState,
    model: Option<&str>,
    lang: UiLanguage,
) -> String {
    let operations = draft
        .operations()
        .iter()
        .map(|operation| operation.code())
        .collect::<Vec<&str>>();
    let stream = if state.paused {
        messages(lang).paused.to_string()
    } else if state.loading {
        "streaming".to_string()
    } else {
        match state.last_outcome.as_deref() {
            Some(outcome) => format!("idle (last: {outcome})"),
            None => "idle".to_string(),
        }
    };
    [
        format!(
            "Source: {} -> Target: {}",
            draft.source_variant.display_name(),
            draft.target_variant.display_name()
        ),
        format!(
            "Style: {} | Mode: {} | Cite: {} | Ops: {}",
            draft.writing_style,
            draft.operation_mode,
            draft.citation_style,
            if operations.is_empty() {
                "(none)".to_string()
            } else {
                operations.join(", ")
            }
        ),
        format!(
            "Model: {} | UI: {}",
            state.model.as_deref().or(model).unwrap_or("(default)"),
            lang
        ),
        format!(
            "Text: {} chars | URL: {} | Images: {}",
            draft.raw_text.chars().count(),
            if draft.raw_url.trim().is_empty() {
                "-"
            } else {
                draft.raw_url.trim()
            },
            draft.images().len()
        ),
        format!("Stream: {stream}"),
    ]
    .join("\n")
}

/// Writes only the part of the preview not yet shown.
#[derive(Debug, Default)]
pub struct PreviewEcho {
    generation: u64,
    printed: String,
    open_line: bool,
}

impl PreviewEcho {
    pub fn update(&mut self, state: &SessionState, out: &mut impl Write) -> io::Result<()> {
        if state.generation != self.generation {
            self.finish(out)?;
            self.generation = state.generation;
            self.printed.clear();
        }
        if state.preview.is_empty() {
            self.printed.clear();
            return Ok(());
        }
        if state.preview == self.printed {
            return Ok(());
        }
        match state.preview.strip_prefix(self.printed.as_str()) {
            Some(delta) => write!(out, "{delta}")?,
            None => write!(out, "\n{}", state.preview)?,
        }
        out.flush()?;
        self.printed = state.preview.clone();
        self.open_line = true;
        Ok(())
    }

    /// Ends the preview line, if one is open.
    pub fn finish(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.open_line {
            writeln!(out)?;
            self.open_line = false;
        }
        Ok(())
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::options::{messages, UiLanguage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConfidenceLevel {
    Green,
    Yellow,
    Red,
}

impl ConfidenceLevel {
    pub fn code(self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Red => "RED",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Green => "🟢",
            Self::Yellow => "🟡",
            Self::Red => "🔴",
        }
    }

    pub fn label(self, lang: UiLanguage) -> &'static str {
        match (self, lang) {
            (Self::Green, UiLanguage::Pt) => "Confiança elevada",
            (Self::Green, UiLanguage::En) => "High Confidence",
            (Self::Yellow, UiLanguage::Pt) => "Confiança média",
            (Self::Yellow, UiLanguage::En) => "Medium Confidence",
            (Self::Red, UiLanguage::Pt) => "Confiança baixa",
            (Self::Red, UiLanguage::En) => "Low Confidence",
        }
    }
}

impl FromStr for ConfidenceLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GREEN" => Ok(Self::Green),
            "YELLOW" => Ok(Self::Yellow),
            "RED" => Ok(Self::Red),
            _ => Err(format!("unknown confidence level '{raw}'")),
        }
    }
}

impl TryFrom<String> for ConfidenceLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConfidenceLevel> for String {
    fn from(value: ConfidenceLevel) -> Self {
        value.code().to_string()
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Heuristic metrics the model reports about its own output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditTrace {
    pub intent_confidence: String,
    pub constraint_satisfaction: String,
    pub humanisation_applied: String,
    pub ai_trace_risk: String,
    #[serde(deserialize_with = "percentage_from_number")]
    pub ai_trace_percentage: u8,
    pub variant_compliance: String,
    pub references: Vec<String>,
}

impl AuditTrace {
    /// Above this the output reads as machine-written.
    pub const AI_TRACE_ALERT_THRESHOLD: u8 = 50;

    pub fn ai_trace_flagged(&self) -> bool {
        self.ai_trace_percentage > Self::AI_TRACE_ALERT_THRESHOLD
    }

    pub fn has_references(&self) -> bool {
        self.references.iter().any(|item| !item.trim().is_empty())
    }
}

fn percentage_from_number<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if !raw.is_finite() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub text: String,
    pub confidence: ConfidenceLevel,
    pub audit_trace: AuditTrace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingResult {
    /// Appends the reference list to the text. Returns false when there is
    /// nothing to insert.
    pub fn insert_references(&mut self, lang: UiLanguage) -> bool {
        let references = self
            .audit_trace
            .references
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .collect::<Vec<&str>>();
        if references.is_empty() {
            return false;
        }
        let block = format!(
            "\n\n---\n{}:\n{}",
            messages(lang).references,
            references.join("\n")
        );
        self.text.push_str(&block);
        true
    }
}

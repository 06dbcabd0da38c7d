//! Option sets offered to the user and their localized labels.
//!
//! Every enum here has a stable wire code (what the model sees and what the
//! CLI accepts) and one label per [`UiLanguage`]. Labels are plain `match`
//! tables so adding a variant without a label fails to compile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{raw}' (expected one of: {expected})")]
pub struct OptionParseError {
    pub kind: &'static str,
    pub raw: String,
    pub expected: String,
}

/// A closed set of user-selectable options.
pub trait OptionSet: Sized + Copy + Eq + 'static {
    const KIND: &'static str;
    const ALL: &'static [Self];

    fn code(self) -> &'static str;
    fn label(self, lang: UiLanguage) -> &'static str;

    fn parse_code(raw: &str) -> Result<Self, OptionParseError> {
        let wanted = normalize_code(raw);
        Self::ALL
            .iter()
            .copied()
            .find(|option| option.code() == wanted)
            .ok_or_else(|| OptionParseError {
                kind: Self::KIND,
                raw: raw.to_string(),
                expected: Self::ALL
                    .iter()
                    .map(|option| option.code().to_ascii_lowercase().replace('_', "-"))
                    .collect::<Vec<String>>()
                    .join(", "),
            })
    }
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

macro_rules! option_codes {
    ($ty:ty) => {
        impl FromStr for $ty {
            type Err = OptionParseError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                <$ty as OptionSet>::parse_code(raw)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.code())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UiLanguage {
    #[default]
    #[serde(rename = "PT")]
    Pt,
    #[serde(rename = "EN")]
    En,
}

impl UiLanguage {
    pub fn toggled(self) -> Self {
        match self {
            Self::Pt => Self::En,
            Self::En => Self::Pt,
        }
    }
}

impl OptionSet for UiLanguage {
    const KIND: &'static str = "UI language";
    const ALL: &'static [Self] = &[Self::Pt, Self::En];

    fn code(self) -> &'static str {
        match self {
            Self::Pt => "PT",
            Self::En => "EN",
        }
    }

    fn label(self, _lang: UiLanguage) -> &'static str {
        match self {
            Self::Pt => "Português UI",
            Self::En => "English UI",
        }
    }
}

option_codes!(UiLanguage);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LanguageVariant {
    #[default]
    #[serde(rename = "PT_EU_AO45")]
    PtEuAo45,
    #[serde(rename = "PT_EU_AO90")]
    PtEuAo90,
    #[serde(rename = "EN_UK")]
    EnUk,
    #[serde(rename = "EN_US")]
    EnUs,
}

impl LanguageVariant {
    /// Name used when describing the variant to the model.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::PtEuAo45 => "Português Europeu AO45",
            Self::PtEuAo90 => "Português Europeu AO90",
            Self::EnUk => "English UK",
            Self::EnUs => "English US",
        }
    }
}

impl OptionSet for LanguageVariant {
    const KIND: &'static str = "language variant";
    const ALL: &'static [Self] = &[Self::PtEuAo45, Self::PtEuAo90, Self::EnUk, Self::EnUs];

    fn code(self) -> &'static str {
        match self {
            Self::PtEuAo45 => "PT_EU_AO45",
            Self::PtEuAo90 => "PT_EU_AO90",
            Self::EnUk => "EN_UK",
            Self::EnUs => "EN_US",
        }
    }

    fn label(self, _lang: UiLanguage) -> &'static str {
        self.display_name()
    }
}

option_codes!(LanguageVariant);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WritingStyle {
    #[default]
    Reporter,
    WriterFiction,
    WriterNovelist,
    WriterBiographer,
    InvestigativeJournalism,
}

impl OptionSet for WritingStyle {
    const KIND: &'static str = "writing style";
    const ALL: &'static [Self] = &[
        Self::Reporter,
        Self::WriterFiction,
        Self::WriterNovelist,
        Self::WriterBiographer,
        Self::InvestigativeJournalism,
    ];

    fn code(self) -> &'static str {
        match self {
            Self::Reporter => "REPORTER",
            Self::WriterFiction => "WRITER_FICTION",
            Self::WriterNovelist => "WRITER_NOVELIST",
            Self::WriterBiographer => "WRITER_BIOGRAPHER",
            Self::InvestigativeJournalism => "INVESTIGATIVE_JOURNALISM",
        }
    }

    fn label(self, lang: UiLanguage) -> &'static str {
        match (self, lang) {
            (Self::Reporter, UiLanguage::Pt) => "Repórter",
            (Self::Reporter, UiLanguage::En) => "Reporter",
            (Self::WriterFiction, UiLanguage::Pt) => "Escritor (Ficção)",
            (Self::WriterFiction, UiLanguage::En) => "Writer (Fiction)",
            (Self::WriterNovelist, UiLanguage::Pt) => "Escritor (Romancista)",
            (Self::WriterNovelist, UiLanguage::En) => "Writer (Novelist)",
            (Self::WriterBiographer, UiLanguage::Pt) => "Escritor (Biógrafo)",
            (Self::WriterBiographer, UiLanguage::En) => "Writer (Biographer)",
            (Self::InvestigativeJournalism, UiLanguage::Pt) => "Jornalismo de Investigação",
            (Self::InvestigativeJournalism, UiLanguage::En) => "Investigative Journalism",
        }
    }
}

option_codes!(WritingStyle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationMode {
    Casual,
    #[default]
    Professional,
    Expert,
}

impl OperationMode {
    pub fn description(self, lang: UiLanguage) -> &'static str {
        match (self, lang) {
            (Self::Casual, UiLanguage::Pt) => "Tom descontraído, correções leves.",
            (Self::Casual, UiLanguage::En) => "Relaxed tone, light corrections.",
            (Self::Professional, UiLanguage::Pt) => "Registo formal e preciso.",
            (Self::Professional, UiLanguage::En) => "Formal, precise register.",
            (Self::Expert, UiLanguage::Pt) => "Rigor máximo com painel de auditoria.",
            (Self::Expert, UiLanguage::En) => "Maximum rigour with the audit panel.",
        }
    }

    /// Only expert mode exposes the audit trace to the user.
    pub fn shows_audit_panel(self) -> bool {
        matches!(self, Self::Expert)
    }
}

impl OptionSet for OperationMode {
    const KIND: &'static str = "operation mode";
    const ALL: &'static [Self] = &[Self::Casual, Self::Professional, Self::Expert];

    fn code(self) -> &'static str {
        match self {
            Self::Casual => "CASUAL",
            Self::Professional => "PROFESSIONAL",
            Self::Expert => "EXPERT",
        }
    }

    fn label(self, lang: UiLanguage) -> &'static str {
        match (self, lang) {
            (Self::Casual, UiLanguage::Pt) => "Casual",
            (Self::Casual, UiLanguage::En) => "Casual",
            (Self::Professional, UiLanguage::Pt) => "Profissional",
            (Self::Professional, UiLanguage::En) => "Professional",
            (Self::Expert, UiLanguage::Pt) => "Especialista",
            (Self::Expert, UiLanguage::En) => "Expert",
        }
    }
}

option_codes!(OperationMode);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Rewrite,
    Correct,
    Enrich,
}

impl OptionSet for OperationType {
    const KIND: &'static str = "operation type";
    const ALL: &'static [Self] = &[Self::Rewrite, Self::Correct, Self::Enrich];

    fn code(self) -> &'static str {
        match self {
            Self::Rewrite => "REWRITE",
            Self::Correct => "CORRECT",
            Self::Enrich => "ENRICH",
        }
    }

    fn label(self, lang: UiLanguage) -> &'static str {
        match (self, lang) {
            (Self::Rewrite, UiLanguage::Pt) => "Reescrever",
            (Self::Rewrite, UiLanguage::En) => "Rewrite",
            (Self::Correct, UiLanguage::Pt) => "Corrigir",
            (Self::Correct, UiLanguage::En) => "Correct",
            (Self::Enrich, UiLanguage::Pt) => "Enriquecer (com fontes)",
            (Self::Enrich, UiLanguage::En) => "Enrich (with sources)",
        }
    }
}

option_codes!(OperationType);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceCitationStyle {
    NameOnly,
    #[default]
    NameAndLink,
}

impl OptionSet for ReferenceCitationStyle {
    const KIND: &'static str = "citation style";
    const ALL: &'static [Self] = &[Self::NameOnly, Self::NameAndLink];

    fn code(self) -> &'static str {
        match self {
            Self::NameOnly => "NAME_ONLY",
            Self::NameAndLink => "NAME_AND_LINK",
        }
    }

    fn label(self, lang: UiLanguage) -> &'static str {
        match (self, lang) {
            (Self::NameOnly, UiLanguage::Pt) => "Apenas nome",
            (Self::NameOnly, UiLanguage::En) => "Name only",
            (Self::NameAndLink, UiLanguage::Pt) => "Nome e ligação",
            (Self::NameAndLink, UiLanguage::En) => "Name and link",
        }
    }
}

option_codes!(ReferenceCitationStyle);

/// Fixed UI strings.
#[derive(Debug, Clone, Copy)]
pub struct Messages {
    pub system_refusal: &'static str,
    pub processing_failed: &'static str,
    pub malformed_result: &'static str,
    pub cancelled: &'static str,
    pub references: &'static str,
    pub expert_panel: &'static str,
    pub ai_trace: &'static str,
    pub final_output: &'static str,
    pub streaming_placeholder: &'static str,
    pub sources_inserted: &'static str,
    pub no_references: &'static str,
    pub paused: &'static str,
    pub resumed: &'static str,
    pub reset_done: &'static str,
}

const MESSAGES_PT: Messages = Messages {
    system_refusal: "Recusa do sistema",
    processing_failed: "Falha no processamento",
    malformed_result: "Não foi possível interpretar a resposta do modelo.",
    cancelled: "Processamento interrompido.",
    references: "Referências",
    expert_panel: "Painel de auditoria",
    ai_trace: "Rasto de IA",
    final_output: "Resultado final",
    streaming_placeholder: "Linguagem em fluxo dinâmico...",
    sources_inserted: "Fontes inseridas no texto.",
    no_references: "Sem referências para inserir.",
    paused: "Em pausa.",
    resumed: "A retomar.",
    reset_done: "Sessão reposta.",
};

const MESSAGES_EN: Messages = Messages {
    system_refusal: "System refusal",
    processing_failed: "Processing failed",
    malformed_result: "The model response could not be interpreted.",
    cancelled: "Processing stopped.",
    references: "References",
    expert_panel: "Audit panel",
    ai_trace: "AI trace",
    final_output: "Final output",
    streaming_placeholder: "Language in dynamic flow...",
    sources_inserted: "Sources inserted into the text.",
    no_references: "No references to insert.",
    paused: "Paused.",
    resumed: "Resuming.",
    reset_done: "Session reset.",
};

pub fn messages(lang: UiLanguage) -> &'static Messages {
    match lang {
        UiLanguage::Pt => &MESSAGES_PT,
        UiLanguage::En => &MESSAGES_EN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_parse_case_insensitively_with_dashes() {
        assert_eq!(
            "pt-eu-ao90".parse::<LanguageVariant>(),
            Ok(LanguageVariant::PtEuAo90)
        );
        assert_eq!(
            " Investigative_Journalism ".parse::<WritingStyle>(),
            Ok(WritingStyle::InvestigativeJournalism)
        );
        assert_eq!(
            "name and link".parse::<ReferenceCitationStyle>(),
            Ok(ReferenceCitationStyle::NameAndLink)
        );
        assert_eq!("en".parse::<UiLanguage>(), Ok(UiLanguage::En));
    }

    #[test]
    fn unknown_code_lists_expected_values() {
        let err = "pt-br".parse::<LanguageVariant>().unwrap_err();
        assert_eq!(err.kind, "language variant");
        assert_eq!(
            err.to_string(),
            "unknown language variant 'pt-br' (expected one of: pt-eu-ao45, pt-eu-ao90, en-uk, en-us)"
        );
    }

    #[test]
    fn serde_uses_wire_codes() {
        assert_eq!(
            serde_json::to_value(LanguageVariant::PtEuAo45).unwrap(),
            serde_json::json!("PT_EU_AO45")
        );
        assert_eq!(
            serde_json::to_value(WritingStyle::WriterBiographer).unwrap(),
            serde_json::json!("WRITER_BIOGRAPHER")
        );
        assert_eq!(
            serde_json::to_value(ReferenceCitationStyle::NameOnly).unwrap(),
            serde_json::json!("NAME_ONLY")
        );
    }

    #[test]
    fn every_option_has_a_label_in_both_languages() {
        for lang in UiLanguage::ALL {
            for style in WritingStyle::ALL {
                assert!(!style.label(*lang).is_empty());
            }
            for mode in OperationMode::ALL {
                assert!(!mode.label(*lang).is_empty());
                assert!(!mode.description(*lang).is_empty());
            }
            for op in OperationType::ALL {
                assert!(!op.label(*lang).is_empty());
            }
        }
        assert_eq!(messages(UiLanguage::En).references, "References");
        assert_eq!(messages(UiLanguage::Pt).references, "Referências");
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(OperationType::Enrich.to_string(), "ENRICH");
        assert_eq!(OperationMode::Expert.to_string(), "EXPERT");
        assert!(OperationMode::Expert.shows_audit_panel());
        assert!(!OperationMode::Casual.shows_audit_panel());
    }
}

use idioma_contracts::options::OptionSet;
use idioma_contracts::request::RequestParameters;
use serde_json::{json, Map, Value};

use crate::config::EngineConfig;
use crate::providers::{ProviderStreamRequest, TransportOptions};

pub const SYSTEM_PROMPT: &str = "\
You are IdiomaSwitch, a professional Level-5 AI language assistant.
Key Governance Rules:
- No Hallucination: If unknown, state \"Insufficient information\".
- Confidence Management: Assign GREEN (High), YELLOW (Medium), or RED (Low).
- REFUSE if Português BR is detected in input or requested for output.
- Tone: Neutral, calm, precise, professional.
- Style: Strictly respect requested Writing Style.

Specific processing logic:
1. Parse input intent and variant.
2. Enforce source -> target variant compliance.
3. Apply requested Operations. If multiple are selected, combine them intelligently (e.g., correct then rewrite).
4. If ENRICH is selected, find relevant references using Google Search.
5. Reference Formatting: Format citations according to requested Citation Style.
6. Apply Humanisation Engine (micro-syntactic variations, rhythm adjustments).
7. Perform AI-trace evaluation and return aiTracePercentage (0-100).
8. Return the final result as a structured JSON object.
";

const RESPONSE_CLOSING_LINE: &str =
    "IMPORTANT: Respond ONLY with the JSON object following the schema.";

/// Renders the per-request prompt. The reference link line is present only
/// when a URL was given.
pub fn user_prompt(params: &RequestParameters) -> String {
    let operations = params
        .operation_types
        .iter()
        .map(|operation| operation.code())
        .collect::<Vec<&str>>()
        .join(", ");

    let mut lines = vec![
        format!("Operations Requested: {operations}"),
        format!("Source Language: {}", params.source_variant.display_name()),
        format!("Target Language: {}", params.target_variant.display_name()),
        format!("Writing Style: {}", params.writing_style.code()),
        format!("Mode: {}", params.operation_mode.code()),
        format!("Reference Citation Format: {}", params.citation_style.code()),
    ];
    let url = params.raw_url.trim();
    if !url.is_empty() {
        lines.push(format!("Reference Link: {url}"));
    }
    lines.push(String::new());
    lines.push("Input Text:".to_string());
    lines.push(params.raw_text.clone());
    lines.push(String::new());
    lines.push(RESPONSE_CLOSING_LINE.to_string());
    lines.join("\n")
}

pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "text": { "type": "STRING" },
            "confidence": { "type": "STRING" },
            "auditTrace": {
                "type": "OBJECT",
                "properties": {
                    "intentConfidence": { "type": "STRING" },
                    "constraintSatisfaction": { "type": "STRING" },
                    "humanisationApplied": { "type": "STRING" },
                    "aiTraceRisk": { "type": "STRING" },
                    "aiTracePercentage": { "type": "NUMBER" },
                    "variantCompliance": { "type": "STRING" },
                    "references": {
                        "type": "ARRAY",
                        "items": { "type": "STRING" }
                    }
                }
            },
            "error": { "type": "STRING" }
        },
        "required": ["text", "confidence", "auditTrace"]
    })
}

pub fn compose_request(
    params: &RequestParameters,
    model: &str,
    config: &EngineConfig,
) -> ProviderStreamRequest {
    let mut metadata = Map::new();
    metadata.insert("raw_text".to_string(), Value::String(params.raw_text.clone()));
    metadata.insert(
        "raw_url".to_string(),
        Value::String(params.raw_url.trim().to_string()),
    );
    metadata.insert(
        "target_variant".to_string(),
        Value::String(params.target_variant.code().to_string()),
    );
    metadata.insert(
        "operations".to_string(),
        Value::Array(
            params
                .operation_types
                .iter()
                .map(|operation| Value::String(operation.code().to_string()))
                .collect(),
        ),
    );

    ProviderStreamRequest {
        model: model.to_string(),
        system_instruction: SYSTEM_PROMPT.to_string(),
        user_prompt: user_prompt(params),
        images: params.images.clone(),
        response_schema: response_schema(),
        enable_search: true,
        transport: TransportOptions::from_config(config),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use idioma_contracts::options::{
        LanguageVariant, OperationMode, OperationType, ReferenceCitationStyle, WritingStyle,
    };
    use idioma_contracts::request::{ImagePayload, RequestDraft};

    use super::*;

    fn params() -> anyhow::Result<RequestParameters> {
        let mut draft = RequestDraft::new();
        draft.source_variant = LanguageVariant::EnUk;
        draft.target_variant = LanguageVariant::PtEuAo90;
        draft.writing_style = WritingStyle::InvestigativeJournalism;
        draft.operation_mode = OperationMode::Expert;
        draft.citation_style = ReferenceCitationStyle::NameOnly;
        draft.set_operations([OperationType::Correct, OperationType::Enrich]);
        draft.append_text("The quick brown fox.");
        Ok(draft.snapshot()?)
    }

    #[test]
    fn prompt_lists_every_option_in_order() -> anyhow::Result<()> {
        let prompt = user_prompt(&params()?);
        let expected = "\
Operations Requested: CORRECT, ENRICH
Source Language: English UK
Target Language: Português Europeu AO90
Writing Style: INVESTIGATIVE_JOURNALISM
Mode: EXPERT
Reference Citation Format: NAME_ONLY

Input Text:
The quick brown fox.

IMPORTANT: Respond ONLY with the JSON object following the schema.";
        assert_eq!(prompt, expected);
        Ok(())
    }

    #[test]
    fn reference_link_appears_only_with_url() -> anyhow::Result<()> {
        let mut with_url = params()?;
        with_url.raw_url = "  https://example.pt/artigo ".to_string();
        let prompt = user_prompt(&with_url);
        assert!(prompt.contains("\nReference Link: https://example.pt/artigo\n"));
        assert!(!user_prompt(&params()?).contains("Reference Link"));
        Ok(())
    }

    #[test]
    fn composed_request_carries_schema_search_and_images() -> anyhow::Result<()> {
        let mut parameters = params()?;
        parameters
            .images
            .push(ImagePayload::from_bytes("image/webp", b"RIFF"));
        let config = EngineConfig::default();
        let request = compose_request(&parameters, "gemini-2.5-pro", &config);

        assert_eq!(request.model, "gemini-2.5-pro");
        assert!(request.enable_search);
        assert_eq!(request.system_instruction, SYSTEM_PROMPT);
        assert_eq!(request.images.len(), 1);
        assert_eq!(request.images[0].mime_type, "image/webp");
        assert_eq!(
            request.response_schema["required"],
            json!(["text", "confidence", "auditTrace"])
        );
        assert_eq!(
            request.response_schema["properties"]["auditTrace"]["properties"]["aiTracePercentage"]
                ["type"],
            json!("NUMBER")
        );
        assert_eq!(request.metadata["target_variant"], json!("PT_EU_AO90"));
        assert_eq!(request.metadata["operations"], json!(["CORRECT", "ENRICH"]));
        assert_eq!(request.transport.retries, config.transport_retries);
        Ok(())
    }

    #[test]
    fn system_prompt_keeps_governance_rules() {
        assert!(SYSTEM_PROMPT.contains("REFUSE if Português BR"));
        assert!(SYSTEM_PROMPT.contains("GREEN (High), YELLOW (Medium), or RED (Low)"));
        assert!(SYSTEM_PROMPT.contains("8. Return the final result as a structured JSON object."));
    }
}

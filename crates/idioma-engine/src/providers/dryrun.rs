use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use idioma_contracts::result::{AuditTrace, ConfidenceLevel, ProcessingResult};
use serde_json::Value;

use super::{FragmentStream, ProviderStreamRequest, StreamProvider};

const DEFAULT_FRAGMENT_CHARS: usize = 12;

/// Offline provider. Answers with a deterministic result derived from the
/// request, cut into fixed-size fragments.
#[derive(Debug, Clone)]
pub struct DryrunProvider {
    fragment_chars: usize,
    fragment_delay: Duration,
}

impl Default for DryrunProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DryrunProvider {
    pub fn new() -> Self {
        Self {
            fragment_chars: DEFAULT_FRAGMENT_CHARS,
            fragment_delay: Duration::ZERO,
        }
    }

    pub fn with_fragment_chars(mut self, fragment_chars: usize) -> Self {
        self.fragment_chars = fragment_chars.max(1);
        self
    }

    /// Sleeps before handing out each fragment, to mimic a slow model.
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    fn respond(request: &ProviderStreamRequest) -> ProcessingResult {
        let meta = |key: &str| {
            request
                .metadata
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let raw_text = meta("raw_text");
        let raw_url = meta("raw_url");
        let target = meta("target_variant");
        let operations = request
            .metadata
            .get("operations")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(Value::as_str).collect::<Vec<&str>>())
            .unwrap_or_default();

        let body = if !raw_text.is_empty() {
            raw_text
        } else if !raw_url.is_empty() {
            format!("Content from {raw_url}")
        } else {
            format!("{} image(s) described.", request.images.len())
        };
        let references = if raw_url.is_empty() {
            Vec::new()
        } else {
            vec![raw_url]
        };

        ProcessingResult {
            text: format!("[{}] {body}", operations.join("+")),
            confidence: ConfidenceLevel::Green,
            audit_trace: AuditTrace {
                intent_confidence: "dryrun".to_string(),
                constraint_satisfaction: "dryrun".to_string(),
                humanisation_applied: "none".to_string(),
                ai_trace_risk: "none".to_string(),
                ai_trace_percentage: 0,
                variant_compliance: target,
                references,
            },
            error: None,
        }
    }
}

impl StreamProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn stream(&self, request: &ProviderStreamRequest) -> Result<FragmentStream> {
        let document = serde_json::to_string(&Self::respond(request))
            .context("dryrun result serialization failed")?;
        let chars = document.chars().collect::<Vec<char>>();
        let fragments = chars
            .chunks(self.fragment_chars)
            .map(|chunk| chunk.iter().collect::<String>())
            .collect::<Vec<String>>();
        let delay = self.fragment_delay;
        Ok(Box::new(fragments.into_iter().map(move |fragment| {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            Ok(fragment)
        })))
    }
}

#[cfg(test)]
mod tests {
    use idioma_contracts::request::RequestDraft;

    use super::*;
    use crate::compose::compose_request;
    use crate::config::EngineConfig;

    #[test]
    fn fragments_join_into_a_valid_result() -> Result<()> {
        let mut draft = RequestDraft::new();
        draft.append_text("Bom dia.");
        draft.raw_url = "https://example.pt".to_string();
        let request = compose_request(&draft.snapshot()?, "dryrun-text-1", &EngineConfig::default());

        let provider = DryrunProvider::new().with_fragment_chars(5);
        let fragments = provider.stream(&request)?.collect::<Result<Vec<String>>>()?;
        assert!(fragments.len() > 1);
        assert!(fragments.iter().all(|fragment| fragment.chars().count() <= 5));

        let result: ProcessingResult = serde_json::from_str(&fragments.concat())?;
        assert_eq!(result.text, "[REWRITE] Bom dia.");
        assert_eq!(result.confidence, ConfidenceLevel::Green);
        assert_eq!(result.audit_trace.variant_compliance, "PT_EU_AO45");
        assert_eq!(result.audit_trace.references, vec!["https://example.pt".to_string()]);
        Ok(())
    }

    #[test]
    fn text_field_leads_the_document() -> Result<()> {
        let mut draft = RequestDraft::new();
        draft.append_text("x");
        let request = compose_request(&draft.snapshot()?, "dryrun-text-1", &EngineConfig::default());
        let document = DryrunProvider::new()
            .stream(&request)?
            .collect::<Result<String>>()?;
        assert!(document.starts_with("{\"text\":"));
        Ok(())
    }

    #[test]
    fn configured_delay_paces_the_registered_provider() -> Result<()> {
        let mut draft = RequestDraft::new();
        draft.append_text("x");
        let config = EngineConfig {
            dryrun_delay_ms: 5,
            ..EngineConfig::default()
        };
        let request = compose_request(&draft.snapshot()?, "dryrun-text-1", &config);
        let registry = crate::providers::ProviderRegistry::with_defaults(&config)?;
        let provider = registry
            .get("dryrun")
            .ok_or_else(|| anyhow::anyhow!("dryrun not registered"))?;

        let started = std::time::Instant::now();
        let fragments = provider.stream(&request)?.collect::<Result<Vec<String>>>()?;
        assert!(started.elapsed() >= Duration::from_millis(5) * fragments.len() as u32);
        Ok(())
    }
}

use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Picks the requested model when it covers `required`, else the first
    /// registered model that does, recording why.
    pub fn select(
        &self,
        requested: Option<&str>,
        required: &[Capability],
    ) -> Result<ModelSelection, String> {
        let wanted = describe(required);
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = match requested {
            Some(name) => {
                if let Some(model) = self.registry.ensure(name, required) {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                if self.registry.get(name).is_some() {
                    format!("Model '{name}' does not support {wanted}.")
                } else {
                    format!("Unknown model '{name}'.")
                }
            }
            None => "No model specified; using default.".to_string(),
        };

        let Some(model) = self.registry.capable_of(required).into_iter().next() else {
            return Err(format!("No models available for {wanted}."));
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}

fn describe(required: &[Capability]) -> String {
    if required.is_empty() {
        return "any capability".to_string();
    }
    required
        .iter()
        .map(|capability| capability.as_str())
        .collect::<Vec<&str>>()
        .join(" + ")
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::models::Capability::{Text, Vision};

    fn spec(name: &str, capabilities: &[Capability]) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: "dryrun".to_string(),
            capabilities: capabilities.to_vec(),
            context_window: None,
        }
    }

    fn registry(models: &[ModelSpec]) -> ModelRegistry {
        let mut map = IndexMap::new();
        for model in models {
            map.insert(model.name.clone(), model.clone());
        }
        ModelRegistry::new(Some(map))
    }

    #[test]
    fn requested_model_is_used_when_capable() {
        let selection = ModelSelector::new(Some(registry(&[
            spec("first", &[Text]),
            spec("second", &[Text, Vision]),
        ])))
        .select(Some("second"), &[Text, Vision])
        .unwrap();
        assert_eq!(selection.model.name, "second");
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn text_only_model_falls_back_when_images_are_attached() {
        let selection = ModelSelector::new(Some(registry(&[
            spec("text-only", &[Text]),
            spec("multimodal", &[Text, Vision]),
        ])))
        .select(Some("text-only"), &[Text, Vision])
        .unwrap();
        assert_eq!(selection.model.name, "multimodal");
        assert_eq!(selection.requested.as_deref(), Some("text-only"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Model 'text-only' does not support text + vision.")
        );
    }

    #[test]
    fn unknown_and_missing_requests_use_default() {
        let selector = ModelSelector::new(Some(registry(&[spec("only", &[Text])])));
        let unknown = selector.select(Some("nope"), &[Text]).unwrap();
        assert_eq!(unknown.model.name, "only");
        assert_eq!(unknown.fallback_reason.as_deref(), Some("Unknown model 'nope'."));

        let missing = selector.select(Some("  "), &[Text]).unwrap();
        assert_eq!(
            missing.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
        assert_eq!(missing.requested, None);
    }

    #[test]
    fn errors_when_nothing_is_capable() {
        let err = ModelSelector::new(Some(registry(&[spec("only", &[Text])])))
            .select(None, &[Text, Vision])
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for text + vision.");
    }

    #[test]
    fn default_registry_prefers_gemini_and_accepts_models_prefix() {
        let selector = ModelSelector::new(None);
        let selection = selector.select(None, &[Text]).unwrap();
        assert_eq!(selection.model.name, "gemini-3-pro-preview");
        assert!(selector.registry.get("models/gemini-2.5-flash").is_some());
        assert_eq!(
            selector
                .registry
                .get("dryrun-text-1")
                .map(|model| model.provider.as_str()),
            Some("dryrun")
        );
    }
}

use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Text,
    Vision,
    Search,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn supports_all(&self, required: &[Capability]) -> bool {
        required.iter().all(|capability| self.supports(*capability))
    }
}

/// Known text models, in preference order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim().trim_start_matches("models/"))
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn capable_of(&self, required: &[Capability]) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports_all(required))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, required: &[Capability]) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports_all(required) {
            return Some(model.clone());
        }
        None
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    use Capability::{Search, Text, Vision};

    let mut map = IndexMap::new();
    let mut insert = |name: &str,
                      provider: &str,
                      capabilities: &[Capability],
                      context_window: Option<u64>| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities.to_vec(),
                context_window,
            },
        );
    };

    insert(
        "gemini-3-pro-preview",
        "gemini",
        &[Text, Vision, Search],
        Some(1_048_576),
    );
    insert("gemini-2.5-pro", "gemini", &[Text, Vision, Search], Some(1_048_576));
    insert("gemini-2.5-flash", "gemini", &[Text, Vision, Search], Some(1_048_576));
    insert("gemini-2.5-flash-lite", "gemini", &[Text, Vision], Some(1_048_576));
    insert("dryrun-text-1", "dryrun", &[Text, Vision], Some(8192));

    map
}

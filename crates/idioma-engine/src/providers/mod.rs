mod dryrun;
mod gemini;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use idioma_contracts::request::ImagePayload;
use serde_json::{Map, Value};

use crate::config::EngineConfig;

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;

/// Ordered text fragments of one model response.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String>> + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    pub request_timeout: Duration,
    pub retries: usize,
    pub retry_backoff_s: f64,
}

impl TransportOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            retries: config.transport_retries,
            retry_backoff_s: config.retry_backoff_s,
        }
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct ProviderStreamRequest {
    pub model: String,
    pub system_instruction: String,
    pub user_prompt: String,
    pub images: Vec<ImagePayload>,
    pub response_schema: Value,
    pub enable_search: bool,
    pub transport: TransportOptions,
    pub metadata: Map<String, Value>,
}

pub trait StreamProvider: Send + Sync {
    fn name(&self) -> &str;
    fn stream(&self, request: &ProviderStreamRequest) -> Result<FragmentStream>;
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn StreamProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider configured from `config`.
    pub fn with_defaults(config: &EngineConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(GeminiProvider::new(config)?);
        registry.register(
            DryrunProvider::new().with_fragment_delay(config.dryrun_fragment_delay()),
        );
        Ok(registry)
    }

    pub fn register<P: StreamProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn StreamProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

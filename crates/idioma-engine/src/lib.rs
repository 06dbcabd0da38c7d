//! Streaming engine behind the `idioma` CLI: request composition, model
//! providers, the fragment accumulator and the session that drives them.

pub mod accumulator;
pub mod compose;
pub mod config;
pub mod files;
pub mod providers;
pub mod session;

pub use accumulator::{
    drive, ProcessingFailure, StreamAccumulator, StreamControl, StreamOutcome,
};
pub use compose::compose_request;
pub use config::EngineConfig;
pub use files::{attach_file, Attachment};
pub use providers::{
    DryrunProvider, FragmentStream, GeminiProvider, ProviderRegistry, ProviderStreamRequest,
    StreamProvider, TransportOptions,
};
pub use session::{Session, SessionState, SessionView};

/// Flattens an error chain into one line, dropping repeated causes.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return providers::truncate_text(&err.to_string(), max_chars);
    }
    providers::truncate_text(&parts.join(" | caused by: "), max_chars)
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use idioma_contracts::events::{EventPayload, EventWriter};
use idioma_contracts::models::{Capability, ModelRegistry, ModelSelection, ModelSelector};
use idioma_contracts::options::UiLanguage;
use idioma_contracts::request::RequestParameters;
use idioma_contracts::result::ProcessingResult;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::accumulator::{drive, ProcessingFailure, StreamControl, StreamOutcome};
use crate::compose::compose_request;
use crate::config::EngineConfig;
use crate::providers::{ProviderRegistry, ProviderStreamRequest};

/// What a front-end renders. Only the worker of the current generation
/// writes here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub generation: u64,
    pub loading: bool,
    pub paused: bool,
    pub preview: String,
    pub result: Option<ProcessingResult>,
    pub failure: Option<ProcessingFailure>,
    pub model: Option<String>,
    pub fallback_reason: Option<String>,
    /// `completed`, `refused`, `malformed`, `transport` or `cancelled`.
    pub last_outcome: Option<String>,
}

/// Read-only handle on a session's state for another thread.
#[derive(Debug, Clone)]
pub struct SessionView {
    state: Arc<Mutex<SessionState>>,
}

impl SessionView {
    pub fn snapshot(&self) -> SessionState {
        lock(&self.state).clone()
    }
}

struct ActiveStream {
    control: StreamControl,
    handle: Option<JoinHandle<()>>,
}

/// Runs at most one stream at a time and publishes its progress into a
/// shared [`SessionState`].
pub struct Session {
    config: EngineConfig,
    providers: Arc<ProviderRegistry>,
    selector: ModelSelector,
    events: Option<EventWriter>,
    ui_language: UiLanguage,
    model: Option<String>,
    state: Arc<Mutex<SessionState>>,
    generation: Arc<AtomicU64>,
    active: Option<ActiveStream>,
}

impl Session {
    pub fn new(
        config: EngineConfig,
        providers: ProviderRegistry,
        events: Option<EventWriter>,
    ) -> Result<Self> {
        if let Some(writer) = events.as_ref() {
            writer.emit(
                "session_started",
                map_object(json!({
                    "providers": providers.names(),
                    "model": config.model,
                })),
            )?;
        }
        Ok(Self {
            model: config.model.clone(),
            config,
            providers: Arc::new(providers),
            selector: ModelSelector::new(None),
            events,
            ui_language: UiLanguage::default(),
            state: Arc::new(Mutex::new(SessionState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            active: None,
        })
    }

    pub fn with_model_registry(mut self, registry: ModelRegistry) -> Self {
        self.selector = ModelSelector::new(Some(registry));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model_registry(&self) -> &ModelRegistry {
        &self.selector.registry
    }

    pub fn set_model(&mut self, model: Option<String>) {
        self.model = model;
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn set_ui_language(&mut self, lang: UiLanguage) {
        self.ui_language = lang;
    }

    pub fn ui_language(&self) -> UiLanguage {
        self.ui_language
    }

    pub fn event_writer(&self) -> Option<&EventWriter> {
        self.events.as_ref()
    }

    pub fn snapshot(&self) -> SessionState {
        lock(&self.state).clone()
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).loading
    }

    /// Starts a stream for `params`, abandoning any stream still running.
    /// Prior output is cleared before the new worker starts.
    pub fn submit(&mut self, params: RequestParameters) -> Result<ModelSelection> {
        params.validate()?;

        let mut required = vec![Capability::Text];
        if !params.images.is_empty() {
            required.push(Capability::Vision);
        }
        let selection = self
            .selector
            .select(self.model.as_deref(), &required)
            .map_err(|err| anyhow!(err))?;
        let provider_name = selection.model.provider.clone();
        if self.providers.get(&provider_name).is_none() {
            return Err(anyhow!(
                "provider '{provider_name}' is not available for model '{}'",
                selection.model.name
            ));
        }

        if let Some(previous) = self.active.take() {
            previous.control.cancel();
            debug!("previous stream abandoned");
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.state) = SessionState {
            generation,
            loading: true,
            model: Some(selection.model.name.clone()),
            fallback_reason: selection.fallback_reason.clone(),
            ..SessionState::default()
        };

        let request = compose_request(&params, &selection.model.name, &self.config);
        let control = StreamControl::with_poll_interval(self.config.pause_poll_interval());

        if let Some(reason) = selection.fallback_reason.as_deref() {
            info!(model = %selection.model.name, reason, "model fallback");
            self.emit(
                "model_fallback",
                json!({
                    "requested": selection.requested,
                    "model": selection.model.name,
                    "reason": reason,
                }),
            );
        }
        self.emit(
            "request_submitted",
            json!({
                "generation": generation,
                "model": selection.model.name,
                "provider": provider_name,
                "operations": params.operation_types,
                "source_variant": params.source_variant,
                "target_variant": params.target_variant,
                "writing_style": params.writing_style,
                "operation_mode": params.operation_mode,
                "citation_style": params.citation_style,
                "text_chars": params.raw_text.chars().count(),
                "has_url": !params.raw_url.is_empty(),
                "images": params.images.len(),
            }),
        );

        let worker = StreamWorker {
            generation,
            provider_name,
            providers: Arc::clone(&self.providers),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            control: control.clone(),
        };
        let handle = thread::Builder::new()
            .name("idioma-stream".to_string())
            .spawn(move || worker.run(request))
            .context("failed to start stream worker")?;
        self.active = Some(ActiveStream {
            control,
            handle: Some(handle),
        });
        info!(generation, model = %selection.model.name, "request submitted");
        Ok(selection)
    }

    fn running_control(&self) -> Option<&StreamControl> {
        let active = self.active.as_ref()?;
        if active.control.is_cancelled() || !self.is_running() {
            return None;
        }
        Some(&active.control)
    }

    /// Returns false when nothing is streaming.
    pub fn pause(&mut self) -> bool {
        let Some(control) = self.running_control().cloned() else {
            return false;
        };
        control.pause();
        self.set_paused(true);
        true
    }

    pub fn resume(&mut self) -> bool {
        let Some(control) = self.running_control().cloned() else {
            return false;
        };
        control.resume();
        self.set_paused(false);
        true
    }

    /// Returns the pause state afterwards, or `None` when nothing is streaming.
    pub fn toggle_pause(&mut self) -> Option<bool> {
        let control = self.running_control().cloned()?;
        let paused = control.toggle_pause();
        self.set_paused(paused);
        Some(paused)
    }

    fn set_paused(&mut self, paused: bool) {
        lock(&self.state).paused = paused;
        self.emit(
            if paused { "stream_paused" } else { "stream_resumed" },
            json!({ "generation": self.generation.load(Ordering::SeqCst) }),
        );
    }

    /// Cancels the running stream. The last preview stays visible.
    pub fn stop(&mut self) -> bool {
        let Some(control) = self.running_control().cloned() else {
            return false;
        };
        control.cancel();
        let preview_chars = {
            let mut state = lock(&self.state);
            state.loading = false;
            state.paused = false;
            state.last_outcome = Some("cancelled".to_string());
            state.preview.chars().count()
        };
        self.emit(
            "stream_cancelled",
            json!({
                "generation": self.generation.load(Ordering::SeqCst),
                "preview_chars": preview_chars,
            }),
        );
        info!("stream stopped");
        true
    }

    /// Cancels any stream and clears all output.
    pub fn reset(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.control.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.state) = SessionState {
            generation,
            ..SessionState::default()
        };
        self.emit("session_reset", json!({ "generation": generation }));
    }

    /// Drops the displayed output of a finished stream. Returns false while
    /// a stream is still running.
    pub fn clear_output(&mut self) -> bool {
        let mut state = lock(&self.state);
        if state.loading {
            return false;
        }
        state.preview.clear();
        state.result = None;
        state.failure = None;
        state.last_outcome = None;
        true
    }

    /// Appends the result's references to its text.
    pub fn insert_references(&mut self) -> bool {
        let inserted = {
            let mut state = lock(&self.state);
            match state.result.as_mut() {
                Some(result) => result
                    .insert_references(self.ui_language)
                    .then(|| result.audit_trace.references.len()),
                None => None,
            }
        };
        match inserted {
            Some(count) => {
                self.emit("references_inserted", json!({ "references": count }));
                true
            }
            None => false,
        }
    }

    /// Blocks until the current stream ends. A stopped stream is not waited
    /// for; its worker finishes in the background.
    pub fn wait(&mut self) -> SessionState {
        if let Some(active) = self.active.as_mut() {
            if !active.control.is_cancelled() {
                if let Some(handle) = active.handle.take() {
                    if handle.join().is_err() {
                        warn!("stream worker panicked");
                        let mut state = lock(&self.state);
                        state.loading = false;
                        state.paused = false;
                    }
                }
            }
        }
        self.snapshot()
    }

    fn emit(&self, event_type: &str, payload: Value) {
        emit_event(self.events.as_ref(), event_type, payload);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.control.cancel();
        }
    }
}

struct StreamWorker {
    generation: u64,
    provider_name: String,
    providers: Arc<ProviderRegistry>,
    state: Arc<Mutex<SessionState>>,
    events: Option<EventWriter>,
    control: StreamControl,
}

impl StreamWorker {
    fn run(self, request: ProviderStreamRequest) {
        let started = Instant::now();
        let mut previews = 0usize;
        let outcome = match self.providers.get(&self.provider_name) {
            Some(provider) => match provider.stream(&request) {
                Ok(fragments) => drive(fragments, &self.control, |preview| {
                    previews += 1;
                    self.publish_preview(preview);
                }),
                Err(_) if self.control.is_cancelled() => StreamOutcome::Cancelled,
                Err(err) => StreamOutcome::Failed(ProcessingFailure::transport(&err)),
            },
            None => StreamOutcome::Failed(ProcessingFailure::Transport(format!(
                "provider '{}' is not registered",
                self.provider_name
            ))),
        };
        self.finish(outcome, previews, started);
    }

    fn is_current(&self, state: &SessionState) -> bool {
        state.generation == self.generation && !self.control.is_cancelled()
    }

    fn publish_preview(&self, preview: &str) {
        let mut state = lock(&self.state);
        if self.is_current(&state) {
            state.preview = preview.to_string();
        }
    }

    fn finish(self, outcome: StreamOutcome, previews: usize, started: Instant) {
        // A stop that lands after the last fragment still wins.
        let outcome = if self.control.is_cancelled() {
            StreamOutcome::Cancelled
        } else {
            outcome
        };
        let kind = outcome.kind();
        {
            let mut state = lock(&self.state);
            if state.generation != self.generation {
                debug!(generation = self.generation, "stale stream finished");
                return;
            }
            match outcome {
                StreamOutcome::Completed(result) => state.result = Some(result),
                StreamOutcome::Failed(ref failure) => {
                    warn!(kind = failure.kind(), "stream failed: {failure}");
                    state.failure = Some(failure.clone());
                }
                StreamOutcome::Cancelled => {}
            }
            state.loading = false;
            state.paused = false;
            state.last_outcome = Some(kind.to_string());
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(generation = self.generation, outcome = kind, elapsed_ms, "stream finished");
        emit_event(
            self.events.as_ref(),
            "stream_finished",
            json!({
                "generation": self.generation,
                "outcome": kind,
                "previews": previews,
                "elapsed_ms": elapsed_ms,
            }),
        );
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit_event(events: Option<&EventWriter>, event_type: &str, payload: Value) {
    let Some(writer) = events else {
        return;
    };
    if let Err(err) = writer.emit(event_type, map_object(payload)) {
        warn!(event_type, "event log write failed: {err:#}");
    }
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

//! Turns a stream of JSON text fragments into a live preview and a final
//! [`ProcessingResult`].
//!
//! The preview is speculative: after every fragment the buffer is closed
//! with `"}` and re-parsed. That only succeeds while the buffer ends inside
//! a top-level string value. Once the model moves past the `text` field the
//! parse may still succeed inside a later string, but it yields the same
//! text, which is not republished. It is a progress indicator, not a parser.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use idioma_contracts::result::ProcessingResult;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

const PREVIEW_CLOSER: &str = "\"}";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const TRANSPORT_MESSAGE_MAX_CHARS: usize = 1200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingFailure {
    /// The fragment stream itself failed. Carries the flattened error chain.
    #[error("{0}")]
    Transport(String),
    /// The model answered with a non-empty `error` field.
    #[error("{0}")]
    Refused(String),
    /// The finished buffer is not a result document.
    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl ProcessingFailure {
    /// Flattens a transport error chain into a single line.
    pub fn transport(err: &anyhow::Error) -> Self {
        Self::Transport(crate::error_chain_text(err, TRANSPORT_MESSAGE_MAX_CHARS))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Refused(_) => "refused",
            Self::Malformed(_) => "malformed",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transport(message) | Self::Refused(message) | Self::Malformed(message) => {
                message
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed(ProcessingResult),
    Failed(ProcessingFailure),
    Cancelled,
}

impl StreamOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed(failure) => failure.kind(),
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Default)]
struct ControlFlags {
    cancelled: AtomicBool,
    paused: AtomicBool,
}

/// Cooperative cancel and pause switches for one stream.
///
/// Clones share the same flags. Nothing here interrupts a blocking read on
/// the transport; the flags are honoured between fragments.
#[derive(Debug, Clone)]
pub struct StreamControl {
    flags: Arc<ControlFlags>,
    poll_interval: Duration,
}

impl Default for StreamControl {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamControl {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            flags: Arc::new(ControlFlags::default()),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    /// Flips the pause flag and returns the new state.
    pub fn toggle_pause(&self) -> bool {
        !self.flags.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    /// Sleeps in `poll_interval` steps while paused. Returns `false` as soon
    /// as cancellation is seen.
    pub fn wait_while_paused(&self) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            if !self.is_paused() {
                return true;
            }
            thread::sleep(self.poll_interval);
        }
    }
}

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: String,
    preview: Option<String>,
    fragments: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Appends `fragment` and returns the new preview when the speculative
    /// parse yields a non-empty `text` different from the current one.
    pub fn ingest(&mut self, fragment: &str) -> Option<&str> {
        self.buffer.push_str(fragment);
        self.fragments += 1;

        let candidate = format!("{}{PREVIEW_CLOSER}", self.buffer);
        let Ok(partial) = serde_json::from_str::<Value>(&candidate) else {
            trace!(buffer_len = self.buffer.len(), "preview parse missed");
            return None;
        };
        let text = partial
            .get("text")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())?;
        if self.preview.as_deref() == Some(text) {
            return None;
        }
        self.preview = Some(text.to_string());
        self.preview.as_deref()
    }

    pub fn finalize(self) -> Result<ProcessingResult, ProcessingFailure> {
        let value: Value = serde_json::from_str(&self.buffer)
            .map_err(|err| ProcessingFailure::Malformed(err.to_string()))?;
        if let Some(message) = reported_error(&value) {
            return Err(ProcessingFailure::Refused(message));
        }
        serde_json::from_value::<ProcessingResult>(value)
            .map_err(|err| ProcessingFailure::Malformed(err.to_string()))
    }
}

fn reported_error(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(message) if message.trim().is_empty() => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

/// Consumes `fragments` in order until exhaustion, failure or cancellation.
///
/// The pause gate is checked before pulling a fragment and again before
/// ingesting one that arrived while a pause was requested.
pub fn drive<I, F>(fragments: I, control: &StreamControl, mut on_preview: F) -> StreamOutcome
where
    I: IntoIterator<Item = anyhow::Result<String>>,
    F: FnMut(&str),
{
    let mut accumulator = StreamAccumulator::new();
    let mut fragments = fragments.into_iter();

    loop {
        if !control.wait_while_paused() {
            return cancelled(&accumulator);
        }
        let Some(next) = fragments.next() else {
            break;
        };
        if control.is_cancelled() {
            return cancelled(&accumulator);
        }
        let fragment = match next {
            Ok(fragment) => fragment,
            Err(err) => {
                debug!(fragments = accumulator.fragment_count(), "fragment stream failed");
                return StreamOutcome::Failed(ProcessingFailure::transport(&err));
            }
        };
        if !control.wait_while_paused() {
            return cancelled(&accumulator);
        }
        if let Some(preview) = accumulator.ingest(&fragment) {
            on_preview(preview);
        }
    }

    if control.is_cancelled() {
        return cancelled(&accumulator);
    }
    debug!(
        fragments = accumulator.fragment_count(),
        buffer_len = accumulator.buffer().len(),
        "fragment stream finished"
    );
    match accumulator.finalize() {
        Ok(result) => StreamOutcome::Completed(result),
        Err(failure) => StreamOutcome::Failed(failure),
    }
}

fn cancelled(accumulator: &StreamAccumulator) -> StreamOutcome {
    debug!(
        fragments = accumulator.fragment_count(),
        "stream cancelled; discarding buffer"
    );
    StreamOutcome::Cancelled
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    use anyhow::anyhow;
    use idioma_contracts::result::{AuditTrace, ConfidenceLevel};
    use serde_json::json;

    use super::*;

    fn ok_fragments(parts: &[&str]) -> Vec<anyhow::Result<String>> {
        parts.iter().map(|part| Ok(part.to_string())).collect()
    }

    fn fast_control() -> StreamControl {
        StreamControl::with_poll_interval(Duration::from_millis(5))
    }

    fn full_document() -> String {
        json!({
            "text": "Olá \"mundo\", com acentuação ✓",
            "confidence": "RED",
            "auditTrace": {
                "intentConfidence": "alta",
                "constraintSatisfaction": "total",
                "humanisationApplied": "sim",
                "aiTraceRisk": "baixo",
                "aiTracePercentage": 7,
                "variantCompliance": "AO45",
                "references": ["https://example.pt/a", "https://example.pt/b"]
            }
        })
        .to_string()
    }

    /// Yields fragments and runs `hook` with the index of each one handed out.
    struct Hooked<F: FnMut(usize)> {
        parts: Vec<String>,
        next: usize,
        hook: F,
    }

    impl<F: FnMut(usize)> Iterator for Hooked<F> {
        type Item = anyhow::Result<String>;

        fn next(&mut self) -> Option<Self::Item> {
            let part = self.parts.get(self.next)?.clone();
            (self.hook)(self.next);
            self.next += 1;
            Some(Ok(part))
        }
    }

    #[test]
    fn previews_follow_the_text_field_then_finalize() {
        let mut previews = Vec::new();
        let outcome = drive(
            ok_fragments(&[
                "{\"text\":\"Hel",
                "lo wor",
                "ld\",\"confidence\":\"GREEN\",\"auditTrace\":{}}",
            ]),
            &fast_control(),
            |preview| previews.push(preview.to_string()),
        );

        assert_eq!(previews, vec!["Hel".to_string(), "Hello wor".to_string()]);
        assert_eq!(
            outcome,
            StreamOutcome::Completed(ProcessingResult {
                text: "Hello world".to_string(),
                confidence: ConfidenceLevel::Green,
                audit_trace: AuditTrace::default(),
                error: None,
            })
        );
    }

    #[test]
    fn later_string_fields_do_not_republish_the_preview() {
        let mut previews = Vec::new();
        let outcome = drive(
            ok_fragments(&[
                "{\"text\":\"ab",
                "c\",\"confidence\":\"GRE",
                "EN\",\"auditTrace\":{\"aiTraceRisk\":\"lo",
                "w\"}}",
            ]),
            &fast_control(),
            |preview| previews.push(preview.to_string()),
        );

        assert_eq!(previews, vec!["ab".to_string(), "abc".to_string()]);
        assert!(matches!(outcome, StreamOutcome::Completed(result) if result.text == "abc"));
    }

    #[test]
    fn error_field_is_a_refusal() {
        let outcome = drive(
            ok_fragments(&["{\"error\":\"Refused: BR variant detected\"}"]),
            &fast_control(),
            |_| {},
        );
        assert_eq!(
            outcome,
            StreamOutcome::Failed(ProcessingFailure::Refused(
                "Refused: BR variant detected".to_string()
            ))
        );
    }

    #[test]
    fn error_field_wins_over_a_complete_result() {
        let mut accumulator = StreamAccumulator::new();
        accumulator.ingest(
            "{\"text\":\"x\",\"confidence\":\"GREEN\",\"auditTrace\":{},\"error\":\"policy\"}",
        );
        assert_eq!(
            accumulator.finalize(),
            Err(ProcessingFailure::Refused("policy".to_string()))
        );
    }

    #[test]
    fn blank_error_field_is_not_a_refusal() -> anyhow::Result<()> {
        let mut accumulator = StreamAccumulator::new();
        accumulator.ingest("{\"text\":\"x\",\"confidence\":\"GREEN\",\"auditTrace\":{},\"error\":\"\"}");
        let result = accumulator
            .finalize()
            .map_err(|failure| anyhow!("unexpected failure: {failure}"))?;
        assert_eq!(result.text, "x");
        Ok(())
    }

    #[test]
    fn garbage_is_malformed_and_never_previews() {
        let mut previews = 0;
        let outcome = drive(ok_fragments(&["not json"]), &fast_control(), |_| previews += 1);
        assert_eq!(previews, 0);
        match outcome {
            StreamOutcome::Failed(failure) => assert_eq!(failure.kind(), "malformed"),
            other => panic!("expected malformed failure, got {other:?}"),
        }
    }

    #[test]
    fn valid_json_with_wrong_shape_is_malformed() {
        let mut accumulator = StreamAccumulator::new();
        accumulator.ingest("{\"text\":\"only text\"}");
        assert!(matches!(
            accumulator.finalize(),
            Err(ProcessingFailure::Malformed(_))
        ));
    }

    #[test]
    fn fragmentation_does_not_change_the_result() {
        let document = full_document();
        let expected: ProcessingResult = serde_json::from_str(&document).unwrap();
        let boundaries = document
            .char_indices()
            .map(|(idx, _)| idx)
            .collect::<Vec<usize>>();

        for split in boundaries.iter().step_by(7) {
            let (left, right) = document.split_at(*split);
            let outcome = drive(ok_fragments(&[left, right]), &fast_control(), |_| {});
            assert_eq!(outcome, StreamOutcome::Completed(expected.clone()), "split at {split}");
        }

        let per_char = document.chars().map(|ch| Ok(ch.to_string())).collect::<Vec<_>>();
        let outcome = drive(per_char, &fast_control(), |_| {});
        assert_eq!(outcome, StreamOutcome::Completed(expected));
    }

    #[test]
    fn preview_freezes_after_text_field_closes() {
        let mut accumulator = StreamAccumulator::new();
        assert_eq!(accumulator.ingest("{\"text\":\"abc"), Some("abc"));
        // Parses again as `{"text":"abc","confidence":"GRE"}`.
        assert_eq!(accumulator.ingest("\",\"confidence\":\"GRE"), None);
        assert_eq!(accumulator.ingest("EN\",\"auditTrace\":{\"aiTraceRisk\":\"lo"), None);
        assert_eq!(accumulator.preview(), Some("abc"));
        assert_eq!(accumulator.fragment_count(), 3);
    }

    #[test]
    fn transport_failure_is_reported_verbatim() {
        let fragments: Vec<anyhow::Result<String>> = vec![
            Ok("{\"text\":\"partial".to_string()),
            Err(anyhow!("connection reset by peer")),
            Ok("never read".to_string()),
        ];
        let outcome = drive(fragments, &fast_control(), |_| {});
        assert_eq!(
            outcome,
            StreamOutcome::Failed(ProcessingFailure::Transport(
                "connection reset by peer".to_string()
            ))
        );
    }

    #[test]
    fn transport_failure_flattens_the_error_chain() {
        let fragments: Vec<anyhow::Result<String>> = vec![
            Ok("{\"text\":\"partial".to_string()),
            Err(anyhow!("connection reset by peer").context("Gemini stream read failed")),
        ];
        let outcome = drive(fragments, &fast_control(), |_| {});
        assert_eq!(
            outcome,
            StreamOutcome::Failed(ProcessingFailure::Transport(
                "Gemini stream read failed | caused by: connection reset by peer".to_string()
            ))
        );
    }

    #[test]
    fn cancellation_stops_previews_and_skips_finalize() {
        let control = fast_control();
        let cancel_on = control.clone();
        let fragments = Hooked {
            parts: vec![
                "{\"text\":\"a".to_string(),
                "b".to_string(),
                "c\",\"confidence\":\"GREEN\",\"auditTrace\":{}}".to_string(),
            ],
            next: 0,
            hook: move |idx| {
                if idx == 1 {
                    cancel_on.cancel();
                }
            },
        };
        let mut previews = Vec::new();
        let outcome = drive(fragments, &control, |preview| previews.push(preview.to_string()));
        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(previews, vec!["a".to_string()]);
    }

    #[test]
    fn cancelled_before_start_pulls_nothing() {
        let control = fast_control();
        control.cancel();
        let pulled = AtomicUsize::new(0);
        let fragments = Hooked {
            parts: vec!["{}".to_string()],
            next: 0,
            hook: |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            },
        };
        assert_eq!(drive(fragments, &control, |_| {}), StreamOutcome::Cancelled);
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn paused_stream_pulls_nothing_until_resumed() {
        let control = fast_control();
        control.pause();
        let pulled = Arc::new(AtomicUsize::new(0));
        let document = full_document();
        let chars = document.chars().collect::<Vec<char>>();
        let parts = chars
            .chunks(16)
            .map(|chunk| chunk.iter().collect::<String>())
            .collect::<Vec<String>>();
        let expected_parts = parts.len();

        let worker_control = control.clone();
        let counter = Arc::clone(&pulled);
        let handle = thread::spawn(move || {
            let fragments = Hooked {
                parts,
                next: 0,
                hook: move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            };
            drive(fragments, &worker_control, |_| {})
        });

        thread::sleep(Duration::from_millis(60));
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
        control.resume();

        let outcome = handle.join().expect("worker thread");
        assert_eq!(pulled.load(Ordering::SeqCst), expected_parts);
        let expected: ProcessingResult = serde_json::from_str(&document).unwrap();
        assert_eq!(outcome, StreamOutcome::Completed(expected));
    }

    #[test]
    fn pause_mid_stream_holds_the_received_fragment() {
        let control = fast_control();
        let pause_on = control.clone();
        let (paused_tx, paused_rx) = mpsc::channel();
        let fragments = Hooked {
            parts: vec![
                "{\"text\":\"one".to_string(),
                " two".to_string(),
                " three\",\"confidence\":\"YELLOW\",\"auditTrace\":{}}".to_string(),
            ],
            next: 0,
            hook: move |idx| {
                if idx == 1 {
                    pause_on.pause();
                    let _ = paused_tx.send(Instant::now());
                }
            },
        };

        let resumer = control.clone();
        let resume_thread = thread::spawn(move || {
            let paused_at = paused_rx.recv().expect("pause signal");
            thread::sleep(Duration::from_millis(40));
            resumer.resume();
            paused_at
        });

        let mut previews = Vec::new();
        let outcome = drive(fragments, &control, |preview| previews.push(preview.to_string()));
        let paused_at = resume_thread.join().expect("resume thread");

        assert!(paused_at.elapsed() >= Duration::from_millis(40));
        assert_eq!(previews, vec!["one".to_string(), "one two".to_string()]);
        match outcome {
            StreamOutcome::Completed(result) => {
                assert_eq!(result.text, "one two three");
                assert_eq!(result.confidence, ConfidenceLevel::Yellow);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn cancel_while_paused_ends_the_wait() {
        let control = fast_control();
        control.pause();
        let canceller = control.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        assert!(!control.wait_while_paused());
        handle.join().expect("cancel thread");
    }

    #[test]
    fn toggle_pause_reports_new_state() {
        let control = StreamControl::new();
        assert_eq!(control.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(control.toggle_pause());
        assert!(control.is_paused());
        assert!(!control.toggle_pause());
        assert!(!control.is_paused());
    }
}

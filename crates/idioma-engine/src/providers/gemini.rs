use std::io::{BufRead, BufReader};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{truncate_text, FragmentStream, ProviderStreamRequest, StreamProvider};
use crate::config::EngineConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Gemini HTTP client setup failed")?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:streamGenerateContent", self.api_base, model_path)
    }

    fn build_payload(request: &ProviderStreamRequest) -> Value {
        let mut parts = vec![json!({ "text": request.user_prompt })];
        for image in &request.images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            }));
        }

        let mut payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": request.response_schema,
            },
        });
        if request.enable_search {
            payload["tools"] = json!([{ "googleSearch": {} }]);
        }
        payload
    }

    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        api_key: &str,
        payload: &Value,
        request: &ProviderStreamRequest,
    ) -> Result<HttpResponse> {
        let max_retries = request.transport.retries;
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(endpoint)
                .query(&[("alt", "sse")])
                .header(API_KEY_HEADER, api_key)
                .timeout(request.transport.request_timeout)
                .json(payload)
                .send();

            match response {
                Ok(ok) => return Ok(ok),
                Err(raw) => {
                    let err = anyhow::Error::new(raw.without_url())
                        .context(format!("Gemini request failed ({endpoint})"));
                    if !is_retryable_transport_error(&err) || attempt >= max_retries {
                        return Err(err);
                    }
                    warn!(
                        attempt = attempt + 1,
                        max_retries, "Gemini transport retry after transient request failure"
                    );
                    let delay_s = request.transport.retry_backoff_s * (attempt as f64 + 1.0);
                    thread::sleep(Duration::from_secs_f64(delay_s));
                    attempt += 1;
                }
            }
        }
    }
}

impl StreamProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn stream(&self, request: &ProviderStreamRequest) -> Result<FragmentStream> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY, GOOGLE_API_KEY or API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);
        debug!(
            model = %request.model,
            images = request.images.len(),
            search = request.enable_search,
            "Gemini stream request"
        );

        let response = self.post_with_transport_retries(&endpoint, api_key, &payload, request)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .context("Gemini response body read failed")?;
            bail!(
                "Gemini request failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            );
        }
        Ok(Box::new(SseFragments::new(BufReader::new(response))))
    }
}

fn is_retryable_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

/// Reads a `text/event-stream` body and yields the response text carried by
/// each `data:` event. Events without text are skipped.
pub(crate) struct SseFragments<R> {
    reader: R,
    pending: Vec<String>,
    done: bool,
}

impl<R: BufRead> SseFragments<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            done: false,
        }
    }

    /// Returns `Some` when the buffered event produced a fragment or failed.
    fn dispatch(&mut self) -> Option<Result<String>> {
        if self.pending.is_empty() {
            return None;
        }
        let data = self.pending.join("\n");
        self.pending.clear();
        if data.trim() == "[DONE]" {
            self.done = true;
            return None;
        }
        match event_text(&data) {
            Ok(Some(text)) => Some(Ok(text)),
            Ok(None) => None,
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        while !self.done {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.done = true;
                    return self.dispatch();
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(anyhow::Error::new(err).context("Gemini stream read failed")));
                }
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                if let Some(item) = self.dispatch() {
                    return Some(item);
                }
                continue;
            }
            if let Some(data) = trimmed.strip_prefix("data:") {
                self.pending
                    .push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        None
    }
}

fn event_text(data: &str) -> Result<Option<String>> {
    let payload: Value =
        serde_json::from_str(data).context("Gemini stream returned invalid JSON event")?;

    if let Some(error) = payload.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(anyhow!("Gemini stream error: {}", truncate_text(&message, 512)));
    }
    if let Some(reason) = payload
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        bail!("Gemini blocked the prompt ({reason})");
    }

    let text = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(text))
}

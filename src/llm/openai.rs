use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::provider::{CompletionInput, CompletionOutput, LlmError, LlmProvider, LlmResult};
use crate::trace::SessionTrace;

/// The original agent ran its model at temperature zero.
const COMPLETION_TEMPERATURE: f32 = 0.0;
const COMPLETION_MAX_TOKENS: u32 = 256;
const ERROR_BODY_PREVIEW_CHARS: usize = 400;

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    trace: Option<SessionTrace>,
}

impl OpenAiProvider {
    /// A missing key is not an error here: it surfaces on the first
    /// completion call instead.
    pub fn new(client: Client, api_key: Option<String>, model: String, base_url: String) -> Self {
        Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/completions", self.base_url)
    }

    fn build_request(&self, input: &CompletionInput) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            prompt: input.prompt.clone(),
            temperature: COMPLETION_TEMPERATURE,
            max_tokens: COMPLETION_MAX_TOKENS,
            stop: input.stop.clone(),
        }
    }

    fn extract_text(resp: CompletionResponse) -> LlmResult<String> {
        for choice in resp.choices {
            if !choice.text.trim().is_empty() {
                return Ok(choice.text);
            }
        }

        Err(LlmError::EmptyResponse)
    }
}

impl LlmProvider for OpenAiProvider {
    async fn complete(&self, input: CompletionInput) -> LlmResult<CompletionOutput> {
        let Some(api_key) = &self.api_key else {
            return Err(LlmError::MissingApiKey);
        };

        let payload = self.build_request(&input);
        let endpoint = self.endpoint();
        if let Some(trace) = &self.trace {
            let body = serde_json::to_string(&payload).unwrap_or_default();
            trace.log_http_request("POST", &endpoint, &body);
        }

        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if let Some(trace) = &self.trace {
                    trace.log_http_error(&err.to_string());
                }
                LlmError::Transport(err.to_string())
            })?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|err| LlmError::Transport(err.to_string()))?;
        if let Some(trace) = &self.trace {
            trace.log_http_response(status, &body);
        }

        if !(200..300).contains(&status) {
            let body = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
            return Err(LlmError::HttpStatus { status, body });
        }

        let parsed = serde_json::from_str::<CompletionResponse>(&body)
            .map_err(|err| LlmError::Parse(err.to_string()))?;
        let text = Self::extract_text(parsed)?;
        Ok(CompletionOutput { text })
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

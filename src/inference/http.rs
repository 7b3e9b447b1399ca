//! OpenAI-compatible chat-completions backend.

use super::{CompletionService, Prompt, ServiceError};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ureq::Agent;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Low temperature keeps answers consistent across reruns.
const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 150;

pub struct ChatCompletionService {
    agent: Agent,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionService {
    pub fn new(base_url: &str, api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("base URL must start with http:// or https://: {base_url}"));
        }
        if api_key.trim().is_empty() {
            return Err(anyhow!("API key is empty"));
        }
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Ok(Self {
            agent: config.into(),
            endpoint: format!("{base_url}/chat/completions"),
            api_key,
            model,
        })
    }
}

impl CompletionService for ChatCompletionService {
    fn complete(&self, prompt: &Prompt) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key.trim()))
            .send_json(&body)
            .map_err(|err| ServiceError::transient(format!("call {}: {err}", self.endpoint)))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response
                .body_mut()
                .read_to_string()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_status(status, &text));
        }

        let parsed: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| ServiceError::transient(format!("decode chat response: {err}")))?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ServiceError::transient("chat response has no message content"))
    }

    fn describe(&self) -> String {
        format!("{} at {}", self.model, self.endpoint)
    }
}

/// Map an HTTP failure status to a retry class.
pub fn classify_status(status: u16, body: &str) -> ServiceError {
    let message = format!(
        "HTTP {status}: {}",
        crate::util::truncate_string(body.trim(), 300)
    );
    match status {
        408 | 409 | 429 | 500..=599 => ServiceError::transient(message),
        _ => ServiceError::permanent(message),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

//! OpenAI-compatible chat completions backend for [`LlmProvider`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::config::LlmConfig;
use crate::error::{ErrorCode, MemoryError, Result};
use crate::http::JsonClient;

pub struct OpenAiLlmProvider {
    http: JsonClient,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl OpenAiLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "no API key set for LLM provider");
        }
        let http = JsonClient::new(
            &config.base_url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
            ErrorCode::LlmError,
        )?;
        Ok(Self {
            http,
            model: config.model.clone(),
        })
    }
}

impl LlmProvider for OpenAiLlmProvider {
    fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response: ChatResponse = self.http.post("/chat/completions", &request)?;
        first_content(response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn first_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| MemoryError::new(ErrorCode::LlmError, "model returned an empty reply"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{\"entities\": []}"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(response).unwrap(), r#"{"entities": []}"#);
    }

    #[test]
    fn empty_reply_is_llm_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert_eq!(first_content(response).unwrap_err().code, ErrorCode::LlmError);

        let response: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert_eq!(first_content(response).unwrap_err().code, ErrorCode::LlmError);
    }

    #[test]
    fn request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage { role: "system", content: "s" },
                ChatMessage { role: "user", content: "u" },
            ],
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["response_format"]["type"], "json_object");
    }
}

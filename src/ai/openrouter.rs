use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::ChatMessage;
use crate::config::AppConfig;
use crate::error::CompletionError;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

/// One chat-completion call per [`CompletionClient::complete`].
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: Client,
    api_url: String,
    app_name: String,
}

impl CompletionClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: Client::new(),
            api_url: config.api_url.clone(),
            app_name: config.app_name.clone(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Sends `messages` to `model` and returns the extracted answer text.
    ///
    /// Non-2xx responses come back as [`CompletionError::Api`] with the raw
    /// body so callers can classify them; transport failures become
    /// [`CompletionError::Network`].
    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        api_key: &str,
    ) -> Result<String, CompletionError> {
        log::debug!("POST {} (model: {})", self.api_url, model);

        let request = CompletionRequest { model, messages };

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.app_name)
            .header("X-Title", &self.app_name)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                log::warn!("Completion request to {} failed: {}", self.api_url, e);
                CompletionError::Network(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            log::warn!("Failed to read completion body ({}): {}", status, e);
            CompletionError::Network(e)
        })?;

        if !status.is_success() {
            log::warn!("Completion API error ({}) for model {}", status, model);
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(extract_text(&body))
    }
}

/// Pulls the answer out of a completion body.
///
/// Tries `choices[0].message.content` as a string, then as an array of parts
/// joined by newlines (parts without text are JSON-encoded), then
/// `choices[0].text`, then `choices[0].message` as a string. When nothing is
/// found the whole body is returned as text. Never fails.
pub fn extract_text(body: &str) -> String {
    let Ok(data) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    let answer = data
        .get("choices")
        .and_then(|c| c.get(0))
        .map(choice_text)
        .unwrap_or_default();

    if answer.is_empty() {
        data.to_string()
    } else {
        answer
    }
}

fn choice_text(choice: &Value) -> String {
    let message = choice.get("message");
    match message.and_then(|m| m.get("content")) {
        Some(Value::String(s)) => return s.clone(),
        Some(Value::Array(parts)) => {
            return parts
                .iter()
                .map(|part| match part.get("text").and_then(Value::as_str) {
                    Some(text) if !text.is_empty() => text.to_string(),
                    _ => part.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n");
        }
        _ => {}
    }
    if let Some(text) = choice.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    message
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

use std::sync::OnceLock;

use futures::{Stream, StreamExt};
use regex::Regex;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;

/// Any failure talking to the model collapses into this one outcome. Callers
/// switch to the deterministic fallback and never retry.
#[derive(Debug, Error)]
#[error("model unavailable: {reason}")]
pub(crate) struct Unavailable {
    pub(crate) reason: String,
}

impl Unavailable {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: &'static str,
    pub(crate) content: String,
}

impl ChatMessage {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ModelClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ModelClient {
    pub(crate) fn new(client: reqwest::Client, settings: &Settings) -> Self {
        Self {
            client,
            api_key: settings.ai().api_key.clone(),
            base_url: settings.ai().base_url.trim_end_matches('/').to_string(),
            model: settings.ai().model.clone(),
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", normalized_base_url(&self.base_url))
    }

    /// One non-streaming completion. Single attempt; every failure mode is
    /// reported as `Unavailable`.
    pub(crate) async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
    ) -> Result<String, Unavailable> {
        if !self.is_configured() {
            return Err(Unavailable::new("API key missing"));
        }

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| Unavailable::new(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Unavailable::new(format!("upstream status {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| Unavailable::new(format!("invalid response body: {err}")))?;

        let content = extract_content(&body);
        if content.is_empty() {
            return Err(Unavailable::new("empty completion content"));
        }

        Ok(content)
    }

    /// Completion that must come back as JSON. Markdown fences are stripped
    /// and an embedded JSON block is extracted before giving up.
    pub(crate) async fn complete_json(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> Result<Value, Unavailable> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let text = self.complete(&messages, temperature).await?;
        parse_json_reply(&text).ok_or_else(|| Unavailable::new("reply was not valid JSON"))
    }

    /// Streaming completion; yields content deltas in arrival order. The
    /// stream itself surfaces mid-flight failures as `Unavailable` items.
    pub(crate) async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
    ) -> Result<impl Stream<Item = Result<String, Unavailable>> + Send, Unavailable> {
        if !self.is_configured() {
            return Err(Unavailable::new("API key missing"));
        }

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "stream": true,
        });

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| Unavailable::new(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Unavailable::new(format!("upstream status {status}")));
        }

        let body = response.bytes_stream();

        Ok(async_stream::stream! {
            futures::pin_mut!(body);
            let mut buffer = String::new();
            'read: while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(Unavailable::new(format!("stream failed: {err}")));
                        break 'read;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        break 'read;
                    }
                    if let Some(delta) = parse_stream_delta(data) {
                        yield Ok(delta);
                    }
                }
            }
        })
    }
}

/// DeepSeek-compatible endpoints expect a `/v1` suffix unless the configured
/// base already pins an API version.
fn normalized_base_url(base: &str) -> String {
    static VERSION_SUFFIX: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_SUFFIX.get_or_init(|| Regex::new(r"/v\d+$").expect("version suffix regex"));

    let base = base.trim_end_matches('/');
    if re.is_match(base) {
        base.to_string()
    } else {
        format!("{base}/v1")
    }
}

fn extract_content(body: &Value) -> String {
    let content = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"));

    match content {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.clone()),
                Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("text") => {
                    map.get("text").and_then(Value::as_str).map(str::to_string)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

fn parse_stream_delta(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    let delta = value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .filter(|delta| !delta.is_empty())?;
    Some(delta.to_string())
}

/// Strip markdown fences and stray whitespace before JSON parsing.
pub(crate) fn sanitize_payload(content: &str) -> String {
    static OPEN_FENCE: OnceLock<Regex> = OnceLock::new();
    static CLOSE_FENCE: OnceLock<Regex> = OnceLock::new();

    let mut text = content.trim().to_string();
    if text.starts_with("```") {
        let open = OPEN_FENCE
            .get_or_init(|| Regex::new(r"(?i)^```(?:json)?").expect("open fence regex"));
        let close = CLOSE_FENCE.get_or_init(|| Regex::new(r"```$").expect("close fence regex"));
        text = open.replace(&text, "").trim().to_string();
        text = close.replace(&text, "").trim().to_string();
    }
    text
}

pub(crate) fn parse_json_reply(text: &str) -> Option<Value> {
    static JSON_BLOCK: OnceLock<Regex> = OnceLock::new();

    let sanitized = sanitize_payload(text);
    if sanitized.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(&sanitized) {
        return Some(value);
    }

    let block = JSON_BLOCK
        .get_or_init(|| Regex::new(r"(?s)(\{.*\}|\[.*\])").expect("json block regex"));
    let captured = block.captures(&sanitized)?.get(1)?.as_str();
    serde_json::from_str(captured).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_version_suffix() {
        assert_eq!(normalized_base_url("https://api.deepseek.com"), "https://api.deepseek.com/v1");
        assert_eq!(
            normalized_base_url("https://api.deepseek.com/v1/"),
            "https://api.deepseek.com/v1"
        );
        assert_eq!(normalized_base_url("https://proxy.local/v2"), "https://proxy.local/v2");
    }

    #[test]
    fn sanitize_strips_fences() {
        assert_eq!(sanitize_payload("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(sanitize_payload("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn json_reply_recovers_embedded_block() {
        let reply = "Sure, here you go: {\"is_correct\": true} hope that helps";
        let value = parse_json_reply(reply).expect("embedded json");
        assert_eq!(value["is_correct"], true);
    }

    #[test]
    fn json_reply_rejects_prose() {
        assert!(parse_json_reply("no structured data here").is_none());
    }

    #[test]
    fn content_extraction_handles_part_lists() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": "world"}
            ]}}]
        });
        assert_eq!(extract_content(&body), "Hello world");
    }

    #[test]
    fn stream_delta_parsing() {
        let data = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(parse_stream_delta(data), Some("Hi".to_string()));
        assert_eq!(parse_stream_delta(r#"{"choices":[{"delta":{}}]}"#), None);
    }

    #[tokio::test]
    async fn unconfigured_client_is_unavailable() {
        let client = ModelClient {
            client: reqwest::Client::new(),
            api_key: String::new(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
        };

        let err = client
            .complete(&[ChatMessage::user("ping")], 0.4)
            .await
            .expect_err("missing key must be unavailable");
        assert!(err.reason.contains("API key"));
    }
}

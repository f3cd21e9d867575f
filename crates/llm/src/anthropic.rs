use async_trait::async_trait;
use consilium_common::{ConsiliumError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::{LlmClient, LlmRequest, LlmResponse, Role, TokenUsage};
use crate::http::{build_http_client, send_error, status_error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContent>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    usage: Option<AnthropicUsage>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Chat client for the Anthropic Messages API. Completion only; Anthropic
/// has no embeddings endpoint.
pub struct AnthropicClient {
    base_url: String,
    model: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(model: String, api_key: String) -> Self {
        Self::with_options(None, model, api_key, Duration::from_secs(60))
    }

    pub fn with_options(
        base_url: Option<String>,
        model: String,
        api_key: String,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| ANTHROPIC_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            api_key,
            http_client: build_http_client(timeout),
        }
    }

    fn role_to_string(role: &Role) -> &'static str {
        match role {
            Role::System => "user", // system messages go in the top-level system field
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn build_messages(request: &LlmRequest) -> Vec<AnthropicMessage> {
        request
            .messages
            .iter()
            .filter(|msg| msg.role != Role::System)
            .map(|msg| AnthropicMessage {
                role: Self::role_to_string(&msg.role).to_string(),
                content: vec![AnthropicContent {
                    content_type: "text".to_string(),
                    text: msg.content.clone(),
                }],
            })
            .collect()
    }

    fn build_request_body(&self, request: &LlmRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            messages: Self::build_messages(request),
            system: request.system_prompt.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(&request);

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error("Anthropic", e))?;

        if !response.status().is_success() {
            return Err(status_error("Anthropic", response).await);
        }

        let anthropic_response: AnthropicResponse =
            response.json().await.map_err(|e| ConsiliumError::Backend {
                status: None,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        let content = anthropic_response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            content,
            model: anthropic_response.model,
            usage: anthropic_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
            finish_reason: anthropic_response.stop_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatMessage;

    #[test]
    fn synthesis_request_body_matches_anthropic_format() {
        let client = AnthropicClient::new(
            "claude-sonnet-4-20250514".to_string(),
            "sk-ant-test".to_string(),
        );
        let request = LlmRequest {
            system_prompt: Some("Combine the specialist answers.".to_string()),
            messages: vec![
                ChatMessage::user("## Infrastructure\nUse a pool of 20."),
                ChatMessage {
                    role: Role::Assistant,
                    content: "Noted.".to_string(),
                },
                ChatMessage::user("Now write the final answer."),
            ],
            temperature: Some(0.3),
            max_tokens: Some(1024),
        };

        let body = client.build_request_body(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "claude-sonnet-4-20250514");
        assert_eq!(json["system"], "Combine the specialist answers.");
        let temp = json["temperature"].as_f64().unwrap();
        assert!((temp - 0.3).abs() < 0.001);
        assert_eq!(json["max_tokens"], 1024);

        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"][0]["type"], "text");
        assert_eq!(messages[1]["role"], "assistant");
    }

    #[test]
    fn system_messages_are_lifted_out_of_the_list() {
        let client = AnthropicClient::new("claude-sonnet-4-20250514".to_string(), "key".to_string());
        let request = LlmRequest {
            system_prompt: Some("Classify the request.".to_string()),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: "stray system turn".to_string(),
                },
                ChatMessage::user("How do I rotate TLS certs?"),
            ],
            temperature: None,
            max_tokens: None,
        };

        let body = client.build_request_body(&request);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["system"], "Classify the request.");
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(json["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    /// Serve one canned HTTP response on a random port. Returns the base URL
    /// and a receiver for the raw request text.
    async fn serve_once(response: String) -> (String, tokio::sync::oneshot::Receiver<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(String::from_utf8_lossy(&raw).to_string());
        });

        (format!("http://{addr}"), rx)
    }

    fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {status}\r\n");
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str(&format!(
            "content-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ));
        out
    }

    fn client_for(base_url: String) -> AnthropicClient {
        AnthropicClient::with_options(
            Some(base_url),
            "claude-sonnet-4-20250514".to_string(),
            "sk-ant-test".to_string(),
            Duration::from_secs(5),
        )
    }

    fn classify_request() -> LlmRequest {
        LlmRequest {
            system_prompt: Some("Classify the request.".to_string()),
            messages: vec![ChatMessage::user("How do I rotate TLS certs?")],
            temperature: Some(0.2),
            max_tokens: Some(512),
        }
    }

    #[tokio::test]
    async fn completion_goes_to_configured_base_url() {
        let body = r#"{"content":[{"type":"text","text":"{\"required_responders\":"},{"type":"text","text":"[\"security\"]}"}],"model":"claude-sonnet-4-20250514","usage":{"input_tokens":42,"output_tokens":7},"stop_reason":"end_turn"}"#;
        let (base_url, request_rx) = serve_once(http_response("200 OK", &[], body)).await;

        let response = client_for(base_url).complete(classify_request()).await.unwrap();
        assert_eq!(response.content, r#"{"required_responders":["security"]}"#);
        assert_eq!(response.finish_reason.as_deref(), Some("end_turn"));
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 42);
        assert_eq!(usage.completion_tokens, 7);

        let raw = request_rx.await.unwrap();
        assert!(raw.starts_with("POST /v1/messages HTTP/1.1"));
        assert!(raw.to_lowercase().contains("x-api-key: sk-ant-test"));
        assert!(raw.to_lowercase().contains("anthropic-version: 2023-06-01"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let (base_url, _rx) = serve_once(http_response(
            "401 Unauthorized",
            &[],
            r#"{"type":"error","error":{"type":"authentication_error"}}"#,
        ))
        .await;

        let err = client_for(base_url)
            .complete(classify_request())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsiliumError::Auth(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let (base_url, _rx) = serve_once(http_response(
            "429 Too Many Requests",
            &[("retry-after", "7")],
            r#"{"type":"error","error":{"type":"rate_limit_error"}}"#,
        ))
        .await;

        let err = client_for(base_url)
            .complete(classify_request())
            .await
            .unwrap_err();
        match err {
            ConsiliumError::RateLimited { retry_after_ms, .. } => {
                assert_eq!(retry_after_ms, Some(7000))
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overloaded_is_a_transient_backend_error() {
        let (base_url, _rx) = serve_once(http_response(
            "529 Site Overloaded",
            &[],
            r#"{"type":"error","error":{"type":"overloaded_error"}}"#,
        ))
        .await;

        let err = client_for(base_url)
            .complete(classify_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsiliumError::Backend {
                status: Some(529),
                ..
            }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn custom_base_url() {
        let client = AnthropicClient::with_options(
            Some("http://proxy.internal:8080/".to_string()),
            "claude-sonnet-4-20250514".to_string(),
            "key".to_string(),
            Duration::from_secs(5),
        );
        assert_eq!(client.base_url, "http://proxy.internal:8080");
    }
}

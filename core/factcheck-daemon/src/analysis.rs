//! Outbound calls to the chat-completion service.
//!
//! One POST per check, no retry. The raw `choices[0].message.content` text is
//! returned to the coordinator, which hands it to the parser.

use factcheck_core::ServiceConfig;
use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = "You are a fact-checking assistant. Evaluate the claim provided by the user and reply using exactly this layout and nothing else:

<truth percentage, an integer from 0 to 100>%

<a short summary of at most three sentences explaining the verdict>

Sources:
1. <url>
2. <url>
3. <url>
4. <url>
5. <url>

List exactly five source URLs that support the summary.";

const MAX_ERROR_BODY_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum ServiceFailure {
    #[error("API key not configured; set {0}")]
    MissingApiKey(String),

    #[error("Analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Analysis request failed: {0}")]
    Transport(String),

    #[error("Malformed analysis response: {0}")]
    Envelope(String),
}

/// The text-analysis backend. Implementations block until the service
/// answers and return the raw reply text.
pub trait AnalysisService: Send + Sync {
    fn analyze(&self, text: &str) -> Result<String, ServiceFailure>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpAnalysisService {
    agent: ureq::Agent,
    config: ServiceConfig,
}

impl HttpAnalysisService {
    pub fn new(config: ServiceConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(config.timeout())
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent, config }
    }
}

impl AnalysisService for HttpAnalysisService {
    fn analyze(&self, text: &str) -> Result<String, ServiceFailure> {
        let api_key = self
            .config
            .api_key()
            .ok_or_else(|| ServiceFailure::MissingApiKey(self.config.api_key_env.clone()))?;

        let mut response = self
            .agent
            .post(self.config.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", api_key))
            .send_json(build_request(&self.config, text))
            .map_err(|err| ServiceFailure::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ServiceFailure::Transport(format!("failed to read body: {}", err)))?;

        if !status.is_success() {
            return Err(ServiceFailure::Status {
                status: status.as_u16(),
                body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS),
            });
        }

        extract_content(&body)
    }
}

fn build_request<'a>(config: &'a ServiceConfig, text: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model: &config.model,
        messages: [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: text,
            },
        ],
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        top_p: config.top_p,
    }
}

/// Pulls `choices[0].message.content` out of a chat-completion envelope.
pub fn extract_content(body: &str) -> Result<String, ServiceFailure> {
    let envelope: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|err| ServiceFailure::Envelope(format!("invalid JSON: {}", err)))?;

    envelope
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ServiceFailure::Envelope("no message content in choices".to_string()))
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_chat_completion_shape() {
        let config = ServiceConfig::default();
        let body = serde_json::to_value(build_request(&config, "the sky is green")).unwrap();

        assert_eq!(body["model"], "sonar");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "the sky is green"}));
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["top_p"], 0.9);
    }

    #[test]
    fn extracts_first_choice_content() {
        let body = json!({
            "id": "cmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "80%\nTrue."}},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}}
            ]
        })
        .to_string();
        assert_eq!(extract_content(&body).unwrap(), "80%\nTrue.");
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        assert!(matches!(
            extract_content("not json"),
            Err(ServiceFailure::Envelope(_))
        ));
        assert!(matches!(
            extract_content(r#"{"choices": []}"#),
            Err(ServiceFailure::Envelope(_))
        ));
        assert!(matches!(
            extract_content(r#"{"choices": [{"message": {"content": "  "}}]}"#),
            Err(ServiceFailure::Envelope(_))
        ));
    }

    #[test]
    fn missing_api_key_fails_before_network() {
        let service = HttpAnalysisService::new(ServiceConfig {
            endpoint: "http://127.0.0.1:9/never".to_string(),
            api_key_env: "FACTCHECK_TEST_UNSET_KEY".to_string(),
            ..ServiceConfig::default()
        });
        assert!(matches!(
            service.analyze("claim"),
            Err(ServiceFailure::MissingApiKey(name)) if name == "FACTCHECK_TEST_UNSET_KEY"
        ));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS + 10);
        let truncated = truncate_chars(&body, MAX_ERROR_BODY_CHARS);
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS + 3);
    }
}

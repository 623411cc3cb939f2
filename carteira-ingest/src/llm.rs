use crate::IngestError;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A large language model capable of reading a PDF and returning text expected to contain a
/// JSON document.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn extract(
        &self,
        pdf: &[u8],
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, IngestError>;
}

/// Anthropic messages-API adapter. The PDF travels base64-encoded as a document content block.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    async fn extract(
        &self,
        pdf: &[u8],
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, IngestError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(pdf);

        debug!(pdf_size = pdf.len(), model = %self.model, "llm extraction started");

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "document",
                        "source": {
                            "type": "base64",
                            "media_type": "application/pdf",
                            "data": encoded,
                        },
                    },
                    {
                        "type": "text",
                        "text": prompt,
                    },
                ],
            }],
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|error| IngestError::Llm(error.to_string()))?
            .error_for_status()
            .map_err(|error| IngestError::Llm(error.to_string()))?;

        let message: MessagesResponse = response
            .json()
            .await
            .map_err(|error| IngestError::Llm(error.to_string()))?;

        info!(
            input_tokens = message.usage.as_ref().map(|usage| usage.input_tokens),
            output_tokens = message.usage.as_ref().map(|usage| usage.output_tokens),
            "llm extraction complete"
        );

        message
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| IngestError::Llm("response contained no text block".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Parse the JSON document out of an LLM response.
///
/// Tries a strict parse first, then the first ```json fenced block, then any fenced block.
pub fn extract_json(text: &str) -> Result<Value, IngestError> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body_start = start + fence.len();
            if let Some(length) = text[body_start..].find("```") {
                let candidate = text[body_start..body_start + length].trim();
                if let Ok(value) = serde_json::from_str(candidate) {
                    return Ok(value);
                }
            }
        }
    }

    let preview: String = text.chars().take(500).collect();
    Err(IngestError::ParseFailed(format!(
        "could not parse JSON from response: {preview}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_strict() {
        let value = extract_json(r#"{"transactions": []}"#).unwrap();
        assert_eq!(value, json!({"transactions": []}));
    }

    #[test]
    fn test_extract_json_fenced_json_block() {
        let text = "Here is the extraction:\n```json\n{\"period\": {\"end_date\": \"2024-01-31\"}}\n```\nDone.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["period"]["end_date"], json!("2024-01-31"));
    }

    #[test]
    fn test_extract_json_bare_fence() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_extract_json_failure() {
        assert!(matches!(
            extract_json("no json here"),
            Err(IngestError::ParseFailed(_))
        ));
    }
}

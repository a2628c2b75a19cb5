use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::RewriteConfig;
use crate::errors::{BenchError, BenchResult};
use crate::services::traits::QueryRewriter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Client for the vision completion endpoint used to rewrite instructions.
pub struct VisionRewriteClient {
    api_url: String,
    model: String,
    channel: Option<String>,
    temperature: f64,
    max_tokens: u32,
    api_key: Option<String>,
    headers: HeaderMap,
    extra_body: serde_json::Map<String, serde_json::Value>,
    system_prompt: String,
    user_template: String,
    client: reqwest::Client,
}

impl VisionRewriteClient {
    pub fn new(config: &RewriteConfig, client: reqwest::Client) -> BenchResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| BenchError::Config(format!("rewrite header '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| BenchError::Config(format!("rewrite header '{name}' value: {e}")))?;
            headers.insert(name, value);
        }

        let extra_body = match serde_json::to_value(&config.extra_body)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        Ok(Self {
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            channel: config.channel.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key: config.resolved_api_key(),
            headers,
            extra_body,
            system_prompt: config.system_prompt()?,
            user_template: config.user_template.clone(),
            client,
        })
    }

    fn messages(&self, image_url: &str, instruction: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system".into(),
                content: MessageContent::Text(self.system_prompt.clone()),
            },
            ChatMessage {
                role: "user".into(),
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: self.user_template.replace("{instruction}", instruction),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url.to_string() },
                    },
                ]),
            },
        ]
    }

    /// Request body: configured extra fields first, then the fields this
    /// client owns, which win on conflict.
    pub fn build_body(&self, image_url: &str, instruction: &str) -> BenchResult<serde_json::Value> {
        let mut body = serde_json::Value::Object(self.extra_body.clone());
        body["model"] = serde_json::json!(self.model);
        body["messages"] = serde_json::to_value(self.messages(image_url, instruction))?;
        body["temperature"] = serde_json::json!(self.temperature);
        body["maxTokens"] = serde_json::json!(self.max_tokens);
        if let Some(channel) = &self.channel {
            body["channel"] = serde_json::json!(channel);
        }
        Ok(body)
    }
}

#[async_trait]
impl QueryRewriter for VisionRewriteClient {
    async fn rewrite(&self, image_url: &str, instruction: &str) -> BenchResult<String> {
        let body = self.build_body(image_url, instruction)?;

        tracing::debug!(
            model = %self.model,
            image_url = %image_url,
            instruction = %instruction,
            "sending rewrite request"
        );

        let mut request = self
            .client
            .post(&self.api_url)
            .headers(self.headers.clone())
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let started = Instant::now();
        let response = request.send().await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(BenchError::Rewrite(format!("{}: {}", status, err_body)));
        }

        let json: serde_json::Value = response.json().await?;
        let content = completion_text(&json).ok_or_else(|| {
            BenchError::Rewrite(format!("no completion text in response: {json}"))
        })?;
        let description = element_description(content);

        tracing::info!(
            elapsed_ms,
            content_len = content.len(),
            rewritten = %description,
            "rewrite response received"
        );
        Ok(description)
    }
}

/// Completion text, either wrapped in a gateway `data` envelope or at the
/// top level as in OpenAI-compatible replies.
pub fn completion_text(json: &serde_json::Value) -> Option<&str> {
    json["data"]["choices"][0]["message"]["content"]
        .as_str()
        .or_else(|| json["choices"][0]["message"]["content"].as_str())
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?").expect("static regex"))
}

/// Extract `element_description` from the model's reply. Replies that are
/// not JSON, or JSON without that key, are used verbatim after fence removal.
pub fn element_description(content: &str) -> String {
    let stripped = code_fence().replace_all(content, "");
    let stripped = stripped.trim();
    match serde_json::from_str::<serde_json::Value>(stripped) {
        Ok(json) => match json["element_description"].as_str() {
            Some(desc) => desc.to_string(),
            None => {
                tracing::warn!(content = %stripped, "rewrite reply has no element_description");
                stripped.to_string()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, content = %stripped, "rewrite reply is not JSON, using raw text");
            stripped.to_string()
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use zeroize::Zeroize;

use crate::providers::ProviderError;
use crate::traits::{ModelProvider, ProviderResponse, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Provider for the Google Gemini generateContent API.
pub struct GoogleGenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl Drop for GoogleGenAiProvider {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl GoogleGenAiProvider {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Result<Self, String> {
        let client = crate::providers::build_http_client(Duration::from_secs(120))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Convert OpenAI-format messages to Gemini "contents" + "system_instruction".
fn convert_messages(messages: &[Value]) -> (Option<Value>, Vec<Value>) {
    let mut system_instruction: Option<Value> = None;
    let mut contents = Vec::new();

    for msg in messages {
        let role = msg["role"].as_str().unwrap_or("user");
        let text = msg["content"].as_str().unwrap_or("");

        match role {
            "system" => {
                // Multiple system messages concatenate into one instruction.
                if let Some(existing) = &mut system_instruction {
                    if let Some(parts) = existing["parts"].as_array_mut() {
                        parts.push(json!({"text": text}));
                    }
                } else {
                    system_instruction = Some(json!({
                        "parts": [{ "text": text }]
                    }));
                }
            }
            "assistant" => {
                contents.push(json!({
                    "role": "model",
                    "parts": [{ "text": text }]
                }));
            }
            _ => {
                contents.push(json!({
                    "role": "user",
                    "parts": [{ "text": text }]
                }));
            }
        }
    }
    (system_instruction, contents)
}

#[async_trait]
impl ModelProvider for GoogleGenAiProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        temperature: f32,
    ) -> anyhow::Result<ProviderResponse> {
        let (system_instruction, contents) = convert_messages(messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": { "temperature": temperature },
        });
        if let Some(sys) = system_instruction {
            body["system_instruction"] = sys;
        }

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        info!(model, "Calling Gemini API");

        let resp = match self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("HTTP request failed: {}", e);
                return Err(ProviderError::network(&e).into());
            }
        };

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            error!(status = %status, "Gemini API error: {}", text);
            return Err(ProviderError::from_status(status.as_u16(), &text).into());
        }

        let data: Value = serde_json::from_str(&text)?;
        let candidate = data["candidates"]
            .get(0)
            .ok_or_else(|| anyhow::anyhow!("No candidates in response"))?;

        // Candidates can carry several text parts; join them.
        let content = candidate["content"]["parts"].as_array().map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        });
        debug!(
            chars = content.as_deref().map(str::len).unwrap_or(0),
            "Gemini response parsed"
        );

        let usage = data.get("usageMetadata").and_then(|u| {
            Some(TokenUsage {
                input_tokens: u.get("promptTokenCount")?.as_u64()? as u32,
                output_tokens: u.get("candidatesTokenCount")?.as_u64()? as u32,
                model: model.to_string(),
            })
        });

        Ok(ProviderResponse { content, usage })
    }
}

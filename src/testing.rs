//! Test infrastructure: MockProvider and MockToolRunner.
//!
//! Used by the in-file unit tests and the integration tests to exercise the
//! real planning and dispatch loop without any network.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::traits::{ModelProvider, ProviderResponse, TokenUsage, ToolRunner};
use crate::types::{RunnerRequest, RunnerResponse};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// A recorded call to `MockProvider::chat()`.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MockChatCall {
    pub model: String,
    pub messages: Vec<Value>,
    pub temperature: f32,
}

/// Mock LLM provider with a FIFO queue of scripted outcomes: `Ok(text)`
/// becomes a text response, `Err(msg)` a transport-level failure.
pub struct MockProvider {
    responses: Mutex<Vec<Result<String, String>>>,
    delay: Mutex<Option<Duration>>,
    pub call_log: Mutex<Vec<MockChatCall>>,
}

impl MockProvider {
    /// Create a provider that always returns "Mock response".
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            call_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            delay: Mutex::new(None),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent call sleep before answering, to exercise
    /// caller-side timeouts.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// How many times `chat()` was called.
    pub async fn call_count(&self) -> usize {
        self.call_log.lock().await.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn chat(
        &self,
        model: &str,
        messages: &[Value],
        temperature: f32,
    ) -> anyhow::Result<ProviderResponse> {
        self.call_log.lock().await.push(MockChatCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature,
        });

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.responses.lock().await;
        let next = if responses.is_empty() {
            Ok("Mock response".to_string())
        } else {
            responses.remove(0)
        };

        match next {
            Ok(text) => Ok(ProviderResponse {
                content: Some(text),
                usage: Some(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    model: "mock".to_string(),
                }),
            }),
            Err(msg) => Err(anyhow::anyhow!(msg)),
        }
    }
}

// ---------------------------------------------------------------------------
// MockToolRunner
// ---------------------------------------------------------------------------

/// Mock execution service. Results are keyed by tool name; unscripted tools
/// get a generic success payload. Every dispatched request is recorded.
pub struct MockToolRunner {
    results: Mutex<HashMap<String, Result<Value, String>>>,
    delay: Mutex<Option<Duration>>,
    pub requests: Mutex<Vec<RunnerRequest>>,
}

impl MockToolRunner {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent dispatch sleep before answering, to exercise
    /// caller-side timeouts.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// Script a successful result for a tool.
    pub async fn script(&self, tool: &str, result: Value) {
        self.results
            .lock()
            .await
            .insert(tool.to_string(), Ok(result));
    }

    /// Script a failure for a tool.
    pub async fn script_failure(&self, tool: &str, message: &str) {
        self.results
            .lock()
            .await
            .insert(tool.to_string(), Err(message.to_string()));
    }

    /// How many dispatches were made.
    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Tool names in dispatch order.
    pub async fn dispatched_tools(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .filter_map(|r| r.tools.first().map(|t| t.tool.clone()))
            .collect()
    }
}

impl Default for MockToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    async fn run(&self, request: &RunnerRequest) -> anyhow::Result<RunnerResponse> {
        self.requests.lock().await.push(request.clone());

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let tool = request
            .tools
            .first()
            .map(|t| t.tool.clone())
            .unwrap_or_default();

        let scripted = self.results.lock().await.get(&tool).cloned();
        match scripted {
            Some(Ok(result)) => Ok(RunnerResponse {
                agent_response: format!("{} completed", tool),
                tool_calls: vec![json!({"tool": tool})],
                results: vec![result],
            }),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => Ok(RunnerResponse {
                agent_response: format!("{} completed", tool),
                tool_calls: vec![json!({"tool": tool})],
                results: vec![json!({"status": "ok", "tool": tool})],
            }),
        }
    }
}

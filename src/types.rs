use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One executed plan step, reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedStep {
    pub tool: String,
    pub parameters: Value,
    pub result: Value,
    pub success: bool,
}

/// The outcome of one conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantTurn {
    pub message: String,
    pub tool_calls: Vec<ExecutedStep>,
}

impl AssistantTurn {
    /// A turn that carries text only — no tools were executed.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// One step on the wire to the operation-execution service.
///
/// The external contract only supports a single `next_tool` pointer per step,
/// so only linear chains are representable end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireStep {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_tool: Option<String>,
    pub parameters: Value,
}

/// Request body for the operation-execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerRequest {
    pub tools: Vec<WireStep>,
    pub user_message: String,
    pub context: String,
}

/// Response body from the operation-execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResponse {
    pub agent_response: String,
    #[serde(default)]
    pub tool_calls: Vec<Value>,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl RunnerResponse {
    /// The result payload for the dispatched step. The service reports one
    /// result per executed tool; for a single-step dispatch that is the last
    /// (only) entry. Falls back to the agent text when the service returned
    /// no structured result.
    pub fn step_result(&self) -> Value {
        self.results
            .last()
            .cloned()
            .unwrap_or_else(|| Value::String(self.agent_response.clone()))
    }
}

//! Routing plans: the structured output describing whether and how to fulfil
//! a request via tool calls.
//!
//! A plan is ephemeral — created fresh per user turn, consumed synchronously
//! by validator → resolver → driver, and discarded. No plan state survives
//! across turns.

pub mod generator;
pub mod resolver;
pub mod validator;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use generator::{GenerationError, PlanGenerator, ProviderSlot};
pub use resolver::{resolve, ExecutionOrder, PlannedStep};
pub use validator::{validate, ValidationError};

/// How the planner classified the request's difficulty. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Simple,
    Moderate,
    Complex,
}

/// Whether the declared steps run as a chain or side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Sequential,
    #[default]
    Parallel,
}

/// One planned invocation of a catalog tool.
///
/// `depends_on` names other steps in the same plan (by tool name) whose
/// output this step's parameters may reference via `{{tool_name}}`
/// placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStep {
    pub tool: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionPlan {
    #[serde(rename = "type", default)]
    pub kind: PlanKind,
    #[serde(default)]
    pub steps: Vec<ToolStep>,
}

/// Structured classification + plan for one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPlan {
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub is_off_topic: bool,
    #[serde(default)]
    pub requires_tools: bool,
    #[serde(default)]
    pub execution_plan: ExecutionPlan,
    #[serde(default)]
    pub missing_info: Vec<String>,
    #[serde(default)]
    pub complexity: Complexity,
}

impl RoutingPlan {
    pub fn steps(&self) -> &[ToolStep] {
        &self.execution_plan.steps
    }

    pub fn step(&self, tool: &str) -> Option<&ToolStep> {
        self.execution_plan.steps.iter().find(|s| s.tool == tool)
    }

    /// Parse LLM output as a RoutingPlan. Lenient about markdown fences and
    /// leading/trailing prose, strict about the JSON itself.
    pub fn from_llm_text(text: &str) -> Result<Self, serde_json::Error> {
        let stripped = strip_code_fences(text);
        let json_str = extract_json_object(stripped).unwrap_or(stripped);
        serde_json::from_str(json_str)
    }
}

/// Remove a surrounding ```json / ``` fence if present.
fn strip_code_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest;
    } else if let Some(rest) = t.strip_prefix("```") {
        t = rest;
    }
    if let Some(rest) = t.strip_suffix("```") {
        t = rest;
    }
    t.trim()
}

/// Slice from the first '{' to the last '}' — models occasionally wrap the
/// object in prose despite the strict-JSON directive.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_plan() {
        let plan = RoutingPlan::from_llm_text(
            r#"{"analysis":"price lookup","is_off_topic":false,"requires_tools":true,
                "execution_plan":{"type":"parallel","steps":[
                    {"tool":"fetch_price","reason":"user asked","parameters":{"query":"bitcoin"}}
                ]},
                "missing_info":[],"complexity":"simple"}"#,
        )
        .unwrap();
        assert!(plan.requires_tools);
        assert_eq!(plan.execution_plan.kind, PlanKind::Parallel);
        assert_eq!(plan.steps().len(), 1);
        assert_eq!(plan.steps()[0].tool, "fetch_price");
        assert_eq!(plan.steps()[0].parameters["query"], json!("bitcoin"));
        assert!(plan.steps()[0].depends_on.is_empty());
    }

    #[test]
    fn parses_fenced_output() {
        let text = "```json\n{\"is_off_topic\":true,\"requires_tools\":false}\n```";
        let plan = RoutingPlan::from_llm_text(text).unwrap();
        assert!(plan.is_off_topic);
        assert!(!plan.requires_tools);
    }

    #[test]
    fn parses_output_wrapped_in_prose() {
        let text = "Here is the plan:\n{\"requires_tools\":false,\"analysis\":\"chit-chat\"}\nDone.";
        let plan = RoutingPlan::from_llm_text(text).unwrap();
        assert_eq!(plan.analysis, "chit-chat");
    }

    #[test]
    fn rejects_free_text() {
        assert!(RoutingPlan::from_llm_text("Sure! I'd be happy to help.").is_err());
    }

    #[test]
    fn missing_fields_default() {
        let plan = RoutingPlan::from_llm_text("{}").unwrap();
        assert!(!plan.is_off_topic);
        assert!(!plan.requires_tools);
        assert!(plan.missing_info.is_empty());
        assert_eq!(plan.complexity, Complexity::Simple);
        assert!(plan.steps().is_empty());
    }

    #[test]
    fn depends_on_round_trips() {
        let plan = RoutingPlan::from_llm_text(
            r#"{"requires_tools":true,"execution_plan":{"type":"sequential","steps":[
                {"tool":"get_balance","parameters":{"address":"0xAAA"}},
                {"tool":"fetch_price","parameters":{"query":"solana"}},
                {"tool":"calculate","parameters":{"expression":"{{get_balance}} / {{fetch_price}}"},
                 "depends_on":["get_balance","fetch_price"]}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(plan.execution_plan.kind, PlanKind::Sequential);
        assert_eq!(
            plan.step("calculate").unwrap().depends_on,
            vec!["get_balance", "fetch_price"]
        );
    }
}

//! Plan generation: one fixed instruction template plus an ordered provider
//! chain.
//!
//! Off-topic classification and tool-plan generation happen in the SAME
//! call — one round trip bounds latency and cost. Each provider attempt is
//! independently timeout-wrapped; on any failure (network, timeout,
//! non-JSON output, schema mismatch) the chain advances. Exhaustion is a
//! `GenerationError` and the caller falls back to plain conversation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::catalog::ToolCatalog;
use crate::context::ContextWindow;
use crate::plan::RoutingPlan;
use crate::providers::ProviderError;
use crate::traits::ModelProvider;

/// One entry in the provider chain.
#[derive(Clone)]
pub struct ProviderSlot {
    /// Human-readable name for logs ("groq", "gemini", …).
    pub label: String,
    pub provider: Arc<dyn ModelProvider>,
    pub model: String,
}

/// No provider in the chain returned a schema-valid plan.
#[derive(Debug)]
pub struct GenerationError {
    pub attempts: usize,
    pub last_error: String,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "all {} provider(s) failed to produce a valid plan; last error: {}",
            self.attempts, self.last_error
        )
    }
}

impl std::error::Error for GenerationError {}

pub struct PlanGenerator {
    chain: Vec<ProviderSlot>,
    planning_prompt: String,
    chat_prompt: String,
    planning_temperature: f32,
    chat_temperature: f32,
    attempt_timeout: Duration,
}

impl PlanGenerator {
    pub fn new(
        chain: Vec<ProviderSlot>,
        catalog: &ToolCatalog,
        planning_temperature: f32,
        chat_temperature: f32,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            planning_prompt: build_planning_prompt(catalog),
            chat_prompt: build_chat_prompt(catalog),
            planning_temperature,
            chat_temperature,
            attempt_timeout,
        }
    }

    /// Classify the request and, if applicable, produce an execution plan.
    /// The window's last message is the user turn being planned for.
    pub async fn generate(&self, window: &ContextWindow) -> Result<RoutingPlan, GenerationError> {
        let mut messages = vec![json!({"role": "system", "content": self.planning_prompt})];
        messages.extend(window.to_chat_values());

        let mut last_error = String::from("provider chain is empty");
        for slot in &self.chain {
            match self.attempt(slot, &messages, self.planning_temperature).await {
                Ok(text) => match RoutingPlan::from_llm_text(&text) {
                    Ok(plan) => {
                        info!(
                            provider = slot.label.as_str(),
                            model = slot.model.as_str(),
                            requires_tools = plan.requires_tools,
                            is_off_topic = plan.is_off_topic,
                            steps = plan.steps().len(),
                            "Plan generated"
                        );
                        return Ok(plan);
                    }
                    Err(e) => {
                        warn!(
                            provider = slot.label.as_str(),
                            error = %e,
                            "Provider returned non-plan output; trying next"
                        );
                        debug!(provider = slot.label.as_str(), raw = text.as_str(), "Unparseable plan output");
                        last_error = format!("{}: schema mismatch: {}", slot.label, e);
                    }
                },
                Err(e) => {
                    warn!(
                        provider = slot.label.as_str(),
                        error = e.as_str(),
                        "Provider attempt failed; trying next"
                    );
                    last_error = format!("{}: {}", slot.label, e);
                }
            }
        }

        Err(GenerationError {
            attempts: self.chain.len(),
            last_error,
        })
    }

    /// Plain conversational call — no tools, no plan. Used for chit-chat
    /// turns and for every fallback edge. `annotation` carries any partial
    /// analysis already computed so the reply stays relevant.
    pub async fn plain_chat(
        &self,
        window: &ContextWindow,
        annotation: Option<&str>,
    ) -> Result<String, GenerationError> {
        let mut system = self.chat_prompt.clone();
        if let Some(note) = annotation {
            system.push_str("\n\nContext from earlier processing of this request: ");
            system.push_str(note);
        }

        let mut messages = vec![json!({"role": "system", "content": system})];
        messages.extend(window.to_chat_values());

        let mut last_error = String::from("provider chain is empty");
        for slot in &self.chain {
            match self.attempt(slot, &messages, self.chat_temperature).await {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => {
                    last_error = format!("{}: empty response", slot.label);
                }
                Err(e) => {
                    last_error = format!("{}: {}", slot.label, e);
                }
            }
        }

        Err(GenerationError {
            attempts: self.chain.len(),
            last_error,
        })
    }

    /// One timeout-wrapped provider call, returning the response text.
    async fn attempt(
        &self,
        slot: &ProviderSlot,
        messages: &[Value],
        temperature: f32,
    ) -> Result<String, String> {
        let call = slot.provider.chat(&slot.model, messages, temperature);
        match tokio::time::timeout(self.attempt_timeout, call).await {
            Ok(Ok(response)) => response.content.ok_or_else(|| "empty response".to_string()),
            Ok(Err(e)) => {
                // Classified provider errors carry their kind into the log;
                // either way the chain advances to the next slot.
                if let Some(pe) = e.downcast_ref::<ProviderError>() {
                    warn!(
                        provider = slot.label.as_str(),
                        kind = ?pe.kind,
                        status = pe.status,
                        retry_after_secs = pe.retry_after_secs,
                        retryable = pe.is_retryable(),
                        "Provider call failed"
                    );
                    Err(pe.to_string())
                } else {
                    Err(e.to_string())
                }
            }
            Err(_) => Err(format!(
                "timed out after {}s",
                self.attempt_timeout.as_secs()
            )),
        }
    }
}

fn catalog_block(catalog: &ToolCatalog) -> String {
    let mut block = String::new();
    for tool in catalog.iter() {
        block.push_str(&format!(
            "- {}: {} (required parameters: {})",
            tool.name,
            tool.description,
            if tool.required_parameters.is_empty() {
                "none".to_string()
            } else {
                tool.required_parameters.join(", ")
            }
        ));
        if let Some(example) = tool.example_phrasings.first() {
            block.push_str(&format!(" e.g. \"{}\"", example));
        }
        block.push('\n');
    }
    block
}

fn build_planning_prompt(catalog: &ToolCatalog) -> String {
    format!(
        r#"You are the planning engine for a blockchain assistant. Analyze the user's request and decide in ONE response whether it is on-topic, whether it needs tools, and if so produce an execution plan.

AVAILABLE TOOLS:
{catalog}
RESPONSE FORMAT — return ONLY a JSON object, no markdown, no extra text:
{{
  "analysis": "one or two sentences of reasoning",
  "is_off_topic": false,
  "requires_tools": true,
  "execution_plan": {{
    "type": "sequential" or "parallel",
    "steps": [
      {{"tool": "tool_name", "reason": "why", "parameters": {{...}}, "depends_on": ["other_tool"]}}
    ]
  }},
  "missing_info": [],
  "complexity": "simple" | "moderate" | "complex"
}}

RULES:
1. Requests unrelated to blockchain operations (weather, sports, general trivia) are off-topic: set is_off_topic true, requires_tools false, no steps.
2. Use each tool at most once per plan. depends_on entries must name other steps in the same plan.
3. A step may reference an earlier step's output with a {{{{tool_name}}}} placeholder in its parameters.
4. Use type "sequential" when outputs feed later steps, listing steps in dependency order; "parallel" when steps are independent.
5. If required parameters are missing and cannot be inferred, list one clarification question per missing field in missing_info and leave steps empty.
6. Casual conversation about blockchain that needs no operation: requires_tools false, no steps.

EXAMPLES:

User: "What is BTC price?"
{{"analysis": "Simple price lookup.", "is_off_topic": false, "requires_tools": true, "execution_plan": {{"type": "parallel", "steps": [{{"tool": "fetch_price", "reason": "user asked for the bitcoin price", "parameters": {{"query": "bitcoin"}}, "depends_on": []}}]}}, "missing_info": [], "complexity": "simple"}}

User: "Show me ETH and SOL prices and my balance for 0xAAA"
{{"analysis": "Three independent lookups.", "is_off_topic": false, "requires_tools": true, "execution_plan": {{"type": "parallel", "steps": [{{"tool": "fetch_price", "reason": "price lookups", "parameters": {{"query": "ethereum, solana"}}, "depends_on": []}}, {{"tool": "get_balance", "reason": "balance of the given wallet", "parameters": {{"address": "0xAAA"}}, "depends_on": []}}]}}, "missing_info": [], "complexity": "moderate"}}

User: "How much Solana can I buy with the balance of wallet 0xAAA?"
{{"analysis": "Needs the wallet balance and the SOL price, then a derived amount.", "is_off_topic": false, "requires_tools": true, "execution_plan": {{"type": "sequential", "steps": [{{"tool": "get_balance", "reason": "balance feeds the calculation", "parameters": {{"address": "0xAAA"}}, "depends_on": []}}, {{"tool": "fetch_price", "reason": "SOL price feeds the calculation", "parameters": {{"query": "solana"}}, "depends_on": []}}, {{"tool": "calculate", "reason": "derive the purchasable amount", "parameters": {{"expression": "{{{{get_balance}}}} / {{{{fetch_price}}}}"}}, "depends_on": ["get_balance", "fetch_price"]}}]}}, "missing_info": [], "complexity": "complex"}}

User: "Transfer some tokens to Alice"
{{"analysis": "A transfer is requested but the amount, recipient address, and token are unknown.", "is_off_topic": false, "requires_tools": true, "execution_plan": {{"type": "parallel", "steps": []}}, "missing_info": ["How many tokens should be transferred?", "What is the recipient's wallet address?", "Which token should be transferred?"], "complexity": "simple"}}

User: "What's the weather today?"
{{"analysis": "Weather is unrelated to blockchain operations.", "is_off_topic": true, "requires_tools": false, "execution_plan": {{"type": "parallel", "steps": []}}, "missing_info": [], "complexity": "simple"}}
"#,
        catalog = catalog_block(catalog)
    )
}

fn build_chat_prompt(catalog: &ToolCatalog) -> String {
    format!(
        "You are a helpful assistant for a blockchain platform. You can discuss \
         and explain operations like these:\n{}\nBe conversational and concise. \
         Explain operations in simple terms. Do not invent transaction results \
         or balances — if the user needs a live value you could not retrieve, \
         say so and suggest retrying.",
        catalog_block(catalog)
    )
}

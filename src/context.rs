//! Context window management: build a token-budgeted slice of conversation
//! history for a generation call.
//!
//! Pure functions of their inputs — no side effects, deterministic output.

use serde_json::{json, Value};
use tracing::debug;

use crate::traits::Message;

/// Fixed characters-per-token ratio. A cheap heuristic, not a tokenizer;
/// good enough for budgeting. Swap in a real tokenizer if bit-exact counts
/// against a specific model ever matter.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate token count from text (~4 chars per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN
}

/// A token-budgeted, chronologically ordered slice of conversation history.
/// Read-only from the core's perspective: filtered and truncated, never
/// mutated.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    pub system_preamble: Option<String>,
    pub messages: Vec<Message>,
}

impl ContextWindow {
    /// Render as a chat-style message list for a provider call, system
    /// preamble first.
    pub fn to_chat_values(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(preamble) = &self.system_preamble {
            out.push(json!({"role": "system", "content": preamble}));
        }
        for msg in &self.messages {
            out.push(json!({"role": msg.role, "content": msg.content}));
        }
        out
    }

    /// The most recent message (always present by construction).
    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Build a context window from the persisted history plus the latest user
/// message.
///
/// The preamble (if any) and `latest` are always included. Prior messages
/// are walked backward from most recent and admitted greedily while the
/// running token estimate stays under `budget_tokens`, then re-emitted in
/// original chronological order.
pub fn build_window(
    system_preamble: Option<&str>,
    prior: &[Message],
    latest: &Message,
    budget_tokens: usize,
) -> ContextWindow {
    let mut used = estimate_tokens(latest.content.as_str());
    if let Some(preamble) = system_preamble {
        used += estimate_tokens(preamble);
    }

    // Walk backward, collect indices that fit.
    let mut selected: Vec<usize> = Vec::new();
    for idx in (0..prior.len()).rev() {
        let cost = estimate_tokens(&prior[idx].content);
        if used + cost > budget_tokens {
            break;
        }
        used += cost;
        selected.push(idx);
    }
    selected.reverse();

    let mut messages: Vec<Message> = selected.iter().map(|&i| prior[i].clone()).collect();
    messages.push(latest.clone());

    if messages.len() <= prior.len() {
        debug!(
            total = prior.len(),
            kept = messages.len() - 1,
            estimated_tokens = used,
            budget_tokens,
            "Context window: dropped older messages to fit budget"
        );
    }

    ContextWindow {
        system_preamble: system_preamble.map(|s| s.to_string()),
        messages,
    }
}

/// Compress a tool result quoted back into a fallback prompt.
/// Below `max_chars` it passes through unchanged.
pub fn compress_tool_result(result: &str, max_chars: usize) -> String {
    if result.len() <= max_chars {
        return result.to_string();
    }
    let mut end = max_chars.saturating_sub(30);
    while end > 0 && !result.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… [truncated {} chars]", &result[..end], result.len())
}

//! The orchestration engine: one entry point per user turn.
//!
//! Pipeline: load history → build context window → generate routing plan →
//! validate → resolve → dispatch execution groups → compose the reply.
//! Every failure edge past the history load degrades to a plain
//! conversational response; only [`ConversationStore`] errors propagate.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{info, warn};

use crate::catalog::ToolCatalog;
use crate::config::{AppConfig, ProviderKind};
use crate::context::{build_window, compress_tool_result, ContextWindow};
use crate::plan::{resolve, validate, PlanGenerator, PlannedStep, ProviderSlot, RoutingPlan};
use crate::plan::resolver::bind_parameters;
use crate::providers::{GoogleGenAiProvider, OpenAiCompatibleProvider};
use crate::runner::HttpToolRunner;
use crate::session::{InMemorySessionStore, SessionStore, SystemClock};
use crate::store::InMemoryConversationStore;
use crate::traits::{ConversationStore, Message, ModelProvider, ToolRunner};
use crate::types::{AssistantTurn, ExecutedStep, RunnerRequest, WireStep};

/// Fixed reply for requests outside the blockchain domain. Deliberately not
/// model-generated, so the refusal is consistent and cannot be steered.
pub const OFF_TOPIC_REPLY: &str = "I can only help with blockchain-related requests — \
    token prices, wallet balances, transfers, and contract deployments. \
    Is there something in that area I can do for you?";

/// Last-resort reply when even the conversational fallback is unavailable.
const UNAVAILABLE_REPLY: &str =
    "I'm having trouble processing requests right now. Please try again in a moment.";

const SESSION_PLAN_KEY: &str = "last_plan";
const RESULT_COMPRESS_CHARS: usize = 800;

pub struct Engine {
    generator: PlanGenerator,
    catalog: ToolCatalog,
    runner: Arc<dyn ToolRunner>,
    store: Arc<dyn ConversationStore>,
    sessions: Arc<dyn SessionStore>,
    token_budget: usize,
    step_timeout: Duration,
    session_ttl: Duration,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generator: PlanGenerator,
        catalog: ToolCatalog,
        runner: Arc<dyn ToolRunner>,
        store: Arc<dyn ConversationStore>,
        sessions: Arc<dyn SessionStore>,
        token_budget: usize,
        step_timeout: Duration,
        session_ttl: Duration,
    ) -> Self {
        Self {
            generator,
            catalog,
            runner,
            store,
            sessions,
            token_budget,
            step_timeout,
            session_ttl,
        }
    }

    /// Wire up an engine from a config file, with an in-memory conversation
    /// store. Embedders with durable persistence use [`Engine::new`].
    pub fn from_config_path(path: &Path) -> anyhow::Result<Self> {
        let config = AppConfig::load(path)?;
        Self::from_config(&config, Arc::new(InMemoryConversationStore::new()))
    }

    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn ConversationStore>,
    ) -> anyhow::Result<Self> {
        let mut chain = Vec::with_capacity(config.providers.len());
        for pc in &config.providers {
            let provider: Arc<dyn ModelProvider> = match pc.kind {
                ProviderKind::OpenaiCompatible => {
                    let base_url = pc
                        .base_url
                        .as_deref()
                        .ok_or_else(|| anyhow::anyhow!("openai_compatible provider needs base_url"))?;
                    Arc::new(
                        OpenAiCompatibleProvider::new(base_url, &pc.api_key)
                            .map_err(|e| anyhow::anyhow!(e))?,
                    )
                }
                ProviderKind::GoogleGenai => Arc::new(
                    GoogleGenAiProvider::new(&pc.api_key, pc.base_url.as_deref())
                        .map_err(|e| anyhow::anyhow!(e))?,
                ),
            };
            chain.push(ProviderSlot {
                label: pc.label.clone(),
                provider,
                model: pc.model.clone(),
            });
        }

        let catalog = if config.tools.is_empty() {
            ToolCatalog::default()
        } else {
            ToolCatalog::new(config.tools.clone())
        };
        let generator = PlanGenerator::new(
            chain,
            &catalog,
            config.planner.temperature,
            config.planner.chat_temperature,
            Duration::from_secs(config.planner.attempt_timeout_secs),
        );
        let runner = Arc::new(
            HttpToolRunner::new(
                &config.executor.base_url,
                Duration::from_secs(config.executor.timeout_secs),
            )
            .map_err(|e| anyhow::anyhow!(e))?,
        );
        let sessions = Arc::new(InMemorySessionStore::new(Arc::new(SystemClock)));

        Ok(Self::new(
            generator,
            catalog,
            runner,
            store,
            sessions,
            config.context_window.token_budget,
            Duration::from_secs(config.executor.timeout_secs),
            Duration::from_secs(config.session.ttl_seconds),
        ))
    }

    /// Process one user message and produce the assistant's turn.
    ///
    /// Errors are returned only for conversation store failures; everything
    /// else resolves to a best-effort conversational reply.
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        user_message: &str,
    ) -> anyhow::Result<AssistantTurn> {
        let prior = self.store.history(conversation_id).await?;
        let latest = Message::new(conversation_id, "user", user_message);
        self.store.append(&latest).await?;

        let window = build_window(None, &prior, &latest, self.token_budget);

        let turn = self.run_pipeline(conversation_id, user_message, &window).await;

        let reply = Message::new(conversation_id, "assistant", &turn.message);
        self.store.append(&reply).await?;
        Ok(turn)
    }

    async fn run_pipeline(
        &self,
        conversation_id: &str,
        user_message: &str,
        window: &ContextWindow,
    ) -> AssistantTurn {
        let plan = match self.generator.generate(window).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(conversation_id, error = %e, "Plan generation failed; falling back to chat");
                return self.fallback(window, None).await;
            }
        };

        if plan.is_off_topic {
            info!(conversation_id, "Off-topic request rejected");
            return AssistantTurn::text(OFF_TOPIC_REPLY);
        }

        if !plan.requires_tools {
            return self.fallback(window, Some(&plan.analysis)).await;
        }

        if !plan.missing_info.is_empty() {
            return AssistantTurn::text(clarification_message(&plan.missing_info));
        }

        if let Err(e) = validate(&plan, &self.catalog) {
            warn!(conversation_id, error = %e, "Generated plan failed validation; falling back");
            return self.fallback(window, Some(&plan.analysis)).await;
        }

        if plan.steps().is_empty() {
            // requires_tools with no steps and no questions: the planner
            // contradicted itself. Treat as plain conversation.
            return self.fallback(window, Some(&plan.analysis)).await;
        }

        self.cache_plan(conversation_id, &plan).await;
        self.execute(conversation_id, user_message, window, &plan)
            .await
    }

    /// Drive the resolved execution order group by group. Steps within a
    /// group are dispatched concurrently; any failure aborts the remaining
    /// groups and degrades to conversational fallback.
    async fn execute(
        &self,
        conversation_id: &str,
        user_message: &str,
        window: &ContextWindow,
        plan: &RoutingPlan,
    ) -> AssistantTurn {
        let order = resolve(plan);
        info!(
            conversation_id,
            steps = order.step_count(),
            groups = order.groups.len(),
            "Executing plan"
        );

        let mut results: HashMap<String, Value> = HashMap::new();
        let mut executed: Vec<ExecutedStep> = Vec::new();
        let mut final_texts: Vec<String> = Vec::new();

        for group in &order.groups {
            let dispatches = group.iter().map(|step| {
                let bound = bind_parameters(&step.parameters, &results);
                self.dispatch_step(user_message, &plan.analysis, step, bound)
            });
            let outcomes = join_all(dispatches).await;

            let mut group_failed = false;
            final_texts.clear();
            for (step, outcome) in group.iter().zip(outcomes) {
                match outcome {
                    Ok((parameters, result, agent_text)) => {
                        results.insert(step.tool.clone(), result.clone());
                        executed.push(ExecutedStep {
                            tool: step.tool.clone(),
                            parameters,
                            result,
                            success: true,
                        });
                        final_texts.push(agent_text);
                    }
                    Err((parameters, e)) => {
                        warn!(
                            conversation_id,
                            tool = step.tool.as_str(),
                            error = %e,
                            "Tool step failed; aborting plan"
                        );
                        executed.push(ExecutedStep {
                            tool: step.tool.clone(),
                            parameters,
                            result: Value::String(e.to_string()),
                            success: false,
                        });
                        group_failed = true;
                    }
                }
            }

            if group_failed {
                let annotation = failure_annotation(&executed, &results);
                let mut turn = self.fallback(window, Some(&annotation)).await;
                turn.tool_calls = executed;
                return turn;
            }
        }

        let message = if final_texts.is_empty() {
            UNAVAILABLE_REPLY.to_string()
        } else {
            final_texts.join("\n\n")
        };

        AssistantTurn {
            message,
            tool_calls: executed,
        }
    }

    /// Dispatch one step to the execution service with a cooperative timeout.
    /// Returns (bound parameters, result value, agent text) on success.
    async fn dispatch_step(
        &self,
        user_message: &str,
        analysis: &str,
        step: &PlannedStep,
        bound: serde_json::Map<String, Value>,
    ) -> Result<(Value, Value, String), (Value, anyhow::Error)> {
        let parameters = Value::Object(bound);
        let request = RunnerRequest {
            tools: vec![WireStep {
                tool: step.tool.clone(),
                next_tool: step.next_tool.clone(),
                parameters: parameters.clone(),
            }],
            user_message: user_message.to_string(),
            context: analysis.to_string(),
        };

        match tokio::time::timeout(self.step_timeout, self.runner.run(&request)).await {
            Ok(Ok(response)) => {
                let result = response.step_result();
                Ok((parameters, result, response.agent_response))
            }
            Ok(Err(e)) => Err((parameters, e)),
            Err(_) => Err((
                parameters,
                anyhow::anyhow!("timed out after {}s", self.step_timeout.as_secs()),
            )),
        }
    }

    /// Plain conversational reply, annotated with whatever partial analysis
    /// exists. If even that fails, a static apology goes out.
    async fn fallback(&self, window: &ContextWindow, annotation: Option<&str>) -> AssistantTurn {
        match self.generator.plain_chat(window, annotation).await {
            Ok(text) => AssistantTurn::text(text),
            Err(e) => {
                warn!(error = %e, "Conversational fallback failed; returning canned reply");
                AssistantTurn::text(UNAVAILABLE_REPLY)
            }
        }
    }

    /// Keep the last routing plan in session state for debugging. Best
    /// effort; serialization of a RoutingPlan cannot fail in practice.
    async fn cache_plan(&self, conversation_id: &str, plan: &RoutingPlan) {
        if let Ok(value) = serde_json::to_value(plan) {
            self.sessions
                .put(conversation_id, SESSION_PLAN_KEY, value, self.session_ttl)
                .await;
        }
    }
}

fn clarification_message(questions: &[String]) -> String {
    let mut msg = String::from("Before I can do that, I need a few details:");
    for q in questions {
        msg.push_str("\n- ");
        msg.push_str(q);
    }
    msg
}

/// Summarize what already ran for the fallback prompt, with results
/// compressed so a verbose tool payload cannot blow the prompt budget.
fn failure_annotation(executed: &[ExecutedStep], results: &HashMap<String, Value>) -> String {
    let mut parts = Vec::new();
    for step in executed {
        if step.success {
            let rendered = results
                .get(&step.tool)
                .map(|v| v.to_string())
                .unwrap_or_default();
            parts.push(format!(
                "{} succeeded with {}",
                step.tool,
                compress_tool_result(&rendered, RESULT_COMPRESS_CHARS)
            ));
        } else {
            parts.push(format!(
                "{} failed ({})",
                step.tool,
                compress_tool_result(&step.result.to_string(), RESULT_COMPRESS_CHARS)
            ));
        }
    }
    format!(
        "Some blockchain operations could not be completed. Outcomes so far: {}. \
         Apologize briefly and suggest retrying.",
        parts.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clarification_lists_every_question() {
        let msg = clarification_message(&[
            "How many tokens?".to_string(),
            "Which wallet?".to_string(),
        ]);
        assert!(msg.contains("- How many tokens?"));
        assert!(msg.contains("- Which wallet?"));
    }

    #[test]
    fn failure_annotation_covers_successes_and_failures() {
        let executed = vec![
            ExecutedStep {
                tool: "get_balance".into(),
                parameters: Value::Null,
                result: serde_json::json!({"eth": "1.0"}),
                success: true,
            },
            ExecutedStep {
                tool: "fetch_price".into(),
                parameters: Value::Null,
                result: Value::String("connection refused".into()),
                success: false,
            },
        ];
        let mut results = HashMap::new();
        results.insert("get_balance".to_string(), serde_json::json!({"eth": "1.0"}));
        let note = failure_annotation(&executed, &results);
        assert!(note.contains("get_balance succeeded"));
        assert!(note.contains("fetch_price failed"));
    }
}

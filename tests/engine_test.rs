//! End-to-end tests for the orchestration engine: scripted planner output,
//! mock execution service, real validation/resolution/dispatch path.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use chainflow::catalog::ToolCatalog;
use chainflow::engine::{Engine, OFF_TOPIC_REPLY};
use chainflow::plan::{PlanGenerator, ProviderSlot};
use chainflow::session::{InMemorySessionStore, SystemClock};
use chainflow::store::InMemoryConversationStore;
use chainflow::testing::{MockProvider, MockToolRunner};
use chainflow::traits::{ConversationStore, Message};

struct Harness {
    engine: Engine,
    provider: Arc<MockProvider>,
    runner: Arc<MockToolRunner>,
    store: Arc<InMemoryConversationStore>,
}

fn harness(responses: Vec<Result<String, String>>) -> Harness {
    harness_with_budget(responses, 100_000)
}

fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn harness_with_budget(responses: Vec<Result<String, String>>, token_budget: usize) -> Harness {
    harness_full(responses, token_budget, Duration::from_secs(5))
}

fn harness_with_step_timeout(
    responses: Vec<Result<String, String>>,
    step_timeout: Duration,
) -> Harness {
    harness_full(responses, 100_000, step_timeout)
}

fn harness_full(
    responses: Vec<Result<String, String>>,
    token_budget: usize,
    step_timeout: Duration,
) -> Harness {
    init_tracing();
    let provider = Arc::new(MockProvider::with_responses(responses));
    let runner = Arc::new(MockToolRunner::new());
    let store = Arc::new(InMemoryConversationStore::new());
    let catalog = ToolCatalog::default();

    let generator = PlanGenerator::new(
        vec![ProviderSlot {
            label: "mock".to_string(),
            provider: provider.clone(),
            model: "mock-model".to_string(),
        }],
        &catalog,
        0.2,
        0.7,
        Duration::from_secs(5),
    );

    let engine = Engine::new(
        generator,
        catalog,
        runner.clone(),
        store.clone(),
        Arc::new(InMemorySessionStore::new(Arc::new(SystemClock))),
        token_budget,
        step_timeout,
        Duration::from_secs(3600),
    );

    Harness {
        engine,
        provider,
        runner,
        store,
    }
}

fn parallel_price_plan() -> String {
    json!({
        "analysis": "Two independent lookups.",
        "is_off_topic": false,
        "requires_tools": true,
        "execution_plan": {
            "type": "parallel",
            "steps": [
                {"tool": "fetch_price", "reason": "price", "parameters": {"query": "ethereum"}},
                {"tool": "get_balance", "reason": "balance", "parameters": {"address": "0xAAA"}}
            ]
        },
        "missing_info": [],
        "complexity": "moderate"
    })
    .to_string()
}

fn sequential_calc_plan() -> String {
    json!({
        "analysis": "Balance and price feed a calculation.",
        "is_off_topic": false,
        "requires_tools": true,
        "execution_plan": {
            "type": "sequential",
            "steps": [
                {"tool": "get_balance", "reason": "input", "parameters": {"address": "0xAAA"}},
                {"tool": "fetch_price", "reason": "input", "parameters": {"query": "solana"}},
                {"tool": "calculate", "reason": "derive", "depends_on": ["get_balance", "fetch_price"],
                 "parameters": {"expression": "{{get_balance}} / {{fetch_price}}"}}
            ]
        },
        "missing_info": [],
        "complexity": "complex"
    })
    .to_string()
}

#[tokio::test]
async fn parallel_plan_dispatches_every_step() {
    let h = harness(vec![Ok(parallel_price_plan())]);
    h.runner.script("fetch_price", json!({"eth": 2400.0})).await;
    h.runner.script("get_balance", json!({"eth": "1.5"})).await;

    let turn = h
        .engine
        .handle_message("c1", "ETH price and my balance for 0xAAA")
        .await
        .unwrap();

    assert_eq!(h.runner.request_count().await, 2);
    let mut tools = h.runner.dispatched_tools().await;
    tools.sort();
    assert_eq!(tools, vec!["fetch_price", "get_balance"]);

    assert_eq!(turn.tool_calls.len(), 2);
    assert!(turn.tool_calls.iter().all(|c| c.success));
    assert!(turn.message.contains("completed"));
}

#[tokio::test]
async fn sequential_plan_runs_in_declared_order_and_binds_results() {
    let h = harness(vec![Ok(sequential_calc_plan())]);
    h.runner.script("get_balance", json!("3.0")).await;
    h.runner.script("fetch_price", json!(150)).await;
    h.runner.script("calculate", json!("0.02")).await;

    let turn = h
        .engine
        .handle_message("c1", "How much SOL can I buy with wallet 0xAAA?")
        .await
        .unwrap();

    assert_eq!(
        h.runner.dispatched_tools().await,
        vec!["get_balance", "fetch_price", "calculate"]
    );

    let requests = h.runner.requests.lock().await;
    // Upstream steps carry the chain pointer to their dependent.
    assert_eq!(requests[0].tools[0].next_tool.as_deref(), Some("calculate"));
    assert_eq!(requests[1].tools[0].next_tool.as_deref(), Some("calculate"));
    assert_eq!(requests[2].tools[0].next_tool, None);
    // Placeholders were bound from upstream results before dispatch.
    assert_eq!(
        requests[2].tools[0].parameters["expression"],
        json!("3.0 / 150")
    );
    drop(requests);

    assert_eq!(turn.tool_calls.len(), 3);
    assert!(turn.tool_calls.iter().all(|c| c.success));
}

#[tokio::test]
async fn missing_info_short_circuits_without_dispatch() {
    let plan = json!({
        "analysis": "Transfer lacks required fields.",
        "requires_tools": true,
        "execution_plan": {"type": "parallel", "steps": []},
        "missing_info": ["How many tokens should be transferred?", "What is the recipient's address?"]
    })
    .to_string();
    let h = harness(vec![Ok(plan)]);

    let turn = h
        .engine
        .handle_message("c1", "transfer some tokens to Alice")
        .await
        .unwrap();

    assert_eq!(h.runner.request_count().await, 0);
    assert_eq!(h.provider.call_count().await, 1);
    assert!(turn.message.contains("- How many tokens should be transferred?"));
    assert!(turn.message.contains("- What is the recipient's address?"));
    assert!(turn.tool_calls.is_empty());
}

#[tokio::test]
async fn off_topic_gets_fixed_rejection() {
    let plan = json!({
        "analysis": "Weather is unrelated.",
        "is_off_topic": true,
        "requires_tools": false
    })
    .to_string();
    let h = harness(vec![Ok(plan)]);

    let turn = h
        .engine
        .handle_message("c1", "what's the weather today?")
        .await
        .unwrap();

    assert_eq!(turn.message, OFF_TOPIC_REPLY);
    assert!(turn.tool_calls.is_empty());
    assert_eq!(h.runner.request_count().await, 0);
    // Exactly one model call — classification; no chat fallback.
    assert_eq!(h.provider.call_count().await, 1);
}

#[tokio::test]
async fn chit_chat_goes_to_plain_conversation() {
    let plan = json!({
        "analysis": "General question about gas fees, no operation needed.",
        "requires_tools": false
    })
    .to_string();
    let h = harness(vec![Ok(plan), Ok("Gas fees pay validators.".to_string())]);

    let turn = h
        .engine
        .handle_message("c1", "what are gas fees?")
        .await
        .unwrap();

    assert_eq!(turn.message, "Gas fees pay validators.");
    assert_eq!(h.runner.request_count().await, 0);
    // The chat call's system prompt carries the planner's analysis.
    let log = h.provider.call_log.lock().await;
    let system = log[1].messages[0]["content"].as_str().unwrap();
    assert!(system.contains("gas fees"));
}

#[tokio::test]
async fn generation_failure_degrades_to_plain_chat() {
    let h = harness(vec![
        Err("connection refused".to_string()),
        Ok("Sorry, I couldn't process that. Try again?".to_string()),
    ]);

    let turn = h.engine.handle_message("c1", "ETH price?").await.unwrap();

    assert_eq!(turn.message, "Sorry, I couldn't process that. Try again?");
    assert!(turn.tool_calls.is_empty());
    assert_eq!(h.runner.request_count().await, 0);
}

#[tokio::test]
async fn invalid_plan_degrades_to_plain_chat() {
    let plan = json!({
        "analysis": "Wants a weather lookup.",
        "requires_tools": true,
        "execution_plan": {
            "type": "parallel",
            "steps": [{"tool": "get_weather", "parameters": {"city": "Lisbon"}}]
        }
    })
    .to_string();
    let h = harness(vec![Ok(plan), Ok("I can't look that up.".to_string())]);

    let turn = h.engine.handle_message("c1", "weather in Lisbon").await.unwrap();

    assert_eq!(turn.message, "I can't look that up.");
    assert_eq!(h.runner.request_count().await, 0);
}

#[tokio::test]
async fn runner_failure_degrades_with_partial_results_recorded() {
    let h = harness(vec![
        Ok(parallel_price_plan()),
        Ok("Something went wrong fetching live data.".to_string()),
    ]);
    h.runner.script("get_balance", json!({"eth": "1.5"})).await;
    h.runner
        .script_failure("fetch_price", "upstream API unavailable")
        .await;

    let turn = h
        .engine
        .handle_message("c1", "ETH price and my balance")
        .await
        .unwrap();

    assert_eq!(turn.message, "Something went wrong fetching live data.");
    assert_eq!(turn.tool_calls.len(), 2);
    let failed = turn
        .tool_calls
        .iter()
        .find(|c| c.tool == "fetch_price")
        .unwrap();
    assert!(!failed.success);
    let succeeded = turn
        .tool_calls
        .iter()
        .find(|c| c.tool == "get_balance")
        .unwrap();
    assert!(succeeded.success);
}

#[tokio::test]
async fn slow_tool_call_times_out_and_degrades() {
    let plan = json!({
        "analysis": "Price lookup.",
        "requires_tools": true,
        "execution_plan": {
            "type": "parallel",
            "steps": [{"tool": "fetch_price", "parameters": {"query": "bitcoin"}}]
        }
    })
    .to_string();
    let h = harness_with_step_timeout(
        vec![Ok(plan), Ok("Live price data is slow right now.".to_string())],
        Duration::from_millis(50),
    );
    h.runner.set_delay(Duration::from_millis(500)).await;

    let turn = h.engine.handle_message("c1", "BTC price?").await.unwrap();

    // The hung dispatch is abandoned and treated exactly like a failure.
    assert_eq!(turn.message, "Live price data is slow right now.");
    assert_eq!(turn.tool_calls.len(), 1);
    assert!(!turn.tool_calls[0].success);
    let recorded = turn.tool_calls[0].result.as_str().unwrap();
    assert!(recorded.contains("timed out"), "got: {}", recorded);
}

#[tokio::test]
async fn total_outage_returns_canned_reply() {
    let h = harness(vec![
        Err("down".to_string()),
        Err("still down".to_string()),
    ]);

    let turn = h.engine.handle_message("c1", "ETH price?").await.unwrap();

    assert!(turn.message.contains("try again"));
    assert!(turn.tool_calls.is_empty());
}

#[tokio::test]
async fn long_history_is_trimmed_to_budget() {
    // 40 prior messages of ~10 tokens each; budget fits only a fraction.
    let h = harness_with_budget(
        vec![Ok(json!({"analysis": "chit-chat", "requires_tools": false}).to_string()),
             Ok("hi again".to_string())],
        60,
    );
    for i in 0..40 {
        let role = if i % 2 == 0 { "user" } else { "assistant" };
        let m = Message::new("c1", role, &format!("historical message number {:04}", i));
        h.store.append(&m).await.unwrap();
    }

    h.engine.handle_message("c1", "hello again").await.unwrap();

    let log = h.provider.call_log.lock().await;
    let planning_messages = &log[0].messages;
    // System prompt + trimmed history + latest; far fewer than the full 41.
    assert!(planning_messages.len() < 20);
    assert!(planning_messages.len() >= 2);
    assert_eq!(
        planning_messages.last().unwrap()["content"],
        json!("hello again")
    );
    // Chronological: the oldest entries were the ones dropped.
    let first_kept = planning_messages[1]["content"].as_str().unwrap();
    assert_ne!(first_kept, "historical message number 0000");
}

#[tokio::test]
async fn conversation_log_records_both_sides() {
    let h = harness(vec![
        Ok(json!({"analysis": "greeting", "requires_tools": false}).to_string()),
        Ok("Hello! Ready to help with your wallet.".to_string()),
    ]);

    h.engine.handle_message("c1", "hi").await.unwrap();

    let history = h.store.history("c1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, "user");
    assert_eq!(history[0].content, "hi");
    assert_eq!(history[1].role, "assistant");
    assert_eq!(history[1].content, "Hello! Ready to help with your wallet.");
}

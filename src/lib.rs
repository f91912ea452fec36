//! Natural-language tool planning and orchestration for blockchain agent
//! backends.
//!
//! A user message like "how much Solana can I buy with my ETH balance?" is
//! classified and turned into a dependency-ordered execution plan over a
//! fixed tool catalog, validated, resolved into execution groups, and driven
//! against an external operation-execution service. Every failure edge
//! degrades to a plain conversational response instead of surfacing an error
//! to the user.
//!
//! Entry point: [`engine::Engine::handle_message`].

pub mod catalog;
pub mod config;
pub mod context;
pub mod engine;
pub mod plan;
pub mod providers;
pub mod runner;
pub mod session;
pub mod store;
pub mod testing;
pub mod traits;
pub mod types;

pub use catalog::{ToolCatalog, ToolSpec};
pub use engine::{Engine, OFF_TOPIC_REPLY};
pub use types::{AssistantTurn, ExecutedStep};

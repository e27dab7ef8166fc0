//! Insight engine: AI-assisted insights and the shop assistant.
//!
//! This crate provides:
//! - [`CompletionClient`]: OpenAI-compatible chat completions behind the
//!   [`CompletionService`] trait
//! - [`InsightRefreshOrchestrator`]: periodic business insights with a minimum
//!   refresh interval and in-flight collapsing
//! - [`ConversationalQueryHandler`]: intent classification plus a data
//!   context block for free-text questions
//!
//! # Usage
//!
//! ```ignore
//! use insight_engine::{CompletionClient, InsightRefreshOrchestrator, InsightSettings};
//!
//! let completion = Arc::new(CompletionClient::from_env()?);
//! let orchestrator = InsightRefreshOrchestrator::new(store, completion, InsightSettings::default());
//!
//! match orchestrator.refresh(&owner, false).await? {
//!     InsightOutcome::Generated(insight) | InsightOutcome::Cached(insight) => println!("{}", insight.content),
//!     InsightOutcome::InFlight => {}
//! }
//! ```

mod chat;
mod client;
mod context;
mod error;
mod orchestrator;

pub use chat::{classify_intent, ChatAnswer, ConversationalQueryHandler, Intent};
pub use client::{
    ChatRole, ChatTurn, CompletionClient, CompletionRequest, CompletionService, DEFAULT_API_URL,
    DEFAULT_MODEL,
};
pub use context::{BusinessArea, BusinessContext};
pub use error::{EngineError, EngineResult};
pub use orchestrator::{InsightOutcome, InsightRefreshOrchestrator, InsightSettings};

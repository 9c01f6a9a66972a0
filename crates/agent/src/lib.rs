//! Agent runtime - LLM-fronted orchestration of the booking workflow
//!
//! This crate is the only place where language-model output enters the
//! system, and it treats that output as untrusted text throughout:
//!
//! 1. **Intent classification** (`classifier`) - phase-aware heuristics
//!    first, one constrained model call only when those are ambiguous.
//! 2. **Parameter extraction** (`extractor`) - the model is prompted with a
//!    tool schema, its answer is parsed defensively and re-validated by the
//!    tool registry, with a bounded re-prompt budget.
//! 3. **Orchestration** (`runtime`) - routes each turn through the
//!    deterministic workflow engine in `farebot-core` and dispatches tool
//!    calls through the registry in `farebot-tools`.
//!
//! # Safety principle
//!
//! The LLM is strictly a translator. It never picks a flight, never decides
//! to book, and can never cause a backend call that did not pass schema
//! validation. Ambiguous booking outcomes are surfaced to the user, not
//! resolved by guessing.

pub mod classifier;
pub mod extractor;
pub mod llm;
pub mod reply;
pub mod runtime;
pub mod store;

pub use classifier::IntentClassifier;
pub use extractor::{ExtractionError, ParameterExtractor};
pub use llm::{LlmClient, OllamaClient};
pub use reply::AgentReply;
pub use runtime::{AgentError, AgentRuntime, RuntimeOptions};
pub use store::ConversationStore;

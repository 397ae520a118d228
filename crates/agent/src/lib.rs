//! Agent runtime for the vendedor sales assistant.
//!
//! Each customer turn runs a fixed loop:
//! 1. **Slot extraction** (`conversation`, `guardrails`): the model reports what the
//!    customer said; values are validated before they touch the session context.
//! 2. **Criteria discovery** (`criteria`): the model lists what a category needs,
//!    cached once per category for the whole process.
//! 3. **Readiness** (`readiness`): a pure set comparison decides between asking a
//!    follow-up question and searching the catalog.
//! 4. **Recommendation** (`composer`): search results become a grounded reply.
//!
//! # Safety Principle
//!
//! The model is strictly a translator. Readiness, budgets, filtering and sorting
//! are deterministic; every model failure degrades to a fixed reply.

pub mod composer;
pub mod conversation;
pub mod criteria;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod readiness;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use runtime::{AgentRuntime, RuntimeSettings, TurnOutcome};

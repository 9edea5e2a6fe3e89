//! Run-level and agent-level lifecycle hooks, plus the [`RunContext`]
//! threaded through every turn.
//!
//! [`RunHooks`] and [`AgentHooks`] are the two observation points the turn
//! driver fires on: [`RunHooks`] sees every agent for the whole run (useful
//! for cross-agent logging or metrics), while [`AgentHooks`] scopes to a
//! single agent. Both are dispatched concurrently with guardrails via
//! `tokio::join!` so neither blocks the other.

mod context;
mod hooks;
mod noop;

pub use context::RunContext;
pub use hooks::{AgentHooks, BoxedAgentHooks, BoxedRunHooks, RunHooks, SharedAgentHooks, SharedRunHooks};
pub use noop::{NoopAgentHooks, NoopRunHooks};

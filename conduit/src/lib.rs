#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(tail_expr_drop_order)]
//! conduit is a Rust library for building and running LLM agents: a turn
//! loop that calls a model, classifies its response, executes tool calls
//! and handoffs, and decides whether to run another turn or stop with a
//! final output.
//!
//! The crate is organized around the shape of one turn:
//!
//! - [`agent`]: the [`Agent`](agent::Agent) data model — instructions,
//!   tools, handoffs, and settings.
//! - [`model`]: the [`Model`](model::Model) trait, the interface to an LLM
//!   backend, plus the request/response DTOs.
//! - [`message`]: the item types a turn produces and consumes
//!   ([`Message`](message::Message), [`ToolCall`](message::ToolCall),
//!   [`RunItem`](message::RunItem)).
//! - [`processor`]: classifies one model response into messages, tool
//!   calls, handoff calls, and a possible final output.
//! - [`executor`]: runs the side effects of a classified response (tools,
//!   handoffs, hooks) and decides the next step.
//! - [`runner`]: drives the turn loop to completion, blocking or streaming.
//! - [`stream`]: the streaming runtime — semantic events published while a
//!   run is in progress, and the handle used to pull them.
//! - [`guardrail`]: input/output tripwire checks raced alongside a turn.
//! - [`callback`]: lifecycle hooks and the context threaded through a run.
//! - [`session`]: conversation memory, prepended transparently to input.
//! - [`mcp`]: the external MCP server interface.
//! - [`trace`]: the external tracing span interface.
//! - [`usage`]: token usage accounting.
//! - [`error`]: the crate's error taxonomy.

pub mod agent;
pub mod callback;
pub mod error;
pub mod executor;
pub mod guardrail;
pub mod mcp;
pub mod message;
pub mod model;
pub mod processor;
pub mod prelude;
pub mod runner;
pub mod session;
pub mod stream;
pub mod trace;
pub mod usage;

pub use agent::{Agent, AgentRef};
pub use error::{Error, Result};
pub use model::Model;
pub use runner::Runner;
